use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::error;

use crate::Result;
use crate::StorageError;

pub(crate) async fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    if let Some(parent_dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent_dir).await {
            error!("Failed to create directory {:?}: {:?}", parent_dir, e);
            return Err(StorageError::PathError {
                path: parent_dir.to_path_buf(),
                source: e,
            }
            .into());
        }
    }
    Ok(())
}

/// Reads a whole text file, `None` when it does not exist
pub(crate) async fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}

/// Replaces `path` with `content` so that readers and crashes only ever see
/// the old or the new file, never a torn one.
///
/// The bytes go to a sibling temp file which is synced and then renamed over
/// the target.
pub(crate) async fn write_atomically(
    path: &Path,
    content: &[u8],
) -> Result<()> {
    create_parent_dir_if_not_exist(path).await?;

    let tmp = temp_sibling(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        }
        .into());
    }

    debug!("wrote {} bytes into {:?}", content.len(), path);
    Ok(())
}

/// Removes a directory tree, treating a missing one as already removed
pub(crate) async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
