//! Local cache store: the failover and snapshot tiers.
//!
//! Records are plain text files, one per key, below a root that is private
//! to the client's logical name:
//!
//! ```text
//! <cache_dir>/<name>_nacos/
//!     data/config-data/<group>/<dataId>                    failover, no tenant
//!     data/config-data-tenant/<tenant>/<group>/<dataId>    failover, tenant
//!     snapshot/<group>/<dataId>                            snapshot, no tenant
//!     snapshot-tenant/<tenant>/<group>/<dataId>            snapshot, tenant
//! ```
//!
//! Failover records are written by operators only. Snapshot records are
//! written by the client after each successful live read and are replaced
//! atomically, so a crash never leaves a torn record behind.


use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use crate::constants::CACHE_ROOT_SUFFIX;
use crate::constants::FAILOVER_DIR;
use crate::constants::FAILOVER_TENANT_DIR;
use crate::constants::SNAPSHOT_DIR;
use crate::constants::SNAPSHOT_TENANT_DIR;
use crate::utils::file_io;
use crate::ConfigKey;
use crate::Result;

#[derive(Debug)]
pub struct LocalConfigStore {
    name: String,
    root: PathBuf,
    /// Serializes snapshot writes per key
    write_locks: DashMap<ConfigKey, Arc<Mutex<()>>>,
}

impl LocalConfigStore {
    pub fn new(
        cache_dir: &Path,
        name: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            root: cache_dir.join(format!("{name}{CACHE_ROOT_SUFFIX}")),
            write_locks: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn failover_path(
        &self,
        key: &ConfigKey,
    ) -> PathBuf {
        let base = if key.has_tenant() {
            self.root.join(FAILOVER_TENANT_DIR).join(key.tenant())
        } else {
            self.root.join(FAILOVER_DIR)
        };
        base.join(key.group()).join(key.data_id())
    }

    pub fn snapshot_path(
        &self,
        key: &ConfigKey,
    ) -> PathBuf {
        let base = if key.has_tenant() {
            self.root.join(SNAPSHOT_TENANT_DIR).join(key.tenant())
        } else {
            self.root.join(SNAPSHOT_DIR)
        };
        base.join(key.group()).join(key.data_id())
    }

    /// Operator override for `key`. A missing or unreadable record is a miss.
    pub async fn get_failover(
        &self,
        key: &ConfigKey,
    ) -> Option<String> {
        self.read_record(&self.failover_path(key), key, "failover").await
    }

    /// Last content the client itself obtained live for `key`
    pub async fn get_snapshot(
        &self,
        key: &ConfigKey,
    ) -> Option<String> {
        self.read_record(&self.snapshot_path(key), key, "snapshot").await
    }

    /// Overwrites the snapshot record of `key`. Empty content is stored as an
    /// empty record, so a deleted key falls back to empty content.
    pub async fn save_snapshot(
        &self,
        key: &ConfigKey,
        content: &str,
    ) -> Result<()> {
        let lock = self
            .write_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let path = self.snapshot_path(key);
        if let Err(e) = file_io::write_atomically(&path, content.as_bytes()).await {
            warn!(client = %self.name, key = %key, error = %e, "[snapshot] save failed");
            return Err(e);
        }
        debug!(client = %self.name, key = %key, "[snapshot] saved");
        Ok(())
    }

    /// Drops every snapshot record of this client, with and without tenant.
    ///
    /// Failover records are left untouched.
    pub async fn clear_snapshots(&self) -> Result<()> {
        file_io::remove_dir_if_exists(&self.root.join(SNAPSHOT_DIR)).await?;
        file_io::remove_dir_if_exists(&self.root.join(SNAPSHOT_TENANT_DIR)).await?;
        warn!(client = %self.name, "[snapshot] all snapshot records removed");
        Ok(())
    }

    async fn read_record(
        &self,
        path: &Path,
        key: &ConfigKey,
        tier: &'static str,
    ) -> Option<String> {
        match file_io::read_if_exists(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(client = %self.name, key = %key, tier, error = %e, "local record unreadable");
                None
            }
        }
    }
}
