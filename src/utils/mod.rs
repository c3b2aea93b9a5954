pub(crate) mod file_io;


use crate::constants::LOG_CONTENT_MAX_LEN;

/// Shortens content for log lines, respecting char boundaries
pub fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(LOG_CONTENT_MAX_LEN) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}
