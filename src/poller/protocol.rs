//! Long-polling wire format
//!
//! Request parameter `Listening-Configs`, one entry per key:
//! `dataId WORD group WORD md5 [WORD tenant] LINE`
//!
//! Response body, URL-encoded, one entry per changed key:
//! `dataId WORD group [WORD tenant] LINE`

use tracing::error;
use tracing::warn;

use crate::constants::LINE_SEPARATOR;
use crate::constants::WORD_SEPARATOR;
use crate::ConfigKey;

pub(crate) fn build_listening_configs<'a>(
    entries: impl IntoIterator<Item = (&'a ConfigKey, &'a str)>
) -> String {
    let mut body = String::new();
    for (key, fingerprint) in entries {
        body.push_str(key.data_id());
        body.push(WORD_SEPARATOR);
        body.push_str(key.group());
        body.push(WORD_SEPARATOR);
        body.push_str(fingerprint);
        if key.has_tenant() {
            body.push(WORD_SEPARATOR);
            body.push_str(key.tenant());
        }
        body.push(LINE_SEPARATOR);
    }
    body
}

/// Keys named in a long-polling answer.
///
/// Malformed entries are logged and skipped; an undecodable body yields no
/// keys at all.
pub(crate) fn parse_changed_keys(response: &str) -> Vec<ConfigKey> {
    if response.trim().is_empty() {
        return Vec::new();
    }
    let decoded = match urlencoding::decode(response) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!(error = %e, "[polling-resp] undecodable response");
            return Vec::new();
        }
    };

    let mut keys = Vec::new();
    for line in decoded.split(LINE_SEPARATOR).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(WORD_SEPARATOR).collect();
        let parsed = match fields.as_slice() {
            [data_id, group] => ConfigKey::new(*data_id, *group, ""),
            [data_id, group, tenant] => ConfigKey::new(*data_id, *group, *tenant),
            _ => {
                error!(line, "[polling-resp] invalid dataIdAndGroup");
                continue;
            }
        };
        match parsed {
            Ok(key) => keys.push(key),
            Err(e) => warn!(line, error = %e, "[polling-resp] skipped entry"),
        }
    }
    keys
}
