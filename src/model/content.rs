use md5::Digest;
use md5::Md5;

/// A configuration value plus its fingerprint.
///
/// Empty content means "no value" and carries an empty fingerprint, which is
/// also what the server reports for keys it does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigContent {
    content: String,
    fingerprint: String,
}

impl ConfigContent {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let fingerprint = fingerprint(&content);
        Self { content, fingerprint }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

/// Lower-case hex MD5 of `content`, empty for empty content
pub fn fingerprint(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    hex::encode(Md5::digest(content.as_bytes()))
}
