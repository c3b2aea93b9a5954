use std::fmt;

use crate::constants::DEFAULT_GROUP;
use crate::Error;
use crate::Result;

/// Identity of one configuration item: `(dataId, group, tenant)`.
///
/// All three fields are trimmed on construction. A blank group resolves to
/// [`DEFAULT_GROUP`], a blank tenant to the empty string. Construction
/// validates every field, so a `ConfigKey` is always safe to use as a cache
/// path component or request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    data_id: String,
    group: String,
    tenant: String,
}

impl ConfigKey {
    pub fn new(
        data_id: &str,
        group: &str,
        tenant: &str,
    ) -> Result<Self> {
        let data_id = data_id.trim();
        let group = normalize_group(group);
        let tenant = tenant.trim();

        if !is_valid(data_id) {
            return Err(Error::Parameter(format!("dataId invalid: {data_id:?}")));
        }
        if !is_valid(&group) {
            return Err(Error::Parameter(format!("group invalid: {group:?}")));
        }
        if !tenant.is_empty() && !is_valid(tenant) {
            return Err(Error::Parameter(format!("tenant invalid: {tenant:?}")));
        }

        Ok(Self {
            data_id: data_id.to_string(),
            group,
            tenant: tenant.to_string(),
        })
    }

    pub fn data_id(&self) -> &str {
        &self.data_id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn has_tenant(&self) -> bool {
        !self.tenant.is_empty()
    }
}

/// `dataId+group[+tenant]`, the form used in log lines
impl fmt::Display for ConfigKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.tenant.is_empty() {
            write!(f, "{}+{}", self.data_id, self.group)
        } else {
            write!(f, "{}+{}+{}", self.data_id, self.group, self.tenant)
        }
    }
}

/// Blank or missing group falls back to [`DEFAULT_GROUP`]
pub fn normalize_group(group: &str) -> String {
    let group = group.trim();
    if group.is_empty() {
        DEFAULT_GROUP.to_string()
    } else {
        group.to_string()
    }
}

/// Non-blank, made only of `[A-Za-z0-9_.:-]` and never a relative path
/// component (`.` or `..`), so it stays inside the cache root
pub(crate) fn is_valid(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && value.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

/// Content of a publish must be present and not blank
pub(crate) fn check_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Parameter("content invalid: blank".to_string()));
    }
    Ok(())
}
