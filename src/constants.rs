// -
// Key defaults

/// Group used when the caller passes no group or a blank one
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// Encoding used when the configuration record leaves `encode` blank
pub const DEFAULT_ENCODE: &str = "UTF-8";

// -
// Server paths

/// Read, publish and remove endpoint
pub const CONFIG_CONTROLLER_PATH: &str = "/v1/cs/configs";
/// Long-polling endpoint
pub const CONFIG_LISTENER_PATH: &str = "/v1/cs/configs/listener";

// -
// Long-polling protocol

/// Request parameter carrying the batched listening keys
pub const PROBE_MODIFY_REQUEST: &str = "Listening-Configs";

/// Header telling the server how long it may hold the request (ms)
pub const LONG_POLLING_TIMEOUT_HEADER: &str = "Long-Pulling-Timeout";

/// Header asking the server to answer without holding the request
pub const LONG_POLLING_NO_HANGUP_HEADER: &str = "Long-Pulling-Timeout-No-Hangup";

/// Separates keys in a listening request/response
pub const LINE_SEPARATOR: char = '\u{1}';

/// Separates fields of one key in a listening request/response
pub const WORD_SEPARATOR: char = '\u{2}';

// -
// Local cache layout

pub(crate) const CACHE_ROOT_SUFFIX: &str = "_nacos";
pub(crate) const FAILOVER_DIR: &str = "data/config-data";
pub(crate) const FAILOVER_TENANT_DIR: &str = "data/config-data-tenant";
pub(crate) const SNAPSHOT_DIR: &str = "snapshot";
pub(crate) const SNAPSHOT_TENANT_DIR: &str = "snapshot-tenant";

/// Maximum content length echoed into log lines
pub(crate) const LOG_CONTENT_MAX_LEN: usize = 100;
