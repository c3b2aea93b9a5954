use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use d_config::constants::CONFIG_CONTROLLER_PATH;
use d_config::constants::CONFIG_LISTENER_PATH;
use d_config::constants::LINE_SEPARATOR;
use d_config::constants::LONG_POLLING_NO_HANGUP_HEADER;
use d_config::constants::LONG_POLLING_TIMEOUT_HEADER;
use d_config::constants::PROBE_MODIFY_REQUEST;
use d_config::constants::WORD_SEPARATOR;
use d_config::fingerprint;
use d_config::transport::HttpAgent;
use d_config::transport::HttpResult;
use d_config::transport::Pairs;
use d_config::ClientConfig;
use d_config::ConfigClient;
use d_config::Listener;
use d_config::NetworkError;
use d_config::Result;
use parking_lot::Mutex;
use tokio::sync::Notify;

pub const TIMEOUT: Duration = Duration::from_millis(500);

type Coordinates = (String, String, String);

#[derive(Default)]
struct StubState {
    configs: HashMap<Coordinates, String>,
    reachable: bool,
    forced_status: Option<u16>,
}

/// Configuration service kept in memory, reachable through [`HttpAgent`].
pub struct StubServer {
    state: Mutex<StubState>,
    changed: Notify,
    polls: AtomicUsize,
}

impl StubServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StubState {
                reachable: true,
                ..Default::default()
            }),
            changed: Notify::new(),
            polls: AtomicUsize::new(0),
        })
    }

    pub fn put(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
    ) {
        self.state
            .lock()
            .configs
            .insert(coordinates(data_id, group, ""), content.to_string());
        self.changed.notify_waiters();
    }

    pub fn set_reachable(
        &self,
        reachable: bool,
    ) {
        self.state.lock().reachable = reachable;
        self.changed.notify_waiters();
    }

    /// Every request answers `status` until reset with `None`
    pub fn force_status(
        &self,
        status: Option<u16>,
    ) {
        self.state.lock().forced_status = status;
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn answer_forced(&self) -> Result<Option<HttpResult>> {
        let state = self.state.lock();
        if !state.reachable {
            return Err(NetworkError::RequestFailed("connection refused".into()).into());
        }
        Ok(state.forced_status.map(|code| HttpResult::new(code, "forced")))
    }

    fn changed_keys(
        &self,
        listening: &[(Coordinates, String)],
    ) -> String {
        let state = self.state.lock();
        let mut body = String::new();
        for ((data_id, group, tenant), md5) in listening {
            let key = coordinates(data_id, group, tenant);
            let current = state.configs.get(&key).map(|c| fingerprint(c)).unwrap_or_default();
            if current == *md5 {
                continue;
            }
            body.push_str(data_id);
            body.push(WORD_SEPARATOR);
            body.push_str(group);
            if !tenant.is_empty() {
                body.push(WORD_SEPARATOR);
                body.push_str(tenant);
            }
            body.push(LINE_SEPARATOR);
        }
        urlencoding::encode(&body).into_owned()
    }

    async fn listen(
        &self,
        headers: &Pairs,
        params: &Pairs,
    ) -> Result<HttpResult> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let listening = parse_listening(value(params, PROBE_MODIFY_REQUEST).unwrap_or_default());
        let hold = value(headers, LONG_POLLING_TIMEOUT_HEADER)
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(30));
        let no_hangup = value(headers, LONG_POLLING_NO_HANGUP_HEADER).is_some();
        let deadline = tokio::time::Instant::now() + hold;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(forced) = self.answer_forced()? {
                return Ok(forced);
            }
            let changed = self.changed_keys(&listening);
            if !changed.is_empty() || no_hangup {
                return Ok(HttpResult::ok(changed));
            }
            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => return Ok(HttpResult::ok("")),
            }
        }
    }
}

#[async_trait]
impl HttpAgent for StubServer {
    async fn http_get(
        &self,
        _path: &str,
        _headers: &Pairs,
        params: &Pairs,
        _encoding: &str,
        _timeout: Duration,
    ) -> Result<HttpResult> {
        if let Some(forced) = self.answer_forced()? {
            return Ok(forced);
        }
        Ok(match self.state.lock().configs.get(&coordinates_of(params)) {
            Some(content) => HttpResult::ok(content.clone()),
            None => HttpResult::new(404, "config data not exist"),
        })
    }

    async fn http_post(
        &self,
        path: &str,
        headers: &Pairs,
        params: &Pairs,
        _encoding: &str,
        _timeout: Duration,
    ) -> Result<HttpResult> {
        if path == CONFIG_LISTENER_PATH {
            return self.listen(headers, params).await;
        }
        assert_eq!(path, CONFIG_CONTROLLER_PATH);
        if let Some(forced) = self.answer_forced()? {
            return Ok(forced);
        }
        let content = value(params, "content").unwrap_or_default().to_string();
        self.state.lock().configs.insert(coordinates_of(params), content);
        self.changed.notify_waiters();
        Ok(HttpResult::ok("true"))
    }

    async fn http_delete(
        &self,
        _path: &str,
        _headers: &Pairs,
        params: &Pairs,
        _encoding: &str,
        _timeout: Duration,
    ) -> Result<HttpResult> {
        if let Some(forced) = self.answer_forced()? {
            return Ok(forced);
        }
        self.state.lock().configs.remove(&coordinates_of(params));
        self.changed.notify_waiters();
        Ok(HttpResult::ok("true"))
    }

    fn name(&self) -> String {
        "integration".to_string()
    }
}

/// Client record with short poll holds, caching below `cache_dir`
pub fn client_config(cache_dir: &Path) -> ClientConfig {
    let mut config = ClientConfig::with_server_addr("127.0.0.1:8848");
    config.cache_dir = cache_dir.to_path_buf();
    config.write_timeout_ms = 500;
    config.poll.long_poll_timeout_ms = 300;
    config.retry.timeout_ms = 500;
    config.retry.base_delay_ms = 50;
    config.retry.max_delay_ms = 200;
    config
}

pub async fn start_client(
    server: &Arc<StubServer>,
    cache_dir: &Path,
) -> ConfigClient {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    ConfigClient::builder(client_config(cache_dir))
        .agent(server.clone())
        .build()
        .await
        .expect("client starts")
}

/// Listener keeping every content it was handed
#[derive(Default)]
pub struct Recorder {
    received: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

impl Listener for Recorder {
    fn on_change(
        &self,
        content: &str,
    ) {
        self.received.lock().push(content.to_string());
    }
}

pub async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn value<'a>(
    pairs: &'a Pairs,
    name: &str,
) -> Option<&'a str> {
    pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
}

fn coordinates(
    data_id: &str,
    group: &str,
    tenant: &str,
) -> Coordinates {
    (data_id.to_string(), group.to_string(), tenant.to_string())
}

fn coordinates_of(params: &Pairs) -> Coordinates {
    coordinates(
        value(params, "dataId").unwrap_or_default(),
        value(params, "group").unwrap_or_default(),
        value(params, "tenant").unwrap_or_default(),
    )
}

fn parse_listening(body: &str) -> Vec<(Coordinates, String)> {
    body.split(LINE_SEPARATOR)
        .filter_map(|line| match line.split(WORD_SEPARATOR).collect::<Vec<_>>().as_slice() {
            [data_id, group, md5] => Some((coordinates(data_id, group, ""), md5.to_string())),
            [data_id, group, md5, tenant] => Some((coordinates(data_id, group, tenant), md5.to_string())),
            _ => None,
        })
        .collect()
}
