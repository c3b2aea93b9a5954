use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::constants::CONFIG_CONTROLLER_PATH;
use crate::constants::CONFIG_LISTENER_PATH;
use crate::constants::LINE_SEPARATOR;
use crate::constants::LONG_POLLING_NO_HANGUP_HEADER;
use crate::constants::LONG_POLLING_TIMEOUT_HEADER;
use crate::constants::PROBE_MODIFY_REQUEST;
use crate::constants::WORD_SEPARATOR;
use crate::model::fingerprint;
use crate::transport::HttpAgent;
use crate::transport::HttpResult;
use crate::transport::Pairs;
use crate::transport::HTTP_FORBIDDEN;
use crate::transport::HTTP_NOT_FOUND;
use crate::NetworkError;
use crate::Result;

type Coordinates = (String, String, String);

#[derive(Default)]
struct FakeState {
    configs: BTreeMap<Coordinates, String>,
    down: bool,
    deny: bool,
    status: Option<u16>,
    get_requests: usize,
    poll_requests: usize,
    last_poll_headers: Pairs,
    last_poll_keys: usize,
    last_write_params: Pairs,
}

/// In-memory configuration service speaking the long-polling protocol.
///
/// Listening requests are held until a watched key changes or the requested
/// hold time elapses, like the real server does.
pub(crate) struct FakeConfigServer {
    name: String,
    state: Mutex<FakeState>,
    revision: watch::Sender<u64>,
}

impl FakeConfigServer {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(FakeState::default()),
            revision,
        })
    }

    /// Server-side write, bypassing the client
    pub(crate) fn put(
        &self,
        data_id: &str,
        group: &str,
        tenant: &str,
        content: &str,
    ) {
        self.state
            .lock()
            .configs
            .insert(coordinates(data_id, group, tenant), content.to_string());
        self.bump();
    }

    pub(crate) fn delete(
        &self,
        data_id: &str,
        group: &str,
        tenant: &str,
    ) {
        self.state.lock().configs.remove(&coordinates(data_id, group, tenant));
        self.bump();
    }

    pub(crate) fn content(
        &self,
        data_id: &str,
        group: &str,
        tenant: &str,
    ) -> Option<String> {
        self.state
            .lock()
            .configs
            .get(&coordinates(data_id, group, tenant))
            .cloned()
    }

    /// Every request fails at the network level while down
    pub(crate) fn set_down(
        &self,
        down: bool,
    ) {
        self.state.lock().down = down;
        self.bump();
    }

    /// Every request is answered with 403 while denying
    pub(crate) fn set_deny(
        &self,
        deny: bool,
    ) {
        self.state.lock().deny = deny;
        self.bump();
    }

    /// Every request is answered with `status` while set
    pub(crate) fn set_status(
        &self,
        status: Option<u16>,
    ) {
        self.state.lock().status = status;
        self.bump();
    }

    pub(crate) fn get_requests(&self) -> usize {
        self.state.lock().get_requests
    }

    pub(crate) fn poll_requests(&self) -> usize {
        self.state.lock().poll_requests
    }

    pub(crate) fn last_poll_headers(&self) -> Pairs {
        self.state.lock().last_poll_headers.clone()
    }

    pub(crate) fn last_poll_keys(&self) -> usize {
        self.state.lock().last_poll_keys
    }

    pub(crate) fn last_write_params(&self) -> Pairs {
        self.state.lock().last_write_params.clone()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Network failure or forced status shared by every endpoint
    fn precheck(&self) -> Result<Option<HttpResult>> {
        let state = self.state.lock();
        if state.down {
            return Err(NetworkError::RequestFailed("connection refused".into()).into());
        }
        if state.deny {
            return Ok(Some(HttpResult::new(HTTP_FORBIDDEN, "no right")));
        }
        Ok(state.status.map(|status| HttpResult::new(status, "forced")))
    }

    fn read(
        &self,
        params: &Pairs,
    ) -> HttpResult {
        let mut state = self.state.lock();
        state.get_requests += 1;
        match state.configs.get(&coordinates_of(params)) {
            Some(content) => HttpResult::ok(content.clone()),
            None => HttpResult::new(HTTP_NOT_FOUND, "config data not exist"),
        }
    }

    fn changed_keys(
        &self,
        listening: &[(Coordinates, String)],
    ) -> Vec<Coordinates> {
        let state = self.state.lock();
        listening
            .iter()
            .filter(|(c, md5)| {
                let current = state.configs.get(c).map(|v| fingerprint(v)).unwrap_or_default();
                current != *md5
            })
            .map(|(c, _)| c.clone())
            .collect()
    }

    async fn listen(
        &self,
        headers: &Pairs,
        params: &Pairs,
    ) -> Result<HttpResult> {
        let listening = parse_listening(param(params, PROBE_MODIFY_REQUEST).unwrap_or_default());
        let hold = param(headers, LONG_POLLING_TIMEOUT_HEADER)
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(30));
        let no_hangup = param(headers, LONG_POLLING_NO_HANGUP_HEADER).is_some();
        {
            let mut state = self.state.lock();
            state.poll_requests += 1;
            state.last_poll_headers = headers.clone();
            state.last_poll_keys = listening.len();
        }

        let mut revision = self.revision.subscribe();
        let deadline = tokio::time::Instant::now() + hold;
        loop {
            let _ = revision.borrow_and_update();
            if let Some(result) = self.precheck()? {
                return Ok(result);
            }
            let changed = self.changed_keys(&listening);
            if !changed.is_empty() || no_hangup {
                return Ok(HttpResult::ok(encode_changed(&changed)));
            }
            tokio::select! {
                _ = revision.changed() => continue,
                _ = tokio::time::sleep_until(deadline) => return Ok(HttpResult::ok("")),
            }
        }
    }
}

#[async_trait]
impl HttpAgent for FakeConfigServer {
    async fn http_get(
        &self,
        path: &str,
        _headers: &Pairs,
        params: &Pairs,
        _encoding: &str,
        _timeout: Duration,
    ) -> Result<HttpResult> {
        assert_eq!(path, CONFIG_CONTROLLER_PATH);
        if let Some(result) = self.precheck()? {
            self.state.lock().get_requests += 1;
            return Ok(result);
        }
        Ok(self.read(params))
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
        self.state.lock().last_write_params = params.clone();
        if let Some(result) = self.precheck()? {
            return Ok(result);
        }
        let content = param(params, "content").unwrap_or_default().to_string();
        self.state.lock().configs.insert(coordinates_of(params), content);
        self.bump();
        Ok(HttpResult::ok("true"))
    }

    async fn http_delete(
        &self,
        path: &str,
        _headers: &Pairs,
        params: &Pairs,
        _encoding: &str,
        _timeout: Duration,
    ) -> Result<HttpResult> {
        assert_eq!(path, CONFIG_CONTROLLER_PATH);
        self.state.lock().last_write_params = params.clone();
        if let Some(result) = self.precheck()? {
            return Ok(result);
        }
        self.state.lock().configs.remove(&coordinates_of(params));
        self.bump();
        Ok(HttpResult::ok("true"))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

pub(crate) fn param<'a>(
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
        param(params, "dataId").unwrap_or_default(),
        param(params, "group").unwrap_or_default(),
        param(params, "tenant").unwrap_or_default(),
    )
}

fn parse_listening(body: &str) -> Vec<(Coordinates, String)> {
    body.split(LINE_SEPARATOR)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(WORD_SEPARATOR).collect();
            match fields.as_slice() {
                [data_id, group, md5] => Some((coordinates(data_id, group, ""), md5.to_string())),
                [data_id, group, md5, tenant] => {
                    Some((coordinates(data_id, group, tenant), md5.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

fn encode_changed(changed: &[Coordinates]) -> String {
    let mut body = String::new();
    for (data_id, group, tenant) in changed {
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
