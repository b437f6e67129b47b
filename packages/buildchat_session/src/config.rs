//! Runtime session configuration.

use std::time::Duration;

use url::Url;

/// Connect attempts are abandoned after this long.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved settings the controller needs to open session transports.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// REST base URL, e.g. `https://api.example.com`
    pub api_url: Url,
    /// Explicit WebSocket base URL; derived from `api_url` when absent
    pub ws_url: Option<Url>,
    /// Bearer token presented on connect
    pub token: Option<String>,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            ws_url: None,
            token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// WebSocket base: the explicit one, else the API URL with its scheme
    /// swapped (`http` → `ws`, `https` → `wss`).
    pub fn ws_base(&self) -> Url {
        if let Some(ws) = &self.ws_url {
            return ws.clone();
        }
        let mut base = self.api_url.clone();
        let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
        // http(s) → ws(s) is always an allowed scheme change.
        let _ = base.set_scheme(scheme);
        base
    }

    /// Full endpoint for one session: `{ws_base}/api/ws/chat/{id}?token=…`.
    pub fn session_endpoint(&self, session_id: &SessionId, token: &str) -> Url {
        let mut url = self.ws_base();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{prefix}/api/ws/chat/{session_id}"));
        url.query_pairs_mut().clear().append_pair("token", token);
        url
    }
}

/// Identifier of one chat session on the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
