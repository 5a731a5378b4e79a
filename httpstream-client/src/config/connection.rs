//! Connection target and credentials.

use http::Uri;

use crate::ConsumerError;

/// Where the stream lives and how to authenticate against it.
///
/// # Example
///
/// ```
/// use httpstream_client::ConnectionConfig;
///
/// let config = ConnectionConfig::from_url("https://stream.example.com/v1/abc?since=10")
///     .unwrap()
///     .credentials("alice", "k3y");
///
/// assert_eq!(config.port(), 443);
/// assert_eq!(config.request_target(), "/v1/abc?since=10");
/// assert_eq!(config.auth(), Some("alice:k3y"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
    use_tls: bool,
    auth: Option<String>,
    user_agent: String,
}

impl ConnectionConfig {
    /// Plain-text connection to `host:port` requesting `path`.
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (path, None),
        };
        Self {
            host: host.into(),
            port,
            path: normalize_path(path),
            query,
            use_tls: false,
            auth: None,
            user_agent: default_user_agent(),
        }
    }

    /// Parse an `http://` or `https://` URL.
    ///
    /// The scheme selects TLS and the default port (80 or 443).
    pub fn from_url(url: &str) -> Result<Self, ConsumerError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ConsumerError::Config(format!("invalid URL {url:?}: {e}")))?;

        let use_tls = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            Some(other) => {
                return Err(ConsumerError::Config(format!(
                    "unsupported URL scheme {other:?}"
                )));
            }
            None => {
                return Err(ConsumerError::Config(format!(
                    "URL {url:?} has no scheme"
                )));
            }
        };
        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConsumerError::Config(format!("URL {url:?} has no host")))?;
        let port = uri.port_u16().unwrap_or(if use_tls { 443 } else { 80 });

        Ok(Self {
            host: host.to_owned(),
            port,
            path: normalize_path(uri.path().to_owned()),
            query: uri.query().map(str::to_owned),
            use_tls,
            auth: None,
            user_agent: default_user_agent(),
        })
    }

    /// Stream for a compiled definition: `{scheme}://{stream_base}{hash}`.
    ///
    /// `stream_base` is a host plus path prefix such as
    /// `"stream.example.com/"`.
    pub fn for_definition(
        stream_base: &str,
        hash: &str,
        username: &str,
        api_key: &str,
        use_tls: bool,
    ) -> Result<Self, ConsumerError> {
        let scheme = if use_tls { "https" } else { "http" };
        let config = Self::from_url(&format!("{scheme}://{stream_base}{hash}"))?;
        Ok(config.credentials(username, api_key))
    }

    /// Set the `Auth` header to `username:api_key`.
    pub fn credentials(mut self, username: &str, api_key: &str) -> Self {
        self.auth = Some(format!("{username}:{api_key}"));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_tls(&self) -> bool {
        self.use_tls
    }

    pub fn auth(&self) -> Option<&str> {
        self.auth.as_deref()
    }

    pub fn get_user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Path plus query, as sent on the request line.
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// `httpstream-rust/{version}`.
pub fn default_user_agent() -> String {
    format!("httpstream-rust/{}", env!("CARGO_PKG_VERSION"))
}
