use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tracing::debug;
use ureq::{http::Response, Agent, Body, Proxy};
use url::Url;

use crate::error::DownloadError;

const PROXY_AUTH_REQUIRED: u16 = 407;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxySettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    fn has_credentials(&self) -> bool {
        self.username.is_some()
    }

    fn to_proxy(&self, with_credentials: bool) -> Result<Proxy, DownloadError> {
        let invalid = |reason: String| {
            DownloadError::InvalidProxy {
                proxy: self.url.clone(),
                reason,
            }
        };

        if !with_credentials || !self.has_credentials() {
            return Proxy::new(&self.url).map_err(|err| invalid(err.to_string()));
        }

        let mut url = Url::parse(&self.url).map_err(|source| {
            DownloadError::InvalidUrl {
                url: self.url.clone(),
                source,
            }
        })?;
        // Url percent-encodes both parts, which is what the proxy URI parser expects.
        url.set_username(self.username.as_deref().unwrap_or_default())
            .and_then(|()| url.set_password(self.password.as_deref()))
            .map_err(|()| invalid("credentials need a proxy url with a host".into()))?;

        Proxy::new(url.as_str()).map_err(|err| invalid(err.to_string()))
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub proxy: Option<ProxySettings>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    /// Creates a default ClientConfig: `driverman/<version>` user agent, no proxy, 30 second
    /// connect timeout and 30 minute read timeout.
    fn default() -> Self {
        Self {
            user_agent: Some(concat!("driverman/", env!("CARGO_PKG_VERSION")).into()),
            proxy: None,
            connect_timeout: Some(Duration::from_secs(30)),
            read_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl ClientConfig {
    fn agent(&self, proxy: Option<Proxy>) -> Agent {
        let mut config = ureq::Agent::config_builder()
            .proxy(proxy)
            .http_status_as_error(false)
            .timeout_connect(self.connect_timeout)
            .timeout_recv_response(self.read_timeout)
            .timeout_recv_body(self.read_timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent.as_str());
        }

        config.build().into()
    }

    /// Builds an [`HttpClient`] configured from this `ClientConfig`.
    ///
    /// When the proxy carries credentials a second agent with the credentials embedded is
    /// prepared, but it is only used once the proxy has answered `407 Proxy Authentication
    /// Required`.
    pub fn build(&self) -> Result<HttpClient, DownloadError> {
        let (agent, auth_agent) = match &self.proxy {
            Some(proxy) => {
                let agent = self.agent(Some(proxy.to_proxy(false)?));
                let auth_agent = if proxy.has_credentials() {
                    Some(self.agent(Some(proxy.to_proxy(true)?)))
                } else {
                    None
                };
                (agent, auth_agent)
            }
            None => (self.agent(None), None),
        };

        Ok(HttpClient {
            agent,
            auth_agent,
            authenticated: AtomicBool::new(false),
        })
    }
}

/// A CONNECT tunnel refused with `407 Proxy Authentication Required`.
fn is_proxy_auth_required(err: &ureq::Error) -> bool {
    matches!(err, ureq::Error::ConnectProxyFailed(msg) if msg.contains("407"))
}

/// A blocking HTTP client.
///
/// Responses are returned regardless of their status code; callers decide what counts as
/// success.
pub struct HttpClient {
    agent: Agent,
    auth_agent: Option<Agent>,
    authenticated: AtomicBool,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("proxy_auth", &self.auth_agent.is_some())
            .field("authenticated", &self.authenticated.load(Ordering::Relaxed))
            .finish()
    }
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, DownloadError> {
        config.build()
    }

    fn current_agent(&self) -> &Agent {
        match &self.auth_agent {
            Some(agent) if self.authenticated.load(Ordering::Relaxed) => agent,
            _ => &self.agent,
        }
    }

    /// Sends a GET request.
    ///
    /// If the proxy demands authentication and credentials are configured, the request is
    /// repeated once with credentials and every later request carries them too.
    pub fn get(&self, url: &str) -> Result<Response<Body>, DownloadError> {
        let result = self.current_agent().get(url).call();

        let needs_auth = match &result {
            Ok(resp) => resp.status().as_u16() == PROXY_AUTH_REQUIRED,
            Err(err) => is_proxy_auth_required(err),
        };

        let result = match &self.auth_agent {
            Some(auth_agent) if needs_auth && !self.authenticated.load(Ordering::Relaxed) => {
                debug!("proxy requires authentication, retrying {} with credentials", url);
                self.authenticated.store(true, Ordering::Relaxed);
                auth_agent.get(url).call()
            }
            _ => result,
        };

        result.map_err(|err| {
            if is_proxy_auth_required(&err) {
                DownloadError::HttpError {
                    status: PROXY_AUTH_REQUIRED,
                    url: url.to_string(),
                }
            } else {
                DownloadError::from(err)
            }
        })
    }
}
