use {crate::Result, serde::Deserialize, std::time::Duration};

///
/// Configuration for the HTTP server
///
/// Binding, request limits and timeouts of the axum surface that feeds
/// requests into the front controller.
///
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// IP address to bind the HTTP server to
    /// The default `bind_addr` is "127.0.0.1".
    #[serde(default = "HttpConfig::default_bind_addr")]
    pub bind_addr: String,

    /// Port to bind the HTTP server to
    /// The default `bind_port` is 3000.
    #[serde(default = "HttpConfig::default_bind_port")]
    pub bind_port: u16,

    /// Maximum allowed time for a request to complete before timing out.
    /// Requests taking longer are answered with 408 Request Timeout.
    /// By default `request_timeout` is None.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Maximum payload size in bytes for incoming HTTP requests.
    /// Requests with payloads larger than this will be rejected with
    /// a 413 Payload Too Large response.
    /// By default `max_payload_size_bytes` is set to 32KiB.
    #[serde(default = "HttpConfig::default_max_payload_size_bytes")]
    pub max_payload_size_bytes: byte_unit::Byte,

    /// Route for liveness checks, answered outside the MVC pipeline.
    /// By default `liveness_route` is "/live".
    #[serde(default = "HttpConfig::default_liveness_route")]
    pub liveness_route: String,

    /// Name of the cookie carrying the session id.
    /// By default `session_cookie` is "XENSESSID".
    #[serde(default = "HttpConfig::default_session_cookie")]
    pub session_cookie: String,

    /// Inactivity after which a session is dropped from the store.
    /// Every request that uses the session restarts the clock.
    /// By default `session_expiry` is 1 hour.
    #[serde(
        default = "HttpConfig::default_session_expiry",
        with = "humantime_serde"
    )]
    pub session_expiry: Duration,

    /// Maximum time to wait for graceful shutdown to complete.
    /// After this timeout, the server will force shutdown.
    /// By default `shutdown_timeout` is set to 30 seconds.
    #[serde(
        default = "HttpConfig::default_shutdown_timeout",
        with = "humantime_serde"
    )]
    pub shutdown_timeout: Duration,
}

impl HttpConfig {
    ///
    /// Returns the full bind address as a string in the format "IP:PORT".
    ///
    pub fn full_bind_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    fn default_bind_addr() -> String {
        "127.0.0.1".into()
    }

    fn default_bind_port() -> u16 {
        3000
    }

    fn default_max_payload_size_bytes() -> byte_unit::Byte {
        byte_unit::Byte::from_u64(32 * 1024)
    }

    fn default_liveness_route() -> String {
        "/live".into()
    }

    fn default_session_cookie() -> String {
        "XENSESSID".into()
    }

    fn default_session_expiry() -> Duration {
        Duration::from_secs(3600)
    }

    fn default_shutdown_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(crate::Error::invalid_input(
                "HTTP bind_addr is required. Set [http] bind_addr = \"0.0.0.0\" or \"127.0.0.1\" in config.",
            ));
        }

        if self.bind_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(crate::Error::invalid_input(
                "HTTP bind_addr must be a valid IP address. Examples: \"127.0.0.1\", \"0.0.0.0\", \"::1\"",
            ));
        }

        if !self.liveness_route.starts_with('/') {
            return Err(crate::Error::invalid_input(
                "HTTP liveness_route must start with '/'",
            ));
        }

        if self.session_cookie.trim().is_empty()
            || self
                .session_cookie
                .contains(|c: char| c.is_whitespace() || c == ';' || c == '=')
        {
            return Err(crate::Error::invalid_input(
                "HTTP session_cookie must be a non-empty cookie name",
            ));
        }

        if self.session_expiry < Duration::from_secs(1) {
            return Err(crate::Error::invalid_input(
                "HTTP session_expiry must be at least one second",
            ));
        }

        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            bind_addr: Self::default_bind_addr(),
            bind_port: Self::default_bind_port(),
            request_timeout: None,
            max_payload_size_bytes: Self::default_max_payload_size_bytes(),
            liveness_route: Self::default_liveness_route(),
            session_cookie: Self::default_session_cookie(),
            session_expiry: Self::default_session_expiry(),
            shutdown_timeout: Self::default_shutdown_timeout(),
        }
    }
}
