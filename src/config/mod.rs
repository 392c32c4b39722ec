//!
//! Configuration structures and utilities for wiring up the application.
//!
//! A configuration can be created in many ways:
//! - From an environment-specific TOML file via `Config::from_rust_env` or `Config::from_toml_file`
//! - From a TOML string via `Config::from_toml` or `str::parse`
//! - Constructed programmatically via the builder methods on `Config`
//!
//! In the TOML-based methods, environment variables can be referenced using the
//! {{ VAR_NAME }} syntax and are substituted by `replace_handlebars_with_env`
//! before parsing, which keeps database passwords out of the files.
//!
//! Configuration is split into logical sections, each represented by their own struct:
//!
//! - `ApplicationConfig` for stage, active packages and filesystem layout
//! - `HttpConfig` for HTTP server settings
//! - `LoggingConfig` for logging and tracing settings
//! - `DatabaseConfig` for each named connection under `[databases.<id>]`
//! - `PackageConfig` for routes, dependencies, handlers and settings of each package
//!
//! ```toml
//! [application]
//! stage = "development"
//! packages = ["blog"]
//!
//! [packages.main.routes.home]
//! path = "/"
//! controller = "index"
//! action = "index"
//!
//! [packages.blog.routes.post_show]
//! path = "/posts/{id}"
//! controller = "post"
//! action = "show"
//! constraints = { id = "[0-9]+" }
//! cache = { expires = 60 }
//! ```
//!
mod application;
mod database;
mod http;
mod logging;
mod packages;

pub use application::*;
pub use database::*;
pub use http::*;
pub use logging::*;
pub use packages::*;

pub use byte_unit::Byte;

use {
    crate::{Error, Result, utils::replace_handlebars_with_env},
    serde::Deserialize,
    std::{collections::HashMap, env, fs, path::PathBuf, str::FromStr, time::Duration},
};

///
/// The whole application configuration, one field per TOML section.
///
/// Every section has defaults, so an empty document is a valid
/// configuration. Packages other than `main` must be listed in
/// `[application] packages` for their routes to be compiled.
///
/// # Examples
///
/// ```
/// use axum_mvc::Config;
/// use std::time::Duration;
///
/// let config = Config::from_toml(
///     r#"
/// [http]
/// bind_port = 8080
/// session_expiry = "30m"
///
/// [packages.main.routes.home]
/// path = "/"
/// controller = "index"
/// action = "index"
/// "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.http.full_bind_addr(), "127.0.0.1:8080");
/// assert_eq!(config.http.session_expiry, Duration::from_secs(30 * 60));
/// assert!(config.package("main").is_some());
/// assert!(config.validate().is_ok());
/// ```
///
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub databases: HashMap<String, DatabaseConfig>,
    #[serde(default)]
    pub packages: HashMap<String, PackageConfig>,
}

impl Default for Config {
    ///
    /// Creates a default configuration.
    /// This will attempt to load configuration from the file based on the RUST_ENV
    /// environment variable falling back to a default configuration if the environment
    /// variable is not set. Configuration files should be located in the "config/"
    /// directory of your project.
    ///
    fn default() -> Self {
        match Self::from_rust_env() {
            Ok(config) => config,
            Err(_) => Config {
                application: ApplicationConfig::default(),
                http: HttpConfig::default(),
                logging: LoggingConfig::default(),
                databases: HashMap::new(),
                packages: HashMap::new(),
            },
        }
    }
}

impl Config {
    ///
    /// Loads the configuration from a file based on the RUST_ENV environment variable.
    ///
    /// With `RUST_ENV=prod` this reads `config/prod.toml`, relative to the
    /// working directory, through [`Config::from_toml_file`].
    ///
    /// # Errors
    ///
    /// Fails when RUST_ENV is unset or the file cannot be read, and when its
    /// TOML does not describe a `Config`.
    ///
    pub fn from_rust_env() -> Result<Config> {
        Self::from_toml_file(env::var("RUST_ENV")?)
    }

    ///
    /// Given an environment name, loads "config/{env}.toml", substitutes any
    /// environment variables, and returns a Config struct.
    ///
    /// # Arguments
    ///
    /// * `env` - Environment name such as "dev" or "prod"
    ///
    /// # Returns
    ///
    /// The parsed configuration. It is not validated yet; the application
    /// builder does that before the first request.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use axum_mvc::Config;
    ///
    /// // Reads config/dev.toml
    /// let config = Config::from_toml_file("dev")?;
    /// config.setup_tracing();
    /// # Ok::<(), axum_mvc::Error>(())
    /// ```
    ///
    pub fn from_toml_file(env: impl AsRef<str>) -> Result<Config> {
        let path = format!("config/{}.toml", env.as_ref());
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    ///
    /// Parses a configuration string in TOML format into a Config struct.
    ///
    /// `{{ VAR }}` placeholders are replaced with the value of the
    /// environment variable VAR before parsing.
    ///
    /// # Examples
    ///
    /// ```
    /// use axum_mvc::Config;
    ///
    /// let config = Config::from_toml(
    ///     r#"
    /// [application]
    /// packages = ["blog"]
    /// default_role = "visitor"
    /// "#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.application.active_packages(), ["main", "blog"]);
    /// assert_eq!(config.application.default_role, "visitor");
    /// ```
    ///
    pub fn from_toml(toml_str: &str) -> Result<Config> {
        toml_str.parse()
    }

    /// Sets the HTTP server bind address of the HttpConfig.
    pub fn with_bind_addr<S: AsRef<str>>(mut self, addr: S) -> Self {
        self.http.bind_addr = addr.as_ref().into();
        self
    }

    /// Sets the HTTP server bind port of the HttpConfig.
    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.http.bind_port = port;
        self
    }

    /// Sets the request timeout duration of the HttpConfig.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http.request_timeout = Some(timeout);
        self
    }

    /// Sets the maximum payload size in bytes of the HttpConfig.
    pub fn with_max_payload_size_bytes(mut self, size: u64) -> Self {
        self.http.max_payload_size_bytes = Byte::from_u64(size);
        self
    }

    /// Sets the liveness route path of the HttpConfig.
    pub fn with_liveness_route(mut self, route: &str) -> Self {
        self.http.liveness_route = route.into();
        self
    }

    /// Sets the session inactivity timeout of the HttpConfig.
    pub fn with_session_expiry(mut self, expiry: Duration) -> Self {
        self.http.session_expiry = expiry;
        self
    }

    /// Sets the log format of the LoggingConfig.
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.logging.format = format;
        self
    }

    /// Sets the deployment stage of the ApplicationConfig.
    pub fn with_stage(mut self, stage: AppStage) -> Self {
        self.application.stage = stage;
        self
    }

    /// Sets the application root directory (views and layouts live below it).
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.application.root = root.into();
        self
    }

    /// Sets the page cache directory of the ApplicationConfig.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.application.cache_dir = dir.into();
        self
    }

    /// Sets the role used before any package role resolver runs.
    pub fn with_default_role(mut self, role: &str) -> Self {
        self.application.default_role = role.into();
        self
    }

    /// Sets the active packages. `main` is implied.
    pub fn with_packages(mut self, packages: &[&str]) -> Self {
        self.application.packages = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Sets the configuration of one package, replacing any previous one.
    pub fn with_package_config(mut self, package: &str, config: PackageConfig) -> Self {
        self.packages.insert(package.into(), config);
        self
    }

    ///
    /// Declares a route in the given package.
    ///
    /// # Arguments
    ///
    /// * `package` - Package owning the route, created when missing
    /// * `name` - Route name, used by `Router::to_url`; an existing route of
    ///   that name is replaced in place
    /// * `route` - Path pattern, target controller and action
    ///
    /// # Examples
    ///
    /// ```
    /// use axum_mvc::{Config, config::RouteDeclaration};
    ///
    /// let config = Config::from_toml("").unwrap()
    ///     .with_route("main", "home", RouteDeclaration::new("/", "index", "index"))
    ///     .with_route(
    ///         "main",
    ///         "post",
    ///         RouteDeclaration::new("/posts/{id}", "post", "show").with_constraint("id", "[0-9]+"),
    ///     );
    ///
    /// assert_eq!(config.package("main").unwrap().routes.len(), 2);
    /// ```
    ///
    pub fn with_route(mut self, package: &str, name: &str, route: RouteDeclaration) -> Self {
        self.packages
            .entry(package.into())
            .or_default()
            .routes
            .insert(name, route);
        self
    }

    ///
    /// Adds a named database connection.
    ///
    /// # Arguments
    ///
    /// * `id` - Connection id; the container serves it as `Database_<id>`
    /// * `database` - Connection settings, checked when first requested
    ///
    pub fn with_database(mut self, id: &str, database: DatabaseConfig) -> Self {
        self.databases.insert(id.into(), database);
        self
    }

    /// Returns the configuration of a package, if any was given.
    pub fn package(&self, name: &str) -> Option<&PackageConfig> {
        self.packages.get(name)
    }

    ///
    /// Ensures that the configuration is valid.
    /// Database connections are validated lazily, when first requested, so
    /// only their shape is checked here.
    ///
    /// # Returns
    ///
    /// The first section error found, in the order application, http,
    /// logging. Packages configured but not active only log a warning.
    ///
    /// # Examples
    ///
    /// ```
    /// use axum_mvc::{Config, ErrorKind};
    ///
    /// let config = Config::from_toml("").unwrap().with_bind_addr("localhost");
    /// assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::InvalidInput);
    /// ```
    ///
    pub fn validate(&self) -> Result<()> {
        self.application.validate()?;
        self.http.validate()?;
        self.logging.validate()?;

        let active = self.application.active_packages();
        for name in self.packages.keys() {
            if !active.contains(name) {
                tracing::warn!(
                    package = %name,
                    "Package is configured but not listed in [application] packages; its routes are ignored"
                );
            }
        }

        Ok(())
    }

    ///
    /// Sets up the tracing subscriber for logging based on the LoggingConfig.
    ///
    /// NOTE: This should be called early during startup to ensure logging is configured
    ///       before any log messages are emitted.
    ///
    pub fn setup_tracing(&self) {
        use tracing_subscriber::{EnvFilter, prelude::*};
        let env_filter = EnvFilter::from_default_env();
        match self.logging.format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer().json())
                    .with(env_filter)
                    .try_init();
            }
            LogFormat::Default => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer())
                    .with(env_filter)
                    .try_init();
            }
            LogFormat::Compact => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer().compact())
                    .with(env_filter)
                    .try_init();
            }
            LogFormat::Pretty => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .with(env_filter)
                    .try_init();
            }
        }
    }
}

///
/// Parses a configuration string with references to environment variables
/// into a Config struct by substituting the environment variables and then
/// parsing the resulting TOML.
///
impl FromStr for Config {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let config_file = replace_handlebars_with_env(s);
        let config = toml::from_str::<Config>(&config_file)?;
        Ok(config)
    }
}
