use {
    crate::{Error, Result, utils::Sensitive},
    serde::Deserialize,
    std::time::Duration,
};

#[cfg(feature = "postgres")]
use sqlx_postgres::{
    PgConnectOptions as PoolConnectOptions, PgPool as Pool, PgPoolOptions as PoolOptions,
};

/// Database driver of a `[databases.<id>]` connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Mysql,
    Pgsql,
    /// Microsoft SQL Server through FreeTDS.
    Dblib,
    Sqlite,
}

///
/// One named database connection, `[databases.<id>]`.
///
/// Connections are only looked at when a `Database_<id>` resource is first
/// requested by a controller or component, so an unused but incomplete entry
/// does not prevent the application from starting.
///
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,

    /// Host name. For `sqlite` this is ignored and `dbname` is the file path.
    #[serde(default)]
    pub hostname: String,

    #[serde(default)]
    pub port: Option<u16>,

    pub dbname: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: Sensitive<String>,

    #[serde(default)]
    pub charset: Option<String>,

    /// Sets the minimum number of connections in the pool.
    /// By default `min_pool_size` is set to 1.
    #[serde(default = "DatabaseConfig::default_min_pool_size")]
    pub min_pool_size: u8,

    /// Sets the maximum number of connections in the pool.
    /// By default `max_pool_size` is set to 2.
    #[serde(default = "DatabaseConfig::default_max_pool_size")]
    pub max_pool_size: u8,

    /// Connections idle for longer than this are closed, e.g. "5m".
    #[serde(default, with = "humantime_serde")]
    pub max_idle_time: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(driver: DatabaseDriver, hostname: &str, dbname: &str) -> Self {
        Self {
            driver,
            hostname: hostname.into(),
            port: None,
            dbname: dbname.into(),
            username: String::new(),
            password: Sensitive::default(),
            charset: None,
            min_pool_size: Self::default_min_pool_size(),
            max_pool_size: Self::default_max_pool_size(),
            max_idle_time: None,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.into();
        self.password = Sensitive::from(password);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = Some(charset.into());
        self
    }

    fn default_min_pool_size() -> u8 {
        1
    }

    fn default_max_pool_size() -> u8 {
        2
    }

    pub fn validate(&self) -> Result<()> {
        if self.driver != DatabaseDriver::Sqlite && self.hostname.trim().is_empty() {
            return Err(Error::database_config(format!(
                "hostname is required for the {:?} driver",
                self.driver
            )));
        }

        if self.dbname.trim().is_empty() {
            return Err(Error::database_config("dbname is required"));
        }

        if self.max_pool_size == 0 {
            return Err(Error::database_config("max_pool_size must be > 0"));
        }

        if self.min_pool_size > self.max_pool_size {
            return Err(Error::database_config(
                "min_pool_size must not exceed max_pool_size",
            ));
        }

        Ok(())
    }

    ///
    /// Builds a lazily connected Postgres pool for this connection.
    /// The application_name is set to the crate name so sessions are easy to
    /// spot in `pg_stat_activity`.
    ///
    #[cfg(feature = "postgres")]
    pub fn create_pgpool(&self) -> Result<Pool> {
        if self.driver != DatabaseDriver::Pgsql {
            return Err(Error::database_config(format!(
                "a sqlx pool needs the pgsql driver, found {:?}",
                self.driver
            )));
        }

        let pool_options = PoolOptions::default()
            .min_connections(self.min_pool_size as u32)
            .max_connections(self.max_pool_size as u32)
            .idle_timeout(self.max_idle_time);

        let mut connect_options = PoolConnectOptions::new()
            .host(&self.hostname)
            .database(&self.dbname)
            .username(&self.username)
            .password(&self.password.0)
            .application_name(env!("CARGO_PKG_NAME"))
            .ssl_mode(sqlx_postgres::PgSslMode::Prefer);
        if let Some(port) = self.port {
            connect_options = connect_options.port(port);
        }

        Ok(pool_options.connect_lazy_with(connect_options))
    }
}
