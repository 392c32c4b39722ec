//!
//! The `Database_<id>[_<orm>]` resource family.
//!
//! These resources are never created up front. The first time a controller
//! or component asks for `Database_blog`, the `[databases.blog]` section is
//! looked up and a [`DatabaseAdapter`] is built and cached for the rest of
//! the request. The `_pdo` suffix is the same as no suffix; `_sqlx` yields a
//! lazily connected Postgres pool when the `postgres` feature is enabled.
//!

use {
    super::{Container, Resource, resources},
    crate::{
        Error, Result,
        config::{Config, DatabaseConfig, DatabaseDriver},
        utils::Sensitive,
    },
    std::{collections::HashMap, fmt, sync::Arc},
};

const PREFIX: &str = "Database_";

///
/// Connection settings of one database, with the DSN chosen for its driver.
///
/// ```
/// use axum_mvc::config::{DatabaseConfig, DatabaseDriver};
/// use axum_mvc::kernel::DatabaseAdapter;
///
/// let config = DatabaseConfig::new(DatabaseDriver::Mysql, "db.local", "blog")
///     .with_port(3306)
///     .with_charset("utf8mb4");
/// let adapter = DatabaseAdapter::from_config("blog", &config).unwrap();
/// assert_eq!(adapter.dsn(), "mysql:host=db.local;port=3306;dbname=blog;charset=utf8mb4");
/// ```
///
#[derive(Clone)]
pub struct DatabaseAdapter {
    id: String,
    driver: DatabaseDriver,
    dsn: String,
    username: String,
    password: Sensitive<String>,
}

impl DatabaseAdapter {
    pub fn from_config(id: &str, config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;

        let port = config.port.map(|p| p.to_string());
        let dsn = match config.driver {
            DatabaseDriver::Mysql => {
                let mut dsn = format!("mysql:host={}", config.hostname);
                if let Some(port) = &port {
                    dsn.push_str(&format!(";port={port}"));
                }
                dsn.push_str(&format!(";dbname={}", config.dbname));
                if let Some(charset) = &config.charset {
                    dsn.push_str(&format!(";charset={charset}"));
                }
                dsn
            }
            DatabaseDriver::Pgsql => {
                let mut dsn = format!("pgsql:host={}", config.hostname);
                if let Some(port) = &port {
                    dsn.push_str(&format!(";port={port}"));
                }
                dsn.push_str(&format!(
                    ";dbname={};user={};password={}",
                    config.dbname, config.username, config.password.0
                ));
                dsn
            }
            DatabaseDriver::Dblib => {
                let mut dsn = format!("dblib:host={}", config.hostname);
                if let Some(port) = &port {
                    dsn.push_str(&format!(",{port}"));
                }
                dsn.push_str(&format!(
                    ";Database={},{},{}",
                    config.dbname, config.username, config.password.0
                ));
                dsn
            }
            DatabaseDriver::Sqlite => format!("sqlite:{}", config.dbname),
        };

        Ok(Self {
            id: id.to_string(),
            driver: config.driver,
            dsn,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn driver(&self) -> DatabaseDriver {
        self.driver
    }

    /// Data source name. For `pgsql` and `dblib` it embeds the credentials.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password.0
    }
}

impl fmt::Debug for DatabaseAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseAdapter")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("username", &self.username)
            .field("password", &self.password)
            .finish()
    }
}

pub(crate) fn is_database_resource(name: &str) -> bool {
    name.strip_prefix(PREFIX).is_some_and(|rest| !rest.is_empty())
}

///
/// Builds the resource for `Database_<id>[_<orm>]`. The `Databases` resource
/// is filled from the application configuration on first use.
///
pub(crate) fn resolve(container: &mut Container, name: &str) -> Result<Resource> {
    let rest = name
        .strip_prefix(PREFIX)
        .ok_or_else(|| Error::resource_not_found(name))?;
    let (id, orm) = rest.split_once('_').unwrap_or((rest, ""));

    if !container.has_resource(resources::DATABASES) {
        let application = container.get::<Config>(resources::APPLICATION_CONFIG)?;
        container.add_resource(resources::DATABASES, Arc::new(application.databases.clone()));
    }

    let databases = container.get::<HashMap<String, DatabaseConfig>>(resources::DATABASES)?;
    let config = databases
        .get(id)
        .ok_or_else(|| Error::dependency_database_not_found(id))?;

    tracing::debug!(database = %id, orm = %orm, "Opening database resource");

    match orm {
        "" | "pdo" => Ok(Arc::new(DatabaseAdapter::from_config(id, config)?)),
        #[cfg(feature = "postgres")]
        "sqlx" => {
            config.validate()?;
            Ok(Arc::new(config.create_pgpool()?))
        }
        #[cfg(not(feature = "postgres"))]
        "sqlx" => Err(Error::config(format!(
            "{} needs the postgres feature",
            name
        ))),
        other => Err(Error::config(format!(
            "Unknown database flavour {} in {}",
            other, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, kernel::ComponentRegistry};

    fn container(config: Config) -> Container {
        let mut container = Container::new(Arc::new(ComponentRegistry::new()));
        container.add_resource(resources::APPLICATION_CONFIG, Arc::new(config));
        container
    }

    fn blog() -> DatabaseConfig {
        DatabaseConfig::new(DatabaseDriver::Pgsql, "localhost", "blog")
            .with_credentials("writer", "secret")
    }

    #[test]
    fn test_dsn_per_driver() {
        let pg = DatabaseAdapter::from_config("blog", &blog().with_port(5433)).unwrap();
        assert_eq!(
            pg.dsn(),
            "pgsql:host=localhost;port=5433;dbname=blog;user=writer;password=secret"
        );

        let mysql = DatabaseAdapter::from_config(
            "shop",
            &DatabaseConfig::new(DatabaseDriver::Mysql, "db", "shop"),
        )
        .unwrap();
        assert_eq!(mysql.dsn(), "mysql:host=db;dbname=shop");

        let dblib = DatabaseAdapter::from_config(
            "erp",
            &DatabaseConfig::new(DatabaseDriver::Dblib, "mssql", "erp")
                .with_port(1433)
                .with_credentials("sa", "pw"),
        )
        .unwrap();
        assert_eq!(dblib.dsn(), "dblib:host=mssql,1433;Database=erp,sa,pw");

        let sqlite = DatabaseAdapter::from_config(
            "local",
            &DatabaseConfig::new(DatabaseDriver::Sqlite, "", "data/app.db"),
        )
        .unwrap();
        assert_eq!(sqlite.dsn(), "sqlite:data/app.db");
    }

    #[test]
    fn test_debug_hides_password() {
        let adapter = DatabaseAdapter::from_config("blog", &blog()).unwrap();
        let debug = format!("{:?}", adapter);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("writer"));
    }

    #[test]
    fn test_family_names() {
        assert!(is_database_resource("Database_blog"));
        assert!(is_database_resource("Database_blog_pdo"));
        assert!(!is_database_resource("Database_"));
        assert!(!is_database_resource("Databases"));
        assert!(!is_database_resource("Mailer"));
    }

    #[test]
    fn test_resolve_through_container() {
        let mut container = container(Config::default().with_database("blog", blog()));
        assert!(!container.has_resource(resources::DATABASES));

        let adapter = container
            .resolve("Database_blog")
            .unwrap()
            .downcast::<DatabaseAdapter>()
            .unwrap();
        assert_eq!(adapter.id(), "blog");
        assert!(container.has_resource(resources::DATABASES));
        assert!(container.has_resource("Database_blog"));

        let pdo = container.resolve("Database_blog_pdo").unwrap();
        assert!(pdo.downcast::<DatabaseAdapter>().is_ok());
    }

    #[test]
    fn test_unknown_database() {
        let mut container = container(Config::default());
        let err = container.resolve("Database_nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyDatabaseNotFound);
    }

    #[test]
    fn test_unknown_flavour() {
        let mut container = container(Config::default().with_database("blog", blog()));
        let err = container.resolve("Database_blog_doctrine").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_incomplete_settings_fail_on_use() {
        let broken = DatabaseConfig::new(DatabaseDriver::Mysql, "", "shop");
        let mut container = container(Config::default().with_database("shop", broken));
        let err = container.resolve("Database_shop").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
    }
}
