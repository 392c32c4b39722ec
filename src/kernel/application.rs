//!
//! The application: configuration and registered packages, validated once
//! at startup, plus the state shared by all requests.
//!

use {
    super::{Container, FrontController, PageCache, Router, resources},
    crate::{
        Config, Error, Result,
        config::MAIN_PACKAGE,
        http::{Request, Response, Session},
        mvc::OutputBuffer,
        package::{Package, PackageRegistry},
    },
    parking_lot::Mutex,
    std::sync::Arc,
    tower_sessions::MemoryStore,
};

///
/// A built application. Cheap to clone; every clone serves requests from
/// the same router, page cache and session store.
///
/// ```no_run
/// use axum_mvc::{Application, Config, package::Package};
///
/// # fn build(main: Package) -> axum_mvc::Result<()> {
/// let config = Config::from_toml_file("dev")?;
/// let app = Application::builder(config).package(main).build()?;
/// # Ok(())
/// # }
/// ```
///
#[derive(Debug, Clone)]
pub struct Application {
    config: Arc<Config>,
    active: Arc<Vec<String>>,
    router: Arc<Router>,
    cache: Arc<PageCache>,
    packages: Arc<PackageRegistry>,
    sessions: MemoryStore,
}

#[derive(Debug)]
pub struct ApplicationBuilder {
    config: Config,
    packages: Vec<Package>,
}

impl ApplicationBuilder {
    /// Registers a package. Registering the same name twice keeps the last one.
    #[must_use]
    pub fn package(mut self, package: Package) -> Self {
        self.packages.retain(|p| p.name() != package.name());
        self.packages.push(package);
        self
    }

    ///
    /// Validates the configuration against the registered packages and
    /// compiles the routes. Everything that can be checked before the first
    /// request is checked here.
    ///
    pub fn build(self) -> Result<Application> {
        self.config.validate()?;

        let active = self.config.application.active_packages();
        let registry = PackageRegistry::new(self.packages, &active);

        match registry.get(MAIN_PACKAGE) {
            Some(main) if main.has_error_controller() => {}
            Some(_) => {
                return Err(Error::config(
                    "Package main must register an error controller",
                ));
            }
            None => return Err(Error::config("Package main is not registered")),
        }

        for name in &active {
            let package = registry.get(name).ok_or_else(|| {
                Error::config(format!("Package {} is active but not registered", name))
            })?;
            let handlers = self
                .config
                .package(name)
                .map(|p| p.handlers.keys().collect::<Vec<_>>())
                .unwrap_or_default();
            if let Some(missing) = handlers
                .iter()
                .find(|handler| package.handler_factory(handler).is_none())
            {
                return Err(Error::config(format!(
                    "Handler {} of package {} is not registered",
                    missing, name
                )));
            }
        }

        for name in registry.names() {
            if !active.iter().any(|a| a == name) {
                tracing::warn!(package = %name, "Package is registered but not active");
            }
        }

        let router = Router::from_config(&self.config)?;
        for route in router.routes() {
            let registered = registry
                .get(route.package())
                .is_some_and(|p| p.has_controller(route.namespace(), route.controller()));
            if !registered {
                return Err(Error::config(format!(
                    "Route {} points to {}/{}, which package {} does not register",
                    route.name(),
                    route.namespace(),
                    route.controller(),
                    route.package()
                )));
            }
        }

        let cache = PageCache::new(self.config.application.cache_dir.clone());

        tracing::info!(
            stage = %self.config.application.stage,
            packages = ?active,
            routes = router.routes().len(),
            "Application built"
        );

        Ok(Application {
            config: Arc::new(self.config),
            active: Arc::new(active),
            router: Arc::new(router),
            cache: Arc::new(cache),
            packages: Arc::new(registry),
            sessions: MemoryStore::default(),
        })
    }
}

impl Application {
    pub fn builder(config: Config) -> ApplicationBuilder {
        ApplicationBuilder {
            config,
            packages: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn packages(&self) -> &PackageRegistry {
        &self.packages
    }

    /// Store behind the session layer of every router built from this
    /// application.
    pub fn sessions(&self) -> &MemoryStore {
        &self.sessions
    }

    ///
    /// Handles one request from start to finish. Blocking: views are read
    /// from disk and the page cache is file based.
    ///
    /// # Arguments
    ///
    /// * `request` - the collected request
    /// * `session` - the session snapshot the server loaded for the request;
    ///   changes made by the action are saved by the caller afterwards
    ///
    pub fn handle(&self, request: Request, session: Arc<Session>) -> Response {
        let mut container = Container::new(self.packages.components().clone());
        container.add_resource(resources::PACKAGES, self.active.clone());
        container.add_resource(resources::APP_STAGE, Arc::new(self.config.application.stage));
        container.add_resource(resources::APPLICATION_CONFIG, self.config.clone());
        container.add_resource(resources::REQUEST, Arc::new(Mutex::new(request)));
        container.add_resource(resources::SESSION, session);
        container.add_resource(
            resources::ROLE,
            Arc::new(self.config.application.default_role.clone()),
        );
        container.add_resource(resources::CACHE, self.cache.clone());
        container.add_resource(resources::ROUTER, self.router.clone());
        container.add_resource(resources::OUTPUT, Arc::new(OutputBuffer::new()));

        FrontController::new(container, self.packages.clone()).run()
    }
}
