//!
//! Fills a request container with the resources of one package.
//!
//! The front controller bootstraps in two steps. The minimal bootstrap only
//! asks the matched package who the current user is (the `Role` resource),
//! which is all the ACL check needs. The full bootstrap runs on dispatch:
//! first every framework default resource, in a fixed order, then the
//! package's own init resources in registration order. A package may
//! replace any default with [`Package::default_resource`].
//!

use {
    super::{Container, Resource, resources},
    crate::{
        Error, Result,
        config::{Config, DependencyMap, MAIN_PACKAGE, PackageSettings},
        events::EventSystem,
        kernel::Router,
        mvc::{ActionHelperBroker, Template, UrlHelper, ViewHelperBroker},
        package::{Package, PackageRegistry},
    },
    parking_lot::Mutex,
    std::{path::PathBuf, sync::Arc},
};

/// Framework resources created by [`Bootstrap::bootstrap`], in creation order.
pub const DEFAULT_RESOURCES: [&str; 12] = [
    resources::CONFIG,
    resources::PACKAGE,
    resources::PACKAGE_PATH,
    resources::VIEW_HELPER_BROKER,
    resources::ACTION_HELPER_BROKER,
    resources::LAYOUT_PATH,
    resources::ERROR_LAYOUT_PATH,
    resources::LAYOUT,
    resources::ERROR_LAYOUT,
    resources::EVENT_SYSTEM,
    resources::HANDLERS,
    resources::DEPENDENCIES,
];

const LAYOUT_FILE: &str = "layout.html";
const ERROR_LAYOUT_FILE: &str = "exception.html";

#[derive(Debug, Clone, Copy)]
pub struct Bootstrap<'a> {
    package: &'a Package,
    registry: &'a PackageRegistry,
}

impl<'a> Bootstrap<'a> {
    pub fn new(package: &str, registry: &'a PackageRegistry) -> Result<Self> {
        let package = registry
            .get(package)
            .ok_or_else(|| Error::config(format!("Package {} is not registered", package)))?;
        Ok(Self { package, registry })
    }

    pub fn package(&self) -> &str {
        self.package.name()
    }

    /// Runs the package's role resolver, if it has one.
    pub fn minimal_bootstrap(&self, container: &mut Container) -> Result<()> {
        if let Some(resolver) = self.package.role_resolver() {
            let role = resolver(container)?;
            tracing::debug!(package = %self.package.name(), role = %role, "Role resolved");
            container.add_resource(resources::ROLE, Arc::new(role));
        }
        Ok(())
    }

    pub fn bootstrap(&self, container: &mut Container) -> Result<()> {
        for name in DEFAULT_RESOURCES {
            let resource = match self.package.default_override(name) {
                Some(factory) => factory(container)?,
                None => self.default_resource(name, container)?,
            };
            container.add_shared(name, resource);
        }

        for (name, factory) in self.package.init_resources() {
            let resource = factory(container)?;
            container.add_shared(name, resource);
        }

        tracing::debug!(
            package = %self.package.name(),
            init_resources = self.package.init_resources().len(),
            "Package bootstrapped"
        );
        Ok(())
    }

    fn main_package(&self) -> Option<&'a Package> {
        self.registry.get(MAIN_PACKAGE)
    }

    fn default_resource(&self, name: &str, container: &mut Container) -> Result<Resource> {
        let application = container.get::<Config>(resources::APPLICATION_CONFIG)?;
        let package = self.package.name();

        let resource: Resource = match name {
            resources::CONFIG => Arc::new(PackageSettings::new(
                application
                    .package(package)
                    .map(|p| p.config.clone())
                    .unwrap_or_default(),
            )),
            resources::PACKAGE => Arc::new(package.to_string()),
            resources::PACKAGE_PATH => Arc::new(
                application
                    .application
                    .root
                    .join("packages")
                    .join(package),
            ),
            resources::VIEW_HELPER_BROKER => {
                let router = container.get::<Router>(resources::ROUTER)?;
                let mut broker = ViewHelperBroker::new(package);
                broker.register("url", Arc::new(UrlHelper::new(router)));
                for source in self.helper_sources() {
                    broker.extend(source.view_helpers());
                }
                Arc::new(broker)
            }
            resources::ACTION_HELPER_BROKER => {
                let mut broker = ActionHelperBroker::new(package);
                for source in self.helper_sources() {
                    broker.extend(source.action_helpers());
                }
                Arc::new(broker)
            }
            resources::LAYOUT_PATH => Arc::new(self.layout_path(
                container,
                &application,
                "mvc.layout_path",
                application.application.layout_path.as_ref(),
                "default",
            )?),
            resources::ERROR_LAYOUT_PATH => Arc::new(self.layout_path(
                container,
                &application,
                "mvc.error_layout_path",
                application.application.error_layout_path.as_ref(),
                "error",
            )?),
            resources::LAYOUT => {
                Arc::new(self.layout(container, resources::LAYOUT_PATH, LAYOUT_FILE)?)
            }
            resources::ERROR_LAYOUT => Arc::new(self.layout(
                container,
                resources::ERROR_LAYOUT_PATH,
                ERROR_LAYOUT_FILE,
            )?),
            resources::EVENT_SYSTEM => Arc::new(EventSystem::with_conventions(
                package,
                self.package.conventions().clone(),
            )),
            resources::HANDLERS => Arc::new(self.add_handlers(container, &application)?),
            resources::DEPENDENCIES => Arc::new(self.dependencies(&application)),
            other => {
                return Err(Error::config(format!(
                    "{} is not a default resource",
                    other
                )));
            }
        };
        Ok(resource)
    }

    /// `main` first, then the package itself.
    fn helper_sources(&self) -> Vec<&'a Package> {
        let mut sources: Vec<&Package> = self.main_package().into_iter().collect();
        if self.package.name() != MAIN_PACKAGE {
            sources.push(self.package);
        }
        sources
    }

    ///
    /// Package setting, then application setting, then the layout directory
    /// of `main`.
    ///
    fn layout_path(
        &self,
        container: &Container,
        application: &Config,
        setting: &str,
        fallback: Option<&PathBuf>,
        default_dir: &str,
    ) -> Result<PathBuf> {
        let settings = container.get::<PackageSettings>(resources::CONFIG)?;
        let path = settings
            .get_str(setting)
            .map(PathBuf::from)
            .or_else(|| fallback.cloned())
            .unwrap_or_else(|| {
                application
                    .application
                    .root
                    .join("packages")
                    .join(MAIN_PACKAGE)
                    .join("layouts")
                    .join(default_dir)
            });
        Ok(path)
    }

    fn layout(&self, container: &Container, path_resource: &str, file: &str) -> Result<Mutex<Template>> {
        let dir = container.get::<PathBuf>(path_resource)?;
        let helpers = container.get::<ViewHelperBroker>(resources::VIEW_HELPER_BROKER)?;
        let mut layout = Template::file(dir.join(file));
        layout.set_helpers(helpers);
        Ok(Mutex::new(layout))
    }

    ///
    /// Adds the handlers listed in the package's `handlers` section to the
    /// event system and returns their names.
    ///
    fn add_handlers(&self, container: &Container, application: &Config) -> Result<Vec<String>> {
        let events = container.get::<EventSystem>(resources::EVENT_SYSTEM)?;
        let Some(declared) = application.package(self.package.name()).map(|p| &p.handlers) else {
            return Ok(Vec::new());
        };

        let mut names = Vec::with_capacity(declared.len());
        for (name, subscribed) in declared.iter() {
            let factory = self.package.handler_factory(name).ok_or_else(|| {
                Error::config(format!(
                    "Handler {} of package {} is not registered",
                    name,
                    self.package.name()
                ))
            })?;
            events.add_boxed_handler(name, subscribed.clone(), factory());
            names.push(name.to_string());
        }
        Ok(names)
    }

    /// Dependency declarations of the active packages; a later package
    /// replaces a component's whole entry.
    fn dependencies(&self, application: &Config) -> DependencyMap {
        let mut merged = DependencyMap::new();
        for name in application.application.active_packages() {
            if let Some(package) = application.package(&name) {
                for (component, declared) in package.dependencies.iter() {
                    merged.insert(component, declared.clone());
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ErrorKind,
        config::{DependencyValue, PackageConfig},
        events::Event,
        kernel::PageCache,
        mvc::HelperArgs,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(packages: Vec<Package>, config: &Config) -> PackageRegistry {
        PackageRegistry::new(packages, &config.application.active_packages())
    }

    fn seeded(config: Config, registry: &PackageRegistry) -> Container {
        let mut container = Container::new(registry.components().clone());
        container.add_resource(resources::ROUTER, Arc::new(Router::from_config(&config).unwrap()));
        container.add_resource(resources::CACHE, Arc::new(PageCache::new("cache")));
        container.add_resource(resources::ROLE, Arc::new(config.application.default_role.clone()));
        container.add_resource(resources::APPLICATION_CONFIG, Arc::new(config));
        container
    }

    #[test]
    fn test_defaults_are_created_in_order() {
        let config = Config::default()
            .with_root("app")
            .with_packages(&["blog"])
            .with_package_config(
                "blog",
                PackageConfig::default().with_setting("title", "Blog"),
            );
        let registry = registry(vec![Package::new("main"), Package::new("blog")], &config);
        let mut container = seeded(config, &registry);

        Bootstrap::new("blog", &registry)
            .unwrap()
            .bootstrap(&mut container)
            .unwrap();

        for name in DEFAULT_RESOURCES {
            assert!(container.has_resource(name), "{name} missing");
        }
        assert_eq!(*container.get::<String>(resources::PACKAGE).unwrap(), "blog");
        assert_eq!(
            container.get::<PackageSettings>(resources::CONFIG).unwrap().get_str("title"),
            Some("Blog")
        );
        assert_eq!(
            *container.get::<PathBuf>(resources::PACKAGE_PATH).unwrap(),
            PathBuf::from("app/packages/blog")
        );
        assert_eq!(
            *container.get::<PathBuf>(resources::LAYOUT_PATH).unwrap(),
            PathBuf::from("app/packages/main/layouts/default")
        );
        assert_eq!(
            *container.get::<PathBuf>(resources::ERROR_LAYOUT_PATH).unwrap(),
            PathBuf::from("app/packages/main/layouts/error")
        );
        let layout = container.get::<Mutex<Template>>(resources::LAYOUT).unwrap();
        assert_eq!(
            layout.lock().path(),
            Some(PathBuf::from("app/packages/main/layouts/default/layout.html").as_path())
        );
        assert!(layout.lock().helpers().unwrap().contains("url"));
    }

    #[test]
    fn test_layout_path_precedence() {
        let mut config = Config::default().with_packages(&["blog"]).with_package_config(
            "blog",
            PackageConfig::default().with_setting(
                "mvc",
                toml::Value::Table(toml::from_str("layout_path = \"themes/blog\"").unwrap()),
            ),
        );
        config.application.layout_path = Some(PathBuf::from("themes/app"));
        config.application.error_layout_path = Some(PathBuf::from("themes/errors"));

        let registry = registry(vec![Package::new("main"), Package::new("blog")], &config);

        let mut container = seeded(config.clone(), &registry);
        Bootstrap::new("blog", &registry).unwrap().bootstrap(&mut container).unwrap();
        assert_eq!(
            *container.get::<PathBuf>(resources::LAYOUT_PATH).unwrap(),
            PathBuf::from("themes/blog")
        );
        assert_eq!(
            *container.get::<PathBuf>(resources::ERROR_LAYOUT_PATH).unwrap(),
            PathBuf::from("themes/errors")
        );

        let mut container = seeded(config, &registry);
        Bootstrap::new("main", &registry).unwrap().bootstrap(&mut container).unwrap();
        assert_eq!(
            *container.get::<PathBuf>(resources::LAYOUT_PATH).unwrap(),
            PathBuf::from("themes/app")
        );
    }

    #[test]
    fn test_init_resources_see_defaults() {
        let config = Config::default();
        let main = Package::new("main").init_resource("Greeting", |container: &mut Container| {
            let package = container.get::<String>(resources::PACKAGE)?;
            Ok(format!("hello from {}", package))
        });
        let registry = registry(vec![main], &config);
        let mut container = seeded(config, &registry);

        Bootstrap::new("main", &registry).unwrap().bootstrap(&mut container).unwrap();
        assert_eq!(
            *container.get::<String>("Greeting").unwrap(),
            "hello from main"
        );
    }

    #[test]
    fn test_default_override() {
        let config = Config::default();
        let main = Package::new("main").default_resource(resources::LAYOUT, |_: &mut Container| {
            Ok(Mutex::new(Template::inline("custom {{> content }}")))
        });
        let registry = registry(vec![main], &config);
        let mut container = seeded(config, &registry);

        Bootstrap::new("main", &registry).unwrap().bootstrap(&mut container).unwrap();
        let layout = container.get::<Mutex<Template>>(resources::LAYOUT).unwrap();
        assert!(layout.lock().path().is_none());
    }

    #[test]
    fn test_helpers_merge_main_then_package() {
        let config = Config::default().with_packages(&["blog"]);
        let main = Package::new("main")
            .view_helper("brand", |_: &HelperArgs| -> Result<String> { Ok("main".into()) })
            .action_helper("paginate", |_: &HelperArgs| -> Result<String> { Ok("main".into()) });
        let blog = Package::new("blog")
            .view_helper("brand", |_: &HelperArgs| -> Result<String> { Ok("blog".into()) });
        let registry = registry(vec![main, blog], &config);
        let mut container = seeded(config, &registry);

        Bootstrap::new("blog", &registry).unwrap().bootstrap(&mut container).unwrap();
        let views = container.get::<ViewHelperBroker>(resources::VIEW_HELPER_BROKER).unwrap();
        assert_eq!(views.get("brand").unwrap().render(&HelperArgs::new()).unwrap(), "blog");
        assert!(views.contains("url"));
        let actions = container.get::<ActionHelperBroker>(resources::ACTION_HELPER_BROKER).unwrap();
        assert!(actions.contains("paginate"));
    }

    #[test]
    fn test_handlers_and_dependencies() {
        let config = Config::default()
            .with_packages(&["blog"])
            .with_package_config(
                "main",
                PackageConfig::default()
                    .with_dependency("Mailer", "transport", DependencyValue::reference("Smtp"))
                    .with_dependency("Repo", "db", DependencyValue::reference("Database_main")),
            )
            .with_package_config(
                "blog",
                PackageConfig::default()
                    .with_handler("Audit", &["PreDispatch", "PostDispatch"])
                    .with_dependency("Mailer", "transport", DependencyValue::reference("Sendmail")),
            );

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let blog = Package::new("blog").handler("Audit", move || {
            let counter = counter.clone();
            move |_: &Event| -> Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let registry = registry(vec![Package::new("main"), blog], &config);
        let mut container = seeded(config, &registry);

        Bootstrap::new("blog", &registry).unwrap().bootstrap(&mut container).unwrap();

        assert_eq!(
            *container.get::<Vec<String>>(resources::HANDLERS).unwrap(),
            vec!["Audit"]
        );
        let events = container.get::<EventSystem>(resources::EVENT_SYSTEM).unwrap();
        events.raise_event(&Event::new("PreDispatch")).unwrap();
        events.raise_event(&Event::new("PostDispatch")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let dependencies = container.get::<DependencyMap>(resources::DEPENDENCIES).unwrap();
        assert_eq!(
            dependencies.get("Mailer").unwrap().get("transport"),
            Some(&DependencyValue::reference("Sendmail"))
        );
        assert!(dependencies.contains_key("Repo"));
    }

    #[test]
    fn test_unregistered_handler() {
        let config = Config::default().with_package_config(
            "main",
            PackageConfig::default().with_handler("Ghost", &["PreDispatch"]),
        );
        let registry = registry(vec![Package::new("main")], &config);
        let mut container = seeded(config, &registry);
        let err = Bootstrap::new("main", &registry)
            .unwrap()
            .bootstrap(&mut container)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_minimal_bootstrap_sets_role() {
        let config = Config::default();
        let main = Package::new("main").role(|container: &mut Container| {
            let current = container.get::<String>(resources::ROLE)?;
            Ok(format!("{}+member", current))
        });
        let registry = registry(vec![main], &config);
        let mut container = seeded(config, &registry);

        let bootstrap = Bootstrap::new("main", &registry).unwrap();
        bootstrap.minimal_bootstrap(&mut container).unwrap();
        assert_eq!(*container.get::<String>(resources::ROLE).unwrap(), "guest+member");
        assert!(!container.has_resource(resources::LAYOUT));
    }

    #[test]
    fn test_unknown_package() {
        let registry = PackageRegistry::new(Vec::new(), &[]);
        assert_eq!(
            Bootstrap::new("ghost", &registry).unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }
}
