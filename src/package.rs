//!
//! The code half of a package.
//!
//! Routes, dependency declarations, handler subscriptions and settings of a
//! package come from `[packages.<name>]` in the configuration. The code
//! those declarations point at (controllers, components, event handlers,
//! helpers, resource factories) is registered here, once, at startup:
//!
//! ```
//! use axum_mvc::{Result, package::Package};
//! use axum_mvc::kernel::Injectable;
//! use axum_mvc::mvc::{ActionResult, Controller, ControllerContext};
//!
//! #[derive(Default)]
//! struct IndexController;
//!
//! impl Injectable for IndexController {
//!     fn component_name(&self) -> &str { "IndexController" }
//! }
//!
//! impl Controller for IndexController {
//!     fn dispatch(&mut self, _action: &str, ctx: &mut ControllerContext) -> Result<ActionResult> {
//!         ctx.render()?;
//!         Ok(ActionResult::Buffered)
//!     }
//! }
//!
//! let blog = Package::new("blog")
//!     .controller("index", IndexController::default)
//!     .init_resource("Motd", |_| Ok(String::from("Hello")));
//!
//! assert!(blog.has_controller("controllers", "index"));
//! assert!(!blog.has_controller("controllers/admin", "index"));
//! ```
//!

use {
    crate::{
        Result,
        events::{ConventionHandlers, EventHandler, HandlerFactory},
        kernel::{Component, ComponentRegistry, Container, Injectable, Resource},
        mvc::{
            ActionHelper, ActionHelperBroker, Controller, ErrorController, ViewHelper,
            ViewHelperBroker,
        },
        utils::ucfirst,
    },
    std::{any::Any, collections::HashMap, fmt, sync::Arc},
};

/// Controllers are registered under this namespace unless told otherwise.
pub const DEFAULT_NAMESPACE: &str = "controllers";

pub type ControllerFactory = Arc<dyn Fn() -> Box<dyn Controller> + Send + Sync>;
pub type ErrorControllerFactory = Arc<dyn Fn() -> Box<dyn ErrorController> + Send + Sync>;

/// Produces a resource from what the container already holds.
pub type ResourceFactory = Arc<dyn Fn(&mut Container) -> Result<Resource> + Send + Sync>;

/// Decides the ACL role of the current request.
pub type RoleResolver = Arc<dyn Fn(&mut Container) -> Result<String> + Send + Sync>;

fn controller_key(namespace: &str, controller: &str) -> String {
    format!("{}::{}", namespace.trim_matches('/'), ucfirst(controller))
}

fn resource_factory<F, T>(factory: F) -> ResourceFactory
where
    F: Fn(&mut Container) -> Result<T> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    Arc::new(move |container: &mut Container| -> Result<Resource> {
        Ok(Arc::new(factory(container)?))
    })
}

pub struct Package {
    name: String,
    controllers: HashMap<String, ControllerFactory>,
    error_controller: Option<ErrorControllerFactory>,
    components: ComponentRegistry,
    handlers: HashMap<String, HandlerFactory>,
    conventions: Arc<ConventionHandlers>,
    defaults: HashMap<String, ResourceFactory>,
    init_resources: Vec<(String, ResourceFactory)>,
    role: Option<RoleResolver>,
    view_helpers: ViewHelperBroker,
    action_helpers: ActionHelperBroker,
}

impl Package {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            controllers: HashMap::new(),
            error_controller: None,
            components: ComponentRegistry::new(),
            handlers: HashMap::new(),
            conventions: Arc::new(ConventionHandlers::new()),
            defaults: HashMap::new(),
            init_resources: Vec::new(),
            role: None,
            view_helpers: ViewHelperBroker::new(name),
            action_helpers: ActionHelperBroker::new(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a controller in the `controllers` namespace.
    pub fn controller<F, C>(self, name: &str, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Controller,
    {
        self.controller_in(DEFAULT_NAMESPACE, name, factory)
    }

    pub fn controller_in<F, C>(mut self, namespace: &str, name: &str, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Controller,
    {
        self.controllers.insert(
            controller_key(namespace, name),
            Arc::new(move || Box::new(factory()) as Box<dyn Controller>),
        );
        self
    }

    pub fn error_controller<F, C>(mut self, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: ErrorController,
    {
        self.error_controller = Some(Arc::new(move || {
            Box::new(factory()) as Box<dyn ErrorController>
        }));
        self
    }

    /// Registers a component the container may build by name.
    pub fn component<F, C>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Injectable,
    {
        self.components.register(
            name,
            Arc::new(move || Box::new(factory()) as Box<dyn Component>),
        );
        self
    }

    /// Registers an event handler named in the package's `handlers` section.
    pub fn handler<F, H>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: EventHandler + 'static,
    {
        self.handlers.insert(
            name.to_string(),
            Arc::new(move || Box::new(factory()) as Box<dyn EventHandler>),
        );
        self
    }

    /// Registers the handler that runs whenever `event` is raised.
    pub fn convention_handler<F, H>(mut self, event: &str, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: EventHandler + 'static,
    {
        Arc::make_mut(&mut self.conventions).register(event, factory);
        self
    }

    ///
    /// Replaces the framework's factory for one of the default resources
    /// (`Layout`, `EventSystem`, ...). The value must have the type the
    /// framework stores under that name.
    ///
    pub fn default_resource<F, T>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&mut Container) -> Result<T> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.defaults.insert(name.to_string(), resource_factory(factory));
        self
    }

    /// Adds a resource built after every default resource, in registration order.
    pub fn init_resource<F, T>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&mut Container) -> Result<T> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.init_resources
            .push((name.to_string(), resource_factory(factory)));
        self
    }

    pub fn role<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&mut Container) -> Result<String> + Send + Sync + 'static,
    {
        self.role = Some(Arc::new(resolver));
        self
    }

    pub fn view_helper<H: ViewHelper + 'static>(mut self, name: &str, helper: H) -> Self {
        self.view_helpers.register(name, Arc::new(helper));
        self
    }

    pub fn action_helper<H: ActionHelper + 'static>(mut self, name: &str, helper: H) -> Self {
        self.action_helpers.register(name, Arc::new(helper));
        self
    }

    pub fn has_controller(&self, namespace: &str, name: &str) -> bool {
        self.controllers.contains_key(&controller_key(namespace, name))
    }

    pub fn build_controller(&self, namespace: &str, name: &str) -> Option<Box<dyn Controller>> {
        self.controllers
            .get(&controller_key(namespace, name))
            .map(|factory| factory())
    }

    pub fn has_error_controller(&self) -> bool {
        self.error_controller.is_some()
    }

    pub fn build_error_controller(&self) -> Option<Box<dyn ErrorController>> {
        self.error_controller.as_ref().map(|factory| factory())
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn handler_factory(&self, name: &str) -> Option<&HandlerFactory> {
        self.handlers.get(name)
    }

    pub fn conventions(&self) -> &Arc<ConventionHandlers> {
        &self.conventions
    }

    pub fn default_override(&self, name: &str) -> Option<&ResourceFactory> {
        self.defaults.get(name)
    }

    pub fn init_resources(&self) -> &[(String, ResourceFactory)] {
        &self.init_resources
    }

    pub fn role_resolver(&self) -> Option<&RoleResolver> {
        self.role.as_ref()
    }

    pub fn view_helpers(&self) -> &ViewHelperBroker {
        &self.view_helpers
    }

    pub fn action_helpers(&self) -> &ActionHelperBroker {
        &self.action_helpers
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut controllers: Vec<_> = self.controllers.keys().collect();
        controllers.sort();
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("controllers", &controllers)
            .field("error_controller", &self.error_controller.is_some())
            .field("components", &self.components)
            .field("conventions", &self.conventions)
            .finish_non_exhaustive()
    }
}

///
/// All registered packages, plus the components of the active ones merged
/// into a single registry (a later package wins on a name clash).
///
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: HashMap<String, Package>,
    components: Arc<ComponentRegistry>,
}

impl PackageRegistry {
    pub fn new(packages: impl IntoIterator<Item = Package>, active: &[String]) -> Self {
        let packages: HashMap<String, Package> = packages
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        let mut components = ComponentRegistry::new();
        for package in active.iter().filter_map(|name| packages.get(name)) {
            components.extend(&package.components);
        }

        Self {
            packages,
            components: Arc::new(components),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.packages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Error,
        kernel::Resource,
        mvc::{ActionResult, ControllerContext},
    };

    struct Named(&'static str);

    impl Injectable for Named {
        fn component_name(&self) -> &str {
            self.0
        }
    }

    impl Controller for Named {
        fn dispatch(&mut self, action: &str, _ctx: &mut ControllerContext) -> Result<ActionResult> {
            Err(Error::action_not_found(self.0, action))
        }
    }

    #[test]
    fn test_controller_keys() {
        let package = Package::new("main")
            .controller("userProfile", || Named("UserProfileController"))
            .controller_in("controllers/admin/", "Report", || Named("ReportController"));

        assert!(package.has_controller("controllers", "userProfile"));
        assert!(package.has_controller("controllers", "UserProfile"));
        assert!(package.has_controller("controllers/admin", "report"));
        assert!(!package.has_controller("controllers", "report"));

        let built = package.build_controller("controllers/admin", "report").unwrap();
        assert_eq!(built.component_name(), "ReportController");
        assert!(package.build_error_controller().is_none());
    }

    #[test]
    fn test_active_components_merge_in_order() {
        let main = Package::new("main")
            .component("Mailer", || Named("main mailer"))
            .component("Only", || Named("only"));
        let blog = Package::new("blog").component("Mailer", || Named("blog mailer"));
        let shop = Package::new("shop").component("Cart", || Named("cart"));

        let registry = PackageRegistry::new(
            [main, blog, shop],
            &["main".to_string(), "blog".to_string()],
        );

        let components = registry.components();
        assert_eq!(components.len(), 2);
        let mailer: Resource = components.get("Mailer").unwrap()().into_resource();
        assert_eq!(mailer.downcast::<Named>().unwrap().0, "blog mailer");
        assert!(!components.contains("Cart"));
        assert!(registry.contains("shop"));
        assert_eq!(registry.names(), vec!["blog", "main", "shop"]);
    }
}
