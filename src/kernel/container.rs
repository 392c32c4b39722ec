//!
//! The dependency container.
//!
//! A per-request map from resource name to value, filled by the application
//! (request, session, router, cache), by [`Bootstrap`](super::Bootstrap) and
//! by the front controller. On top of the map sits a resolver that builds
//! component graphs from the `dependencies` declarations of the active
//! packages:
//!
//! ```toml
//! [packages.main.dependencies.PostController]
//! posts = "PostRepository"
//!
//! [packages.main.dependencies.PostRepository]
//! db = "Database_blog"
//! page_size = { value = 20 }
//! ```
//!
//! Resolution order for a name is fixed: an existing resource, then the
//! `Database_<id>[_<orm>]` family, then a component with declared
//! dependencies, then a bare component. Anything else is a
//! resource-not-found error.
//!

use {
    super::{Resource, database, resources},
    crate::{
        Error, Result,
        config::{AppStage, Config, DependencyMap, DependencyValue, PackageSettings},
        events::EventSystem,
        http::{Request, Response, Session},
        kernel::{PageCache, Router},
        mvc::{ActionHelperBroker, ControllerContext, OutputBuffer, Template},
        utils::lcfirst,
    },
    parking_lot::Mutex,
    std::{
        any::Any,
        collections::{BTreeMap, HashMap},
        fmt,
        sync::Arc,
    },
};

///
/// Something the container can inject dependencies into.
///
/// `inject` is called once per declared dependency with the resolved value.
/// Implementations downcast the value to the type they expect:
///
/// ```
/// use axum_mvc::{Error, Result};
/// use axum_mvc::kernel::{Injectable, Resource};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Greeter { greeting: Option<Arc<toml::Value>> }
///
/// impl Injectable for Greeter {
///     fn component_name(&self) -> &str { "Greeter" }
///
///     fn inject(&mut self, dependency: &str, value: Resource) -> Result<()> {
///         match dependency {
///             "greeting" => self.greeting = value.downcast().ok(),
///             _ => return Err(Error::config(format!("Greeter has no dependency {dependency}"))),
///         }
///         Ok(())
///     }
/// }
/// ```
///
pub trait Injectable: Any + Send + Sync {
    /// Name under which dependencies are declared for this component.
    fn component_name(&self) -> &str;

    fn inject(&mut self, dependency: &str, value: Resource) -> Result<()> {
        let _ = value;
        Err(Error::config(format!(
            "{} does not accept the dependency {}",
            self.component_name(),
            dependency
        )))
    }

    ///
    /// Whether [`Container::resolve_instance`] already wired this instance.
    ///
    /// The flag lives on the instance. Components resolved more than once
    /// per request keep a `bool` field and implement this together with
    /// [`mark_injected`](Self::mark_injected); the defaults re-inject on
    /// every call.
    ///
    fn is_injected(&self) -> bool {
        false
    }

    /// Called once every declared dependency of the instance was injected.
    fn mark_injected(&mut self) {}
}

/// An injectable that can be stored in the container once built.
pub trait Component: Injectable {
    fn into_resource(self: Box<Self>) -> Resource;
}

impl<T: Injectable> Component for T {
    fn into_resource(self: Box<Self>) -> Resource {
        Arc::from(self as Box<dyn Any + Send + Sync>)
    }
}

/// Builds a fresh, not yet injected component.
pub type ComponentFactory = Arc<dyn Fn() -> Box<dyn Component> + Send + Sync>;

///
/// Component factories of all registered packages, by component name.
///
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ComponentFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Adds every factory of `other`, replacing those with the same name.
    pub fn extend(&mut self, other: &ComponentRegistry) {
        for (name, factory) in &other.factories {
            self.factories.insert(name.clone(), factory.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&ComponentFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Outcome of injecting into an existing instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Dependencies were injected into the instance.
    InPlace,
    /// The instance had already been injected during this request.
    AlreadyInjected,
}

///
/// What the front controller asks [`Container::resolve_controller`] to wire.
///
#[derive(Debug, Clone)]
pub struct ControllerTarget<'a> {
    pub package: &'a str,
    pub namespace: &'a str,
    /// Controller name as routed, e.g. `user` or `Error`.
    pub controller: &'a str,
    pub action: &'a str,
    /// Sub-directory of `views/scripts` for nested namespaces, may be empty.
    pub view_path: &'a str,
    pub params: BTreeMap<String, String>,
    /// The error controller gets a private copy of the error layout and
    /// leaves the request untouched.
    pub error: bool,
}

pub struct Container {
    resources: HashMap<String, Resource>,
    components: Arc<ComponentRegistry>,
    resolving: Vec<String>,
}

impl Container {
    pub fn new(components: Arc<ComponentRegistry>) -> Self {
        Self {
            resources: HashMap::new(),
            components,
            resolving: Vec::new(),
        }
    }

    /// Stores `value` under `name`, replacing any previous value.
    pub fn add_resource<T: Any + Send + Sync>(&mut self, name: &str, value: Arc<T>) {
        self.resources.insert(name.to_string(), value);
    }

    pub fn add_shared(&mut self, name: &str, value: Resource) {
        self.resources.insert(name.to_string(), value);
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn resource(&self, name: &str) -> Result<Resource> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::resource_not_found(name))
    }

    ///
    /// Returns the resource `name` as a `T`. A missing resource and a
    /// resource of another type are both errors.
    ///
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.resource(name)?.downcast::<T>().map_err(|_| {
            Error::config(format!(
                "Resource {} is not a {}",
                name,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    fn declarations(&self, name: &str) -> Option<Vec<(String, DependencyValue)>> {
        let dependencies = self.get::<DependencyMap>(resources::DEPENDENCIES).ok()?;
        dependencies.get(name).map(|declared| {
            declared
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect()
        })
    }

    fn resolve_value(&mut self, value: &DependencyValue) -> Result<Resource> {
        match value {
            DependencyValue::Reference(name) => self.resolve(name),
            DependencyValue::Literal { value } => Ok(Arc::new(value.clone())),
        }
    }

    ///
    /// Resolves a name to a resource, building and caching it when needed.
    /// A name is built at most once per container.
    ///
    pub fn resolve(&mut self, name: &str) -> Result<Resource> {
        if let Some(resource) = self.resources.get(name) {
            return Ok(resource.clone());
        }

        if database::is_database_resource(name) {
            let resource = database::resolve(self, name)?;
            self.add_shared(name, resource.clone());
            return Ok(resource);
        }

        if self.resolving.iter().any(|r| r == name) {
            let mut chain = self.resolving.clone();
            chain.push(name.to_string());
            return Err(Error::config(format!(
                "Circular dependency: {}",
                chain.join(" -> ")
            )));
        }

        let declarations = self.declarations(name);
        let factory = self.components.get(name).cloned();

        let component = match (declarations, factory) {
            (Some(declarations), Some(factory)) => {
                self.resolving.push(name.to_string());
                let built = self.build(name, factory, &declarations);
                self.resolving.pop();
                built?
            }
            (Some(_), None) => {
                return Err(Error::config(format!(
                    "{} has declared dependencies but no component is registered under that name",
                    name
                )));
            }
            (None, Some(factory)) => factory().into_resource(),
            (None, None) => return Err(Error::resource_not_found(name)),
        };

        tracing::debug!(component = %name, "Component resolved");
        self.add_shared(name, component.clone());
        Ok(component)
    }

    fn build(
        &mut self,
        name: &str,
        factory: ComponentFactory,
        declarations: &[(String, DependencyValue)],
    ) -> Result<Resource> {
        let mut component = factory();
        for (dependency, value) in declarations {
            let resolved = self.resolve_value(value)?;
            component.inject(dependency, resolved).map_err(|e| {
                tracing::debug!(component = %name, dependency = %dependency, "Injection failed");
                e
            })?;
        }
        Ok(component.into_resource())
    }

    ///
    /// Injects the declared dependencies of an existing instance.
    ///
    /// An instance reporting [`Injectable::is_injected`] is left alone and
    /// [`Resolved::AlreadyInjected`] is returned.
    ///
    pub fn resolve_instance<T: Injectable + ?Sized>(&mut self, target: &mut T) -> Result<Resolved> {
        if target.is_injected() {
            return Ok(Resolved::AlreadyInjected);
        }

        let name = target.component_name().to_string();
        if let Some(declarations) = self.declarations(&name) {
            self.resolving.push(name.clone());
            let injected = declarations.iter().try_for_each(|(dependency, value)| {
                let resolved = self.resolve_value(value)?;
                target.inject(dependency, resolved)
            });
            self.resolving.pop();
            injected?;
        }

        target.mark_injected();
        tracing::debug!(component = %name, "Instance injected");
        Ok(Resolved::InPlace)
    }

    ///
    /// Wires a controller. Framework resources are gathered in a fixed order
    /// (the view is attached to the layout as its `content` partial, so the
    /// layout comes first), the request is updated with the routing result
    /// for regular controllers, and finally the controller's own declared
    /// dependencies are injected.
    ///
    pub fn resolve_controller<T: Injectable + ?Sized>(
        &mut self,
        target: ControllerTarget<'_>,
        controller: &mut T,
    ) -> Result<ControllerContext> {
        let stage = *self.get::<AppStage>(resources::APP_STAGE)?;
        let events = self.get::<EventSystem>(resources::EVENT_SYSTEM)?;
        let router = self.get::<Router>(resources::ROUTER)?;
        let cache = self.get::<PageCache>(resources::CACHE)?;

        let layout = if target.error {
            let shared = self.get::<Mutex<Template>>(resources::ERROR_LAYOUT)?;
            let copy = shared.lock().clone();
            Arc::new(Mutex::new(copy))
        } else {
            self.get::<Mutex<Template>>(resources::LAYOUT)?
        };

        let action_helpers = self.get::<ActionHelperBroker>(resources::ACTION_HELPER_BROKER)?;
        let config = self.get::<PackageSettings>(resources::CONFIG)?;

        let application = self.get::<Config>(resources::APPLICATION_CONFIG)?;
        let mut views_dir = application
            .application
            .root
            .join("packages")
            .join(target.package)
            .join("views")
            .join("scripts");
        if !target.view_path.is_empty() {
            views_dir.push(target.view_path);
        }
        views_dir.push(lcfirst(target.controller));

        let view = Arc::new(Mutex::new(Template::file(
            views_dir.join(format!("{}.html", target.action)),
        )));
        layout.lock().add_partial("content", view.clone());

        let request = if target.error {
            None
        } else {
            let request = self.get::<Mutex<Request>>(resources::REQUEST)?;
            {
                let mut request = request.lock();
                request.set_controller(lcfirst(target.controller));
                request.set_action(target.action);
                request.set_params(target.params.clone());
            }
            Some(request)
        };

        let session = self.get::<Session>(resources::SESSION)?;
        let response = self.get::<Mutex<Response>>(resources::RESPONSE)?;
        let output = self.get::<OutputBuffer>(resources::OUTPUT)?;

        self.resolve_instance(controller)?;

        Ok(ControllerContext {
            package: target.package.to_string(),
            namespace: target.namespace.to_string(),
            controller: target.controller.to_string(),
            action: target.action.to_string(),
            params: target.params,
            stage,
            events,
            router,
            cache,
            layout,
            view,
            views_dir,
            action_helpers,
            config,
            request,
            session,
            response,
            output: (*output).clone(),
        })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.resources.keys().collect();
        names.sort();
        f.debug_struct("Container")
            .field("resources", &names)
            .field("components", &self.components)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ErrorKind,
        config::{OrderedMap, PackageConfig},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Mailer {
        transport: Option<Arc<Transport>>,
        sender: Option<String>,
        injections: Arc<AtomicUsize>,
        wired: bool,
    }

    impl Injectable for Mailer {
        fn component_name(&self) -> &str {
            "Mailer"
        }

        fn inject(&mut self, dependency: &str, value: Resource) -> Result<()> {
            self.injections.fetch_add(1, Ordering::SeqCst);
            match dependency {
                "transport" => self.transport = value.downcast().ok(),
                "sender" => {
                    self.sender = value
                        .downcast::<toml::Value>()
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                }
                other => return Err(Error::config(format!("Mailer has no {other}"))),
            }
            Ok(())
        }

        fn is_injected(&self) -> bool {
            self.wired
        }

        fn mark_injected(&mut self) {
            self.wired = true;
        }
    }

    #[derive(Default)]
    struct Transport;

    impl Injectable for Transport {
        fn component_name(&self) -> &str {
            "Transport"
        }
    }

    struct Node(&'static str);

    impl Injectable for Node {
        fn component_name(&self) -> &str {
            self.0
        }

        fn inject(&mut self, _dependency: &str, _value: Resource) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> Arc<ComponentRegistry> {
        let mut registry = ComponentRegistry::new();
        registry.register("Mailer", Arc::new(|| Box::new(Mailer::default()) as Box<dyn Component>));
        registry.register("Transport", Arc::new(|| Box::new(Transport) as Box<dyn Component>));
        registry.register("A", Arc::new(|| Box::new(Node("A")) as Box<dyn Component>));
        registry.register("B", Arc::new(|| Box::new(Node("B")) as Box<dyn Component>));
        Arc::new(registry)
    }

    fn container_with(dependencies: PackageConfig) -> Container {
        let mut container = Container::new(registry());
        container.add_resource(resources::DEPENDENCIES, Arc::new(dependencies.dependencies));
        container
    }

    #[test]
    fn test_missing_resource_is_an_error() {
        let container = Container::new(Arc::new(ComponentRegistry::new()));
        let err = container.resource("Nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
        assert_eq!(err.to_string(), "Resource Nope does not exist in the container");
    }

    #[test]
    fn test_get_checks_the_type() {
        let mut container = Container::new(Arc::new(ComponentRegistry::new()));
        container.add_resource(resources::ROLE, Arc::new("guest".to_string()));
        assert_eq!(*container.get::<String>(resources::ROLE).unwrap(), "guest");
        assert_eq!(
            container.get::<u32>(resources::ROLE).unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_resources_are_overwritten() {
        let mut container = Container::new(Arc::new(ComponentRegistry::new()));
        container.add_resource(resources::ROLE, Arc::new("guest".to_string()));
        container.add_resource(resources::ROLE, Arc::new("admin".to_string()));
        assert_eq!(*container.get::<String>(resources::ROLE).unwrap(), "admin");
    }

    #[test]
    fn test_resolve_declared_component() {
        let mut container = container_with(
            PackageConfig::default()
                .with_dependency("Mailer", "transport", DependencyValue::reference("Transport"))
                .with_dependency("Mailer", "sender", DependencyValue::literal("noreply@example.org")),
        );

        let mailer = container.resolve("Mailer").unwrap().downcast::<Mailer>().unwrap();
        assert!(mailer.transport.is_some());
        assert_eq!(mailer.sender.as_deref(), Some("noreply@example.org"));
        assert!(container.has_resource("Transport"));

        let again = container.resolve("Mailer").unwrap().downcast::<Mailer>().unwrap();
        assert!(Arc::ptr_eq(&mailer, &again));
    }

    #[test]
    fn test_existing_resource_wins() {
        let mut container = container_with(PackageConfig::default());
        container.add_resource("Transport", Arc::new(42u32));
        let resolved = container.resolve("Transport").unwrap();
        assert_eq!(*resolved.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_unknown_name() {
        let mut container = container_with(PackageConfig::default());
        assert_eq!(
            container.resolve("Unknown").unwrap_err().kind(),
            ErrorKind::ResourceNotFound
        );
    }

    #[test]
    fn test_declared_without_component() {
        let mut container = container_with(
            PackageConfig::default().with_dependency("Ghost", "x", DependencyValue::literal(1)),
        );
        assert_eq!(
            container.resolve("Ghost").unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_cycles_are_reported() {
        let mut container = container_with(
            PackageConfig::default()
                .with_dependency("A", "b", DependencyValue::reference("B"))
                .with_dependency("B", "a", DependencyValue::reference("A")),
        );
        let err = container.resolve("A").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("A -> B -> A"));
    }

    #[test]
    fn test_instance_injected_once() {
        let mut container = container_with(
            PackageConfig::default()
                .with_dependency("Mailer", "transport", DependencyValue::reference("Transport")),
        );

        let mut mailer = Mailer::default();
        assert_eq!(container.resolve_instance(&mut mailer).unwrap(), Resolved::InPlace);
        assert_eq!(
            container.resolve_instance(&mut mailer).unwrap(),
            Resolved::AlreadyInjected
        );
        assert_eq!(mailer.injections.load(Ordering::SeqCst), 1);
        assert!(mailer.transport.is_some());

        let mut other = Mailer::default();
        assert_eq!(container.resolve_instance(&mut other).unwrap(), Resolved::InPlace);
        assert_eq!(other.injections.load(Ordering::SeqCst), 1);
    }

    fn wire_fresh_mailer(container: &mut Container) -> (Resolved, bool) {
        let mut mailer = Mailer::default();
        let resolved = container.resolve_instance(&mut mailer).unwrap();
        (resolved, mailer.transport.is_some())
    }

    #[test]
    fn test_fresh_instances_in_the_same_slot_are_both_injected() {
        let mut container = container_with(
            PackageConfig::default()
                .with_dependency("Mailer", "transport", DependencyValue::reference("Transport")),
        );
        assert_eq!(wire_fresh_mailer(&mut container), (Resolved::InPlace, true));
        assert_eq!(wire_fresh_mailer(&mut container), (Resolved::InPlace, true));
    }

    #[test]
    fn test_instance_without_declarations() {
        let mut container = container_with(PackageConfig::default());
        let mut transport = Transport;
        assert_eq!(
            container.resolve_instance(&mut transport).unwrap(),
            Resolved::InPlace
        );
    }

    #[test]
    fn test_rejected_dependency() {
        let mut container = container_with(
            PackageConfig::default()
                .with_dependency("Transport", "speed", DependencyValue::literal(3)),
        );
        let err = container.resolve("Transport").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("does not accept the dependency speed"));
    }

    fn controller_container() -> Container {
        let config = Config::from_toml("").unwrap();
        let mut container = container_with(PackageConfig::default());
        container.add_resource(resources::APP_STAGE, Arc::new(AppStage::Test));
        container.add_resource(resources::EVENT_SYSTEM, Arc::new(EventSystem::new("main")));
        container.add_resource(resources::ROUTER, Arc::new(Router::from_config(&config).unwrap()));
        container.add_resource(resources::CACHE, Arc::new(PageCache::new("cache")));
        container.add_resource(
            resources::LAYOUT,
            Arc::new(Mutex::new(Template::inline("<main>{{> content }}</main>"))),
        );
        container.add_resource(
            resources::ERROR_LAYOUT,
            Arc::new(Mutex::new(Template::inline("<failure>{{> content }}</failure>"))),
        );
        container.add_resource(
            resources::ACTION_HELPER_BROKER,
            Arc::new(ActionHelperBroker::new("main")),
        );
        container.add_resource(resources::CONFIG, Arc::new(PackageSettings::default()));
        container.add_resource(
            resources::REQUEST,
            Arc::new(Mutex::new(Request::new(axum::http::Method::GET, "/users/7").unwrap())),
        );
        container.add_resource(
            resources::SESSION,
            Arc::new(Session::new()),
        );
        container.add_resource(resources::RESPONSE, Arc::new(Mutex::new(Response::default())));
        container.add_resource(resources::OUTPUT, Arc::new(OutputBuffer::new()));
        container.add_resource(resources::APPLICATION_CONFIG, Arc::new(config));
        container
    }

    fn target(
        controller: &'static str,
        action: &'static str,
        error: bool,
    ) -> ControllerTarget<'static> {
        ControllerTarget {
            package: "main",
            namespace: "controllers",
            controller,
            action,
            view_path: "",
            params: BTreeMap::from([("id".to_string(), "7".to_string())]),
            error,
        }
    }

    #[test]
    fn test_resolve_controller_wires_view_into_layout() {
        let mut container = controller_container();
        let ctx = container
            .resolve_controller(target("User", "show", false), &mut Transport)
            .unwrap();

        assert_eq!(
            ctx.view().lock().path().unwrap(),
            std::path::Path::new("application/packages/main/views/scripts/user/show.html")
        );
        let layout = container.get::<Mutex<Template>>(resources::LAYOUT).unwrap();
        assert!(Arc::ptr_eq(ctx.layout(), &layout));
        let content = layout.lock().partial("content").unwrap();
        assert!(Arc::ptr_eq(&content, ctx.view()));

        let request = container.get::<Mutex<Request>>(resources::REQUEST).unwrap();
        let request = request.lock();
        assert_eq!(request.controller(), "user");
        assert_eq!(request.action(), "show");
        assert_eq!(request.params().get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_error_controller_gets_a_private_layout() {
        let mut container = controller_container();
        let ctx = container
            .resolve_controller(target("Error", "exceptionHandler", true), &mut Transport)
            .unwrap();

        assert!(ctx.request().is_none());
        assert!(ctx.layout().lock().partial("content").is_some());

        let shared = container.get::<Mutex<Template>>(resources::ERROR_LAYOUT).unwrap();
        assert!(!Arc::ptr_eq(ctx.layout(), &shared));
        assert!(shared.lock().partial("content").is_none());

        let request = container.get::<Mutex<Request>>(resources::REQUEST).unwrap();
        assert_eq!(request.lock().action(), "");
    }

    #[test]
    fn test_resolve_controller_needs_framework_resources() {
        let mut container = container_with(PackageConfig::default());
        let err = container
            .resolve_controller(target("User", "show", false), &mut Transport)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    }

    #[test]
    fn test_dependencies_default_to_empty() {
        let mut container = Container::new(registry());
        let empty: DependencyMap = OrderedMap::new();
        container.add_resource(resources::DEPENDENCIES, Arc::new(empty));
        assert!(container.resolve("Transport").is_ok());
    }
}
