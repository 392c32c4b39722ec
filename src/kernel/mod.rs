//!
//! The request kernel: routing, the page cache, the dependency container,
//! package bootstrapping and the front controller that ties them together.
//!

mod application;
mod bootstrap;
mod cache;
mod container;
mod database;
mod front_controller;
mod router;

pub use application::{Application, ApplicationBuilder};
pub use bootstrap::Bootstrap;
pub use cache::PageCache;
pub use container::{
    Component, ComponentFactory, ComponentRegistry, Container, ControllerTarget, Injectable,
    Resolved,
};
pub use database::DatabaseAdapter;
pub use front_controller::{
    EXCEPTION_HANDLER_ACTION, FORBIDDEN_ACTION, FrontController, PAGE_NOT_FOUND_ACTION,
};
pub use router::{CachePolicy, Route, RouteMatch, Router};

use std::{any::Any, sync::Arc};

/// A value held by the container.
pub type Resource = Arc<dyn Any + Send + Sync>;

///
/// Names of the resources the framework itself puts in the container.
///
/// The type each one holds is noted alongside; fetch them with
/// [`Container::get`].
///
pub mod resources {
    /// `Vec<String>`: active packages, `main` first.
    pub const PACKAGES: &str = "Packages";
    /// `AppStage`
    pub const APP_STAGE: &str = "AppStage";
    /// `Config`: the whole application configuration.
    pub const APPLICATION_CONFIG: &str = "ApplicationConfig";
    /// `Mutex<Request>`
    pub const REQUEST: &str = "Request";
    /// `Session`
    pub const SESSION: &str = "Session";
    /// `String`
    pub const ROLE: &str = "Role";
    /// `PageCache`
    pub const CACHE: &str = "Cache";
    /// `Router`
    pub const ROUTER: &str = "Router";
    /// `OutputBuffer`
    pub const OUTPUT: &str = "Output";
    /// `Mutex<Response>`
    pub const RESPONSE: &str = "Response";
    /// `String`: the package being dispatched.
    pub const PACKAGE: &str = "Package";
    /// `PackageSettings` of the dispatched package.
    pub const CONFIG: &str = "Config";
    /// `PathBuf`
    pub const PACKAGE_PATH: &str = "PackagePath";
    /// `ViewHelperBroker`
    pub const VIEW_HELPER_BROKER: &str = "ViewHelperBroker";
    /// `ActionHelperBroker`
    pub const ACTION_HELPER_BROKER: &str = "ActionHelperBroker";
    /// `PathBuf`
    pub const LAYOUT_PATH: &str = "LayoutPath";
    /// `PathBuf`
    pub const ERROR_LAYOUT_PATH: &str = "ErrorLayoutPath";
    /// `Mutex<Template>`
    pub const LAYOUT: &str = "Layout";
    /// `Mutex<Template>`
    pub const ERROR_LAYOUT: &str = "ErrorLayout";
    /// `EventSystem`
    pub const EVENT_SYSTEM: &str = "EventSystem";
    /// `Vec<String>`: names of the explicit handlers added to the event system.
    pub const HANDLERS: &str = "Handlers";
    /// `DependencyMap` merged over the active packages.
    pub const DEPENDENCIES: &str = "Dependencies";
    /// `HashMap<String, DatabaseConfig>`, filled on first database lookup.
    pub const DATABASES: &str = "Databases";
}
