//! # axum-mvc
//!
//! A small MVC framework on top of Axum. Routes, access rules, page caching
//! and dependency wiring are declared in TOML per package; controllers,
//! components and event handlers are registered in code.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum_mvc::{Application, Config, Error, Result};
//! use axum_mvc::kernel::Injectable;
//! use axum_mvc::mvc::{ActionResult, Controller, ControllerContext, ErrorController};
//! use axum_mvc::package::Package;
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
//!         ctx.assign("title", "Hello");
//!         ctx.render()?;
//!         Ok(ActionResult::Buffered)
//!     }
//! }
//!
//! #[derive(Default)]
//! struct ErrorPages;
//!
//! impl Injectable for ErrorPages {
//!     fn component_name(&self) -> &str { "ErrorController" }
//! }
//!
//! impl ErrorController for ErrorPages {
//!     fn page_not_found(&mut self, ctx: &mut ControllerContext) -> Result<ActionResult> {
//!         ctx.render()?;
//!         Ok(ActionResult::Buffered)
//!     }
//!
//!     fn forbidden(&mut self, ctx: &mut ControllerContext) -> Result<ActionResult> {
//!         ctx.render()?;
//!         Ok(ActionResult::Buffered)
//!     }
//!
//!     fn exception_handler(&mut self, error: &Error, ctx: &mut ControllerContext) -> Result<ActionResult> {
//!         ctx.assign("message", error);
//!         ctx.render()?;
//!         Ok(ActionResult::Buffered)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::default();  // Loads from config/{RUST_ENV}.toml
//!     config.setup_tracing();
//!
//!     let main = Package::new("main")
//!         .controller("index", IndexController::default)
//!         .error_controller(ErrorPages::default);
//!
//!     Application::builder(config).package(main).build()?.start().await
//! }
//! ```
//!
//! With `config/dev.toml`:
//! ```toml
//! [application]
//! root = "application"
//! packages = ["blog"]
//!
//! [packages.main.routes.home]
//! path = "/"
//! controller = "index"
//! action = "index"
//!
//! [packages.main.routes.home.cache]
//! expires = 60
//! ```
//!
//! Views live under `application/packages/<package>/views/scripts/<controller>/<action>.html`,
//! layouts under `application/packages/main/layouts/default/layout.html`.
//!
//! # Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Configuration loading and validation ([`Config`]) |
//! | [`kernel`] | Router, page cache, container, bootstrap, front controller |
//! | [`mvc`] | Controllers, templates, helpers, the output buffer |
//! | [`http`] | Request, response and session |
//! | [`events`] | The per-request event system |
//! | [`package`] | Registration of package code |
//! | [`error`] | Error types and handling ([`Error`]) |
//!
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod kernel;
pub mod mvc;
pub mod package;
mod server;
mod utils;

pub use config::Config;
pub use error::*;
pub use kernel::{Application, ApplicationBuilder};
pub use utils::*;

pub type Result<T> = std::result::Result<T, Error>;
