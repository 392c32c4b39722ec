//!
//! Controllers, views, helpers and the action output buffer.
//!

mod controller;
mod helpers;
mod output;
mod view;

pub use controller::{
    ActionResult, Controller, ControllerContext, ErrorController, ErrorDispatcher,
};
pub use helpers::{
    ActionHelper, ActionHelperBroker, HelperArgs, HelperBroker, UrlHelper, ViewHelper,
    ViewHelperBroker,
};
pub use output::OutputBuffer;
pub use view::{SharedTemplate, Template};
