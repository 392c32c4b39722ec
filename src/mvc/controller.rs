//!
//! Controllers and what they see of the request.
//!
//! A controller is looked up by the `(namespace, controller)` pair of the
//! matched route, built fresh for every request, given its declared
//! dependencies and then asked to run the routed action through
//! [`Controller::dispatch`]. Everything the framework wired for the request
//! (view, layout, response, session...) is reachable from the
//! [`ControllerContext`] passed along.
//!

use {
    super::{ActionHelper, ActionHelperBroker, OutputBuffer, SharedTemplate},
    crate::{
        Error, Result,
        config::{AppStage, PackageSettings},
        events::EventSystem,
        http::{Request, Response, Session},
        kernel::{
            EXCEPTION_HANDLER_ACTION, FORBIDDEN_ACTION, Injectable, PAGE_NOT_FOUND_ACTION,
            PageCache, Resource, Router,
        },
    },
    axum::http::StatusCode,
    parking_lot::Mutex,
    serde::Serialize,
    std::{collections::BTreeMap, path::Path, path::PathBuf, sync::Arc},
};

///
/// What an action produced.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    /// The content of the response. Anything written to the output buffer
    /// is discarded.
    Rendered(String),
    /// The response content is whatever the action wrote to the output
    /// buffer, typically through [`ControllerContext::render`].
    Buffered,
}

///
/// A request handling controller.
///
/// ```
/// use axum_mvc::{Error, Result};
/// use axum_mvc::kernel::Injectable;
/// use axum_mvc::mvc::{ActionResult, Controller, ControllerContext};
///
/// #[derive(Default)]
/// struct IndexController;
///
/// impl Injectable for IndexController {
///     fn component_name(&self) -> &str { "IndexController" }
/// }
///
/// impl Controller for IndexController {
///     fn dispatch(&mut self, action: &str, ctx: &mut ControllerContext) -> Result<ActionResult> {
///         match action {
///             "index" => {
///                 ctx.assign("title", "Home");
///                 ctx.render()?;
///                 Ok(ActionResult::Buffered)
///             }
///             "ping" => Ok(ActionResult::Rendered("pong".into())),
///             other => Err(Error::action_not_found("index", other)),
///         }
///     }
/// }
/// ```
///
pub trait Controller: Injectable {
    /// Runs after dependencies are injected and before any event fires.
    fn init(&mut self, ctx: &mut ControllerContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn dispatch(&mut self, action: &str, ctx: &mut ControllerContext) -> Result<ActionResult>;
}

///
/// The controller rendering not-found, forbidden and failure pages. The
/// `main` package must register one.
///
pub trait ErrorController: Injectable {
    /// `ctx.params()` holds `url`.
    fn page_not_found(&mut self, ctx: &mut ControllerContext) -> Result<ActionResult>;

    /// `ctx.params()` holds `url`, `route`, `controller` and `action`.
    fn forbidden(&mut self, ctx: &mut ControllerContext) -> Result<ActionResult>;

    /// Called with the error an action or an event handler failed with.
    /// The output buffer has already been cleared.
    fn exception_handler(&mut self, error: &Error, ctx: &mut ControllerContext)
    -> Result<ActionResult>;
}

///
/// Presents an [`ErrorController`] as a regular controller whose actions
/// are `pageNotFound` and `forbidden`, so that not-found and forbidden
/// requests go through the same dispatch as any other.
///
pub struct ErrorDispatcher(Box<dyn ErrorController>);

impl ErrorDispatcher {
    pub fn new(controller: Box<dyn ErrorController>) -> Self {
        Self(controller)
    }

    pub fn exception_handler(
        &mut self,
        error: &Error,
        ctx: &mut ControllerContext,
    ) -> Result<ActionResult> {
        self.0.exception_handler(error, ctx)
    }
}

impl Injectable for ErrorDispatcher {
    fn component_name(&self) -> &str {
        self.0.component_name()
    }

    fn inject(&mut self, dependency: &str, value: Resource) -> Result<()> {
        self.0.inject(dependency, value)
    }
}

impl Controller for ErrorDispatcher {
    fn dispatch(&mut self, action: &str, ctx: &mut ControllerContext) -> Result<ActionResult> {
        match action {
            PAGE_NOT_FOUND_ACTION => self.0.page_not_found(ctx),
            FORBIDDEN_ACTION => self.0.forbidden(ctx),
            EXCEPTION_HANDLER_ACTION => Err(Error::internal(
                "exceptionHandler needs the error it handles; call ErrorDispatcher::exception_handler",
            )),
            other => Err(Error::action_not_found(self.0.component_name(), other)),
        }
    }
}

///
/// The request as seen by a controller.
///
/// Built by [`Container::resolve_controller`](crate::kernel::Container::resolve_controller).
/// The view is the `content` partial of the layout; [`render`](Self::render)
/// renders the layout into the output buffer.
///
pub struct ControllerContext {
    pub(crate) package: String,
    pub(crate) namespace: String,
    pub(crate) controller: String,
    pub(crate) action: String,
    pub(crate) params: BTreeMap<String, String>,
    pub(crate) stage: AppStage,
    pub(crate) events: Arc<EventSystem>,
    pub(crate) router: Arc<Router>,
    pub(crate) cache: Arc<PageCache>,
    pub(crate) layout: SharedTemplate,
    pub(crate) view: SharedTemplate,
    pub(crate) views_dir: PathBuf,
    pub(crate) action_helpers: Arc<ActionHelperBroker>,
    pub(crate) config: Arc<PackageSettings>,
    pub(crate) request: Option<Arc<Mutex<Request>>>,
    pub(crate) session: Arc<Session>,
    pub(crate) response: Arc<Mutex<Response>>,
    pub(crate) output: OutputBuffer,
}

impl ControllerContext {
    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Route parameters, or the parameters of a not-found/forbidden dispatch.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn stage(&self) -> AppStage {
        self.stage
    }

    pub fn events(&self) -> &Arc<EventSystem> {
        &self.events
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    pub fn layout(&self) -> &SharedTemplate {
        &self.layout
    }

    pub fn view(&self) -> &SharedTemplate {
        &self.view
    }

    /// Directory holding the view files of this controller.
    pub fn views_dir(&self) -> &Path {
        &self.views_dir
    }

    pub fn config(&self) -> &PackageSettings {
        &self.config
    }

    /// `None` for the error controller.
    pub fn request(&self) -> Option<&Arc<Mutex<Request>>> {
        self.request.as_ref()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn response(&self) -> &Arc<Mutex<Response>> {
        &self.response
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn action_helper(&self, name: &str) -> Result<Arc<dyn ActionHelper>> {
        self.action_helpers.get(name)
    }

    /// Sets a view variable.
    pub fn assign(&self, name: impl Into<String>, value: impl std::fmt::Display) {
        self.view.lock().assign(name, value);
    }

    /// Renders another action's view file instead of this one.
    pub fn set_view_action(&self, action: &str) {
        self.view
            .lock()
            .set_file(self.views_dir.join(format!("{}.html", action)));
    }

    /// Renders the layout, with the view as its `content`, into the output buffer.
    pub fn render(&self) -> Result<()> {
        let layout = self.layout.lock().clone();
        let html = layout.render()?;
        self.output.write(&html);
        Ok(())
    }

    /// Renders only the view, without the layout.
    pub fn render_view(&self) -> Result<String> {
        let mut view = self.view.lock().clone();
        if let Some(helpers) = self.layout.lock().helpers() {
            view.set_helpers(helpers.clone());
        }
        view.render()
    }

    pub fn echo(&self, text: &str) {
        self.output.write(text);
    }

    pub fn set_status(&self, status: StatusCode) {
        self.response.lock().set_status(status);
    }

    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        self.response.lock().set_header(name, value)
    }

    /// Serializes `value` as the response body with a JSON content type.
    pub fn json<T: Serialize>(&self, value: &T) -> Result<ActionResult> {
        let body = serde_json::to_string(value)?;
        self.set_header("content-type", "application/json")?;
        Ok(ActionResult::Rendered(body))
    }

    pub fn url<I, K, V>(&self, route: &str, params: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.router.to_url(route, params)
    }

    /// Answers `302 Found` with the URL of `route`.
    pub fn redirect<I, K, V>(&self, route: &str, params: I) -> Result<ActionResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let location = self.url(route, params)?;
        let mut response = self.response.lock();
        response.set_status(StatusCode::FOUND);
        response.set_header("location", &location)?;
        Ok(ActionResult::Rendered(String::new()))
    }
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("package", &self.package)
            .field("namespace", &self.namespace)
            .field("controller", &self.controller)
            .field("action", &self.action)
            .field("params", &self.params)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ErrorKind,
        config::{OrderedMap, RouteDeclaration},
        mvc::Template,
    };
    use axum::http::header;

    fn context(dir: &Path) -> ControllerContext {
        let routes: OrderedMap<RouteDeclaration> = [(
            "user_show".to_string(),
            RouteDeclaration::new("/users/{id}", "user", "show").with_constraint("id", "[0-9]+"),
        )]
        .into_iter()
        .collect();

        let view = Arc::new(Mutex::new(Template::file(dir.join("show.html"))));
        let mut layout = Template::inline("<main>{{> content }}</main>");
        layout.add_partial("content", view.clone());

        ControllerContext {
            package: "main".into(),
            namespace: "controllers".into(),
            controller: "user".into(),
            action: "show".into(),
            params: BTreeMap::from([("id".to_string(), "7".to_string())]),
            stage: AppStage::Test,
            events: Arc::new(EventSystem::new("main")),
            router: Arc::new(Router::from_packages([("main", &routes)]).unwrap()),
            cache: Arc::new(PageCache::new(dir.join("cache"))),
            layout: Arc::new(Mutex::new(layout)),
            view,
            views_dir: dir.to_path_buf(),
            action_helpers: Arc::new(ActionHelperBroker::new("main")),
            config: Arc::new(PackageSettings::default()),
            request: None,
            session: Arc::new(Session::new()),
            response: Arc::new(Mutex::new(Response::default())),
            output: OutputBuffer::new(),
        }
    }

    #[test]
    fn test_render_writes_layout_to_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("show.html"), "user {{ id }}").unwrap();
        std::fs::write(dir.path().join("edit.html"), "edit {{ id }}").unwrap();

        let ctx = context(dir.path());
        ctx.assign("id", ctx.param("id").unwrap());
        ctx.render().unwrap();
        assert_eq!(ctx.output().take(), "<main>user 7</main>");

        ctx.set_view_action("edit");
        assert_eq!(ctx.render_view().unwrap(), "edit 7");
    }

    #[test]
    fn test_json_sets_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = ctx.json(&serde_json::json!({ "id": 7 })).unwrap();
        assert_eq!(result, ActionResult::Rendered(r#"{"id":7}"#.into()));

        let response = ctx.response().lock().clone().send();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }

    #[test]
    fn test_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.redirect("user_show", [("id", "9")]).unwrap();

        let response = ctx.response().lock().clone().send();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/users/9");

        let err = ctx.redirect("user_show", [("id", "x")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoRouteFound);
    }

    #[test]
    fn test_missing_action_helper() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert_eq!(
            ctx.action_helper("paginate").err().unwrap().kind(),
            ErrorKind::ResourceNotFound
        );
    }
}
