//!
//! The front controller: one instance per request.
//!
//! ```text
//! match url ──none──▶ main bootstrap ──▶ Error::pageNotFound (404)
//!    │
//!    ▼
//! minimal bootstrap (role) ──denied──▶ main bootstrap ──▶ Error::forbidden (403)
//!    │
//!    ▼
//! page cache ──fresh──▶ cached content (200)
//!    │
//!    ▼
//! bootstrap ─▶ controller init ─▶ PreDispatch ─▶ action ─▶ PostDispatch
//!                                    └──── any error ────▶ Error::exceptionHandler (500)
//! ```
//!
//! Errors raised outside the guarded dispatch region (bootstrap, container
//! wiring, a failing exception handler) end in a bare 500 page rendered
//! without any template.
//!

use {
    super::{Bootstrap, Container, ControllerTarget, PageCache, Router, resources},
    crate::{
        Error, Result,
        config::MAIN_PACKAGE,
        events::{Event, EventSystem, POST_DISPATCH, PRE_DISPATCH},
        http::{Request, Response},
        mvc::{ActionResult, Controller, ControllerContext, ErrorDispatcher, OutputBuffer},
        package::{DEFAULT_NAMESPACE, PackageRegistry},
        utils::escape_html,
    },
    http::StatusCode,
    parking_lot::Mutex,
    std::{collections::BTreeMap, sync::Arc},
};

pub const PAGE_NOT_FOUND_ACTION: &str = "pageNotFound";
pub const FORBIDDEN_ACTION: &str = "forbidden";
pub const EXCEPTION_HANDLER_ACTION: &str = "exceptionHandler";

const ERROR_CONTROLLER: &str = "Error";

/// Content produced by one dispatch.
struct Dispatched {
    content: String,
    /// The action failed and the content came from the exception handler.
    failed: bool,
}

pub struct FrontController {
    container: Container,
    packages: Arc<PackageRegistry>,
    response: Arc<Mutex<Response>>,
}

impl FrontController {
    ///
    /// `container` must already hold the request level resources
    /// (`Request`, `Session`, `Role`, `Router`, `Cache`, `Output`, ...).
    ///
    pub fn new(mut container: Container, packages: Arc<PackageRegistry>) -> Self {
        let response = Arc::new(Mutex::new(Response::new()));
        container.add_resource(resources::RESPONSE, response.clone());
        Self {
            container,
            packages,
            response,
        }
    }

    /// Dispatches the request and returns the response to send.
    pub fn run(mut self) -> Response {
        let content = match self.route() {
            Ok(content) => content,
            Err(error) => {
                tracing::error!(
                    error = %error,
                    error_code = error.error_code(),
                    "Request failed outside of the action"
                );
                let mut response = self.response.lock();
                *response = Response::new();
                response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                uncaught_error_page(&error)
            }
        };

        let mut response = std::mem::take(&mut *self.response.lock());
        response.set_content(content);
        response
    }

    fn set_status(&self, status: StatusCode) {
        self.response.lock().set_status(status);
    }

    fn route(&mut self) -> Result<String> {
        let url = self
            .container
            .get::<Mutex<Request>>(resources::REQUEST)?
            .lock()
            .url()
            .to_string();
        let router = self.container.get::<Router>(resources::ROUTER)?;
        let packages = self.packages.clone();

        let Some(matched) = router.match_url(&url) else {
            self.set_status(StatusCode::NOT_FOUND);
            let params = BTreeMap::from([("url".to_string(), url)]);
            return self.dispatch_error_action(PAGE_NOT_FOUND_ACTION, params);
        };
        let route = matched.route;

        let bootstrap = Bootstrap::new(route.package(), &packages)?;
        bootstrap.minimal_bootstrap(&mut self.container)?;

        let role = self.container.get::<String>(resources::ROLE)?;
        if !route.is_allowed(&role) {
            tracing::info!(url = %url, route = %route.name(), role = %role, "Access denied");
            self.set_status(StatusCode::FORBIDDEN);
            let params = BTreeMap::from([
                ("url".to_string(), url),
                ("route".to_string(), route.name().to_string()),
                ("controller".to_string(), route.controller().to_string()),
                ("action".to_string(), route.action().to_string()),
            ]);
            return self.dispatch_error_action(FORBIDDEN_ACTION, params);
        }

        let cache = self.container.get::<PageCache>(resources::CACHE)?;
        let cacheable = route.cache().applies_to(&role);
        if cacheable && let Some(content) = cache.get(&url, route.cache().ttl())? {
            tracing::debug!(url = %url, route = %route.name(), "Served from the page cache");
            self.set_status(StatusCode::OK);
            return Ok(content);
        }

        let controller = packages
            .get(route.package())
            .and_then(|package| package.build_controller(route.namespace(), route.controller()))
            .ok_or_else(|| {
                Error::config(format!(
                    "Route {} points to {}/{}, which package {} does not register",
                    route.name(),
                    route.namespace(),
                    route.controller(),
                    route.package()
                ))
            })?;

        let view_path = route.view_path();
        let target = ControllerTarget {
            package: route.package(),
            namespace: route.namespace(),
            controller: route.controller(),
            action: route.action(),
            view_path: &view_path,
            params: matched.params,
            error: false,
        };
        let dispatched = self.execute(&bootstrap, target, controller)?;

        if cacheable && !dispatched.failed {
            cache.put(&url, &dispatched.content)?;
        }

        let mut response = self.response.lock();
        if response.status().is_none() {
            response.set_status(StatusCode::OK);
        }
        Ok(dispatched.content)
    }

    ///
    /// Runs `pageNotFound` or `forbidden` of main's error controller.
    ///
    /// Always bootstraps `main`, also for a 403 on a route of another
    /// package: `main` registers the error controller, and its views live
    /// under `packages/main/views/scripts/error`. Resources the denied
    /// package's minimal bootstrap added (such as `Role`) stay in the
    /// container.
    ///
    fn dispatch_error_action(
        &mut self,
        action: &str,
        params: BTreeMap<String, String>,
    ) -> Result<String> {
        let packages = self.packages.clone();
        let bootstrap = Bootstrap::new(MAIN_PACKAGE, &packages)?;
        let controller = Box::new(error_dispatcher(&packages)?);
        let target = ControllerTarget {
            package: MAIN_PACKAGE,
            namespace: DEFAULT_NAMESPACE,
            controller: ERROR_CONTROLLER,
            action,
            view_path: "",
            params,
            error: false,
        };
        Ok(self.execute(&bootstrap, target, controller)?.content)
    }

    fn execute(
        &mut self,
        bootstrap: &Bootstrap<'_>,
        target: ControllerTarget<'_>,
        mut controller: Box<dyn Controller>,
    ) -> Result<Dispatched> {
        let package = target.package.to_string();
        let name = target.controller.to_string();
        let action = target.action.to_string();

        self.container
            .add_resource(resources::PACKAGE, Arc::new(package.clone()));
        bootstrap.bootstrap(&mut self.container)?;

        let events = self.container.get::<EventSystem>(resources::EVENT_SYSTEM)?;
        events.set_package(&package);

        let mut ctx = self.container.resolve_controller(target, &mut *controller)?;
        controller.init(&mut ctx)?;

        let mut error_controller = error_dispatcher(&self.packages)?;
        let mut error_ctx = self.container.resolve_controller(
            ControllerTarget {
                package: MAIN_PACKAGE,
                namespace: DEFAULT_NAMESPACE,
                controller: ERROR_CONTROLLER,
                action: EXCEPTION_HANDLER_ACTION,
                view_path: "",
                params: BTreeMap::new(),
                error: true,
            },
            &mut error_controller,
        )?;

        let output = self.container.get::<OutputBuffer>(resources::OUTPUT)?;
        output.clear();

        match guarded_dispatch(&events, &mut *controller, &action, &mut ctx) {
            Ok(result) => Ok(Dispatched {
                content: collect(result, &output),
                failed: false,
            }),
            Err(error) => {
                tracing::error!(
                    error = %error,
                    error_code = error.error_code(),
                    package = %package,
                    controller = %name,
                    action = %action,
                    "Action failed"
                );
                output.clear();
                {
                    let mut response = self.response.lock();
                    response.clear_headers();
                    response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
                let result = error_controller.exception_handler(&error, &mut error_ctx)?;
                Ok(Dispatched {
                    content: collect(result, &output),
                    failed: true,
                })
            }
        }
    }
}

/// PreDispatch, the action and PostDispatch; the first error stops the rest.
fn guarded_dispatch(
    events: &EventSystem,
    controller: &mut dyn Controller,
    action: &str,
    ctx: &mut ControllerContext,
) -> Result<ActionResult> {
    let package = Arc::new(ctx.package().to_string());
    let name = Arc::new(ctx.controller().to_string());
    let action_name = Arc::new(action.to_string());
    let event = |event: &str| {
        Event::new(event)
            .with_param("package", package.clone())
            .with_param("controller", name.clone())
            .with_param("action", action_name.clone())
    };

    events.raise_event(&event(PRE_DISPATCH))?;
    let result = controller.dispatch(action, ctx)?;
    events.raise_event(&event(POST_DISPATCH))?;
    Ok(result)
}

fn collect(result: ActionResult, output: &OutputBuffer) -> String {
    match result {
        ActionResult::Rendered(content) => {
            output.clear();
            content
        }
        ActionResult::Buffered => output.take(),
    }
}

fn error_dispatcher(packages: &PackageRegistry) -> Result<ErrorDispatcher> {
    packages
        .get(MAIN_PACKAGE)
        .and_then(|main| main.build_error_controller())
        .map(ErrorDispatcher::new)
        .ok_or_else(|| Error::config("Package main does not register an error controller"))
}

fn uncaught_error_page(error: &Error) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Error 500 - Uncaught Exception</title></head>\n<body>\n<h1>Error 500 - Uncaught Exception</h1>\n<p>{}</p>\n<p><code>{}</code></p>\n</body>\n</html>\n",
        escape_html(&error.to_string()),
        error.error_code()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_uncaught_error_page_escapes() {
        let page = uncaught_error_page(&Error::internal("<script>boom</script>"));
        assert!(page.contains("Error 500 - Uncaught Exception"));
        assert!(page.contains("&lt;script&gt;boom&lt;/script&gt;"));
        assert!(!page.contains("<script>"));
    }

    #[test]
    fn test_collect_prefers_returned_content() {
        let output = OutputBuffer::new();
        output.write("buffered");
        assert_eq!(collect(ActionResult::Rendered("returned".into()), &output), "returned");
        assert!(output.is_empty());

        output.write("buffered");
        assert_eq!(collect(ActionResult::Buffered, &output), "buffered");
        assert!(output.is_empty());
    }

    #[test]
    fn test_missing_error_controller() {
        let registry = PackageRegistry::new(Vec::new(), &[MAIN_PACKAGE.to_string()]);
        let err = error_dispatcher(&registry).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
