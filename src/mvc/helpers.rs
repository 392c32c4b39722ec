//!
//! Named helpers available to views (`{{ @name args }}`) and to actions
//! (`ctx.action_helper("name")`).
//!
//! Each package registers its own helpers; the broker of a request holds the
//! framework helpers, then those of `main`, then those of the dispatched
//! package, a later registration replacing an earlier one.
//!

use {
    crate::{Error, ErrorKind, Result, kernel::Router},
    std::{collections::BTreeMap, collections::HashMap, fmt, sync::Arc},
};

///
/// Arguments of a helper call: bare words are positional, `key=value`
/// pairs are named. Double quotes around a value are removed.
///
/// ```
/// use axum_mvc::mvc::HelperArgs;
///
/// let args = HelperArgs::parse(r#"post_show id=42 title="hello""#);
/// assert_eq!(args.positional(0), Some("post_show"));
/// assert_eq!(args.named("id"), Some("42"));
/// assert_eq!(args.named("title"), Some("hello"));
/// ```
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperArgs {
    positional: Vec<String>,
    named: BTreeMap<String, String>,
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

impl HelperArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Self {
        input
            .split_whitespace()
            .fold(Self::new(), |args, token| match token.split_once('=') {
                Some((key, value)) if !key.is_empty() => args.with_named(key, unquote(value)),
                _ => args.with_arg(unquote(token)),
            })
    }

    pub fn with_arg(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn with_named(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn named(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    pub fn positional_args(&self) -> &[String] {
        &self.positional
    }

    pub fn named_args(&self) -> &BTreeMap<String, String> {
        &self.named
    }
}

/// Produces markup inserted verbatim into a rendered template.
pub trait ViewHelper: Send + Sync {
    fn render(&self, args: &HelperArgs) -> Result<String>;
}

impl<F> ViewHelper for F
where
    F: Fn(&HelperArgs) -> Result<String> + Send + Sync,
{
    fn render(&self, args: &HelperArgs) -> Result<String> {
        self(args)
    }
}

/// Reusable action logic shared between controllers.
pub trait ActionHelper: Send + Sync {
    fn call(&self, args: &HelperArgs) -> Result<String>;
}

impl<F> ActionHelper for F
where
    F: Fn(&HelperArgs) -> Result<String> + Send + Sync,
{
    fn call(&self, args: &HelperArgs) -> Result<String> {
        self(args)
    }
}

///
/// Registry of named helpers for one package.
///
pub struct HelperBroker<H: ?Sized> {
    package: String,
    helpers: HashMap<String, Arc<H>>,
}

pub type ViewHelperBroker = HelperBroker<dyn ViewHelper>;
pub type ActionHelperBroker = HelperBroker<dyn ActionHelper>;

impl<H: ?Sized> HelperBroker<H> {
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            helpers: HashMap::new(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn register(&mut self, name: impl Into<String>, helper: Arc<H>) {
        self.helpers.insert(name.into(), helper);
    }

    /// Adds every helper of `other`, replacing helpers with the same name.
    pub fn extend(&mut self, other: &HelperBroker<H>) {
        for (name, helper) in &other.helpers {
            self.helpers.insert(name.clone(), helper.clone());
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<H>> {
        self.helpers.get(name).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::ResourceNotFound,
                format!("Helper {} not found in package {}", name, self.package),
            )
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.helpers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<H: ?Sized> Clone for HelperBroker<H> {
    fn clone(&self) -> Self {
        Self {
            package: self.package.clone(),
            helpers: self.helpers.clone(),
        }
    }
}

impl<H: ?Sized> fmt::Debug for HelperBroker<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperBroker")
            .field("package", &self.package)
            .field("helpers", &self.names())
            .finish()
    }
}

///
/// `{{ @url route_name param=value }}`: reverse routing from templates.
///
#[derive(Debug, Clone)]
pub struct UrlHelper {
    router: Arc<Router>,
}

impl UrlHelper {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

impl ViewHelper for UrlHelper {
    fn render(&self, args: &HelperArgs) -> Result<String> {
        let route = args
            .positional(0)
            .ok_or_else(|| Error::invalid_input("The url helper needs a route name"))?;
        self.router.to_url(route, args.named_args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrderedMap, RouteDeclaration};

    #[test]
    fn test_parse_mixed_args() {
        let args = HelperArgs::parse("  a b=1  \"c d\" =e ");
        assert_eq!(args.positional_args(), ["a", "\"c", "d\"", "=e"]);
        assert_eq!(args.named("b"), Some("1"));
    }

    #[test]
    fn test_broker_lookup() {
        let mut broker = ViewHelperBroker::new("blog");
        broker.register(
            "shout",
            Arc::new(|args: &HelperArgs| -> Result<String> {
                Ok(args.positional(0).unwrap_or_default().to_uppercase())
            }),
        );

        let helper = broker.get("shout").unwrap();
        assert_eq!(helper.render(&HelperArgs::parse("hey")).unwrap(), "HEY");

        let err = broker.get("whisper").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
        assert!(err.to_string().contains("package blog"));
    }

    #[test]
    fn test_extend_replaces_same_name() {
        let mut main = ActionHelperBroker::new("main");
        main.register("greet", Arc::new(|_: &HelperArgs| -> Result<String> { Ok("main".into()) }));
        main.register("only_main", Arc::new(|_: &HelperArgs| -> Result<String> { Ok("x".into()) }));

        let mut blog = ActionHelperBroker::new("blog");
        blog.register("greet", Arc::new(|_: &HelperArgs| -> Result<String> { Ok("blog".into()) }));

        main.extend(&blog);
        assert_eq!(main.get("greet").unwrap().call(&HelperArgs::new()).unwrap(), "blog");
        assert_eq!(main.names(), vec!["greet", "only_main"]);
    }

    #[test]
    fn test_url_helper() {
        let routes: OrderedMap<RouteDeclaration> = [(
            "post_show".to_string(),
            RouteDeclaration::new("/posts/{id}", "post", "show").with_constraint("id", "[0-9]+"),
        )]
        .into_iter()
        .collect();
        let router = Router::from_packages([("main", &routes)]).unwrap();
        let helper = UrlHelper::new(Arc::new(router));

        assert_eq!(
            helper.render(&HelperArgs::parse("post_show id=7")).unwrap(),
            "/posts/7"
        );
        assert_eq!(
            helper.render(&HelperArgs::parse("post_show id=x")).unwrap_err().kind(),
            ErrorKind::NoRouteFound
        );
        assert_eq!(
            helper.render(&HelperArgs::new()).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }
}
