//!
//! Route compilation, matching and reverse routing.
//!
//! Each declared path template such as `/users/{id}/posts/{slug}` is compiled
//! into an anchored regular expression. A placeholder becomes a named capture
//! group using either the route's constraint for that parameter or `\S+`.
//! Routes are tried in declaration order and the first match wins.
//!
//! ```
//! use axum_mvc::config::{Config, RouteDeclaration};
//! use axum_mvc::kernel::Router;
//!
//! let config = Config::default()
//!     .with_route("main", "user_show", RouteDeclaration::new("/users/{id}", "user", "show")
//!         .with_constraint("id", "[0-9]+"));
//! let router = Router::from_config(&config).unwrap();
//!
//! let matched = router.match_url("/users/42").unwrap();
//! assert_eq!(matched.route.controller(), "user");
//! assert_eq!(matched.params["id"], "42");
//!
//! assert!(router.match_url("/users/bob").is_none());
//! assert_eq!(router.to_url("user_show", [("id", "7")]).unwrap(), "/users/7");
//! ```
//!

use {
    crate::{
        Error, Result,
        config::{Config, OrderedMap, RouteDeclaration},
    },
    regex::{Captures, Regex},
    std::{
        collections::{BTreeMap, HashMap},
        sync::LazyLock,
        time::Duration,
    },
};

static PARAM_REGEXP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(.+?)\}").unwrap());
static WHITESPACE_REGEXP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const DEFAULT_NAMESPACE: &str = "controllers";
const DEFAULT_CONSTRAINT: &str = r"\S+";

fn strip_whitespace(s: &str) -> String {
    WHITESPACE_REGEXP.replace_all(s, "").into_owned()
}

/// Page cache settings of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Entry lifetime in seconds; zero disables caching.
    pub expires: u64,
    /// Roles eligible for caching; empty means every role.
    pub roles: Vec<String>,
}

impl CachePolicy {
    pub fn is_enabled(&self) -> bool {
        self.expires > 0
    }

    /// True when responses for `role` may be served from and written to the cache.
    pub fn applies_to(&self, role: &str) -> bool {
        self.is_enabled() && (self.roles.is_empty() || self.roles.iter().any(|r| r == role))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.expires)
    }
}

///
/// A compiled route. Immutable once built.
///
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    package: String,
    path: String,
    pattern: Regex,
    namespace: String,
    controller: String,
    action: String,
    params: Vec<String>,
    allow: Vec<String>,
    cache: CachePolicy,
    constraints: HashMap<String, Regex>,
}

impl Route {
    ///
    /// Compiles one declaration. Fails with a malformed-route error when
    /// `path`, `controller` or `action` is missing or when the resulting
    /// pattern is not a valid regular expression.
    ///
    pub fn compile(name: &str, package: &str, declaration: &RouteDeclaration) -> Result<Route> {
        let (Some(path), Some(controller), Some(action)) = (
            declaration.path.as_deref(),
            declaration.controller.as_deref(),
            declaration.action.as_deref(),
        ) else {
            return Err(Error::malformed_route(format!(
                "{} Malformed route. Be sure you set the path, the controller and the action in your routes definition",
                name
            )));
        };

        let path = strip_whitespace(path);
        let params: Vec<String> = PARAM_REGEXP
            .captures_iter(&path)
            .map(|caps| caps[1].to_string())
            .collect();

        let mut pattern = path.clone();
        let mut constraints = HashMap::with_capacity(params.len());
        for param in &params {
            let constraint = declaration
                .constraints
                .get(param)
                .map(|c| strip_whitespace(c))
                .unwrap_or_else(|| DEFAULT_CONSTRAINT.to_string());

            pattern = pattern.replace(
                &format!("{{{}}}", param),
                &format!("(?P<{}>{})", param, constraint),
            );

            let anchored = Regex::new(&format!("^(?:{})$", constraint)).map_err(|e| {
                Error::malformed_route(format!("{}: constraint for {}: {}", name, param, e))
            })?;
            constraints.insert(param.clone(), anchored);
        }

        let pattern = Regex::new(&format!("^{}$", pattern))
            .map_err(|e| Error::malformed_route(format!("{}: {}", name, e)))?;

        let cache = declaration
            .cache
            .as_ref()
            .map(|c| CachePolicy {
                expires: c.expires,
                roles: c.roles.clone(),
            })
            .unwrap_or_default();

        Ok(Route {
            name: name.to_string(),
            package: package.to_string(),
            path,
            pattern,
            namespace: declaration
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            controller: controller.to_string(),
            action: action.to_string(),
            params,
            allow: declaration.allow.clone(),
            cache,
            constraints,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// The path template with whitespace removed.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The anchored pattern URLs are matched against.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
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

    /// Placeholder names in template order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn allow(&self) -> &[String] {
        &self.allow
    }

    pub fn cache(&self) -> &CachePolicy {
        &self.cache
    }

    /// An empty allow-list makes the route public.
    pub fn is_allowed(&self, role: &str) -> bool {
        self.allow.is_empty() || self.allow.iter().any(|r| r == role)
    }

    ///
    /// Sub-directory of `views/scripts` for controllers in nested namespaces:
    /// `controllers/admin/reports` gives `admin/reports`.
    ///
    pub fn view_path(&self) -> String {
        self.namespace
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .skip(1)
            .collect::<Vec<_>>()
            .join("/")
    }

    fn extract(&self, url: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.pattern.captures(url)?;
        Some(
            self.params
                .iter()
                .map(|p| {
                    let value = caps.name(p).map(|m| m.as_str()).unwrap_or_default();
                    (p.clone(), value.to_string())
                })
                .collect(),
        )
    }

    fn accepts(&self, params: &BTreeMap<String, String>) -> bool {
        params.len() == self.params.len()
            && params.iter().all(|(key, value)| {
                self.constraints
                    .get(key)
                    .is_some_and(|constraint| constraint.is_match(value))
            })
    }

    /// Substitutes every placeholder in one pass over the declared path.
    fn fill(&self, params: &BTreeMap<String, String>) -> String {
        PARAM_REGEXP
            .replace_all(&self.path, |caps: &Captures| {
                params
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// A successful match: the route and its extracted parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: BTreeMap<String, String>,
}

///
/// The compiled route table of all active packages.
///
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    ///
    /// Builds the router from the routes of the active packages, in package
    /// order. A route name declared again, in the same or a later package,
    /// replaces the earlier declaration at its original position.
    ///
    pub fn from_config(config: &Config) -> Result<Router> {
        let active = config.application.active_packages();
        let empty = OrderedMap::new();
        Self::from_packages(active.iter().map(|package| {
            let routes = config
                .package(package)
                .map(|p| &p.routes)
                .unwrap_or(&empty);
            (package.as_str(), routes)
        }))
    }

    pub fn from_packages<'a, I>(packages: I) -> Result<Router>
    where
        I: IntoIterator<Item = (&'a str, &'a OrderedMap<RouteDeclaration>)>,
    {
        let mut declared: OrderedMap<(&str, &RouteDeclaration)> = OrderedMap::new();
        for (package, routes) in packages {
            for (name, declaration) in routes.iter() {
                declared.insert(name, (package, declaration));
            }
        }

        let routes = declared
            .iter()
            .map(|(name, (package, declaration))| Route::compile(name, package, declaration))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(routes = routes.len(), "Routes compiled");
        Ok(Router { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    ///
    /// Returns the first route, in declaration order, whose pattern matches
    /// the whole `url`. No match is not an error.
    ///
    pub fn match_url(&self, url: &str) -> Option<RouteMatch<'_>> {
        let matched = self.routes.iter().find_map(|route| {
            route
                .extract(url)
                .map(|params| RouteMatch { route, params })
        });

        match &matched {
            Some(m) => tracing::debug!(url = %url, route = %m.route.name, "Route matched"),
            None => tracing::debug!(url = %url, "No route matched"),
        }
        matched
    }

    ///
    /// Generates the URL of a named route.
    ///
    /// Every placeholder must be supplied, no extra parameters are accepted
    /// and each value must satisfy the route's constraint, so that matching
    /// the generated URL yields the same parameters back.
    ///
    pub fn to_url<I, K, V>(&self, name: &str, params: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();

        let route = self
            .route(name)
            .filter(|route| route.accepts(&params))
            .ok_or_else(|| Error::no_route_found(name))?;

        let url = route.fill(&params);
        match route.extract(&url) {
            Some(extracted) if extracted == params => Ok(url),
            _ => Err(Error::no_route_found(name)),
        }
    }
}
