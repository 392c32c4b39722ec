use {
    serde::{
        Deserialize, Deserializer,
        de::{MapAccess, Visitor},
    },
    std::{collections::BTreeMap, fmt, marker::PhantomData},
};

///
/// A string keyed map that keeps document order.
///
/// Route matching is first-match-wins and dependency injection happens in
/// declaration order, so both need the order in which keys were written.
/// Inserting an existing key replaces the value in place without moving it.
///
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'de, V> Deserialize<'de> for OrderedMap<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut map = OrderedMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

///
/// A single route as declared under `[packages.<name>.routes.<route>]`.
///
/// `path`, `controller` and `action` are optional here so that a missing key
/// surfaces as a malformed-route error naming the route when the router is
/// built, rather than as a generic TOML error.
///
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RouteDeclaration {
    /// Path template, e.g. `/users/{id}`. Whitespace is ignored.
    pub path: Option<String>,

    pub controller: Option<String>,

    pub action: Option<String>,

    /// Controller namespace within the package. Defaults to `controllers`.
    /// Nested namespaces (`controllers/admin`) map to view sub-directories.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Roles allowed to access the route. Empty means public.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Per-parameter regex fragments replacing the default `\S+`.
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,

    #[serde(default)]
    pub cache: Option<CacheDeclaration>,
}

impl RouteDeclaration {
    pub fn new(
        path: impl Into<String>,
        controller: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            path: Some(path.into()),
            controller: Some(controller.into()),
            action: Some(action.into()),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn allow(mut self, role: impl Into<String>) -> Self {
        self.allow.push(role.into());
        self
    }

    pub fn with_constraint(mut self, param: impl Into<String>, regex: impl Into<String>) -> Self {
        self.constraints.insert(param.into(), regex.into());
        self
    }

    pub fn with_cache(mut self, expires: u64, roles: &[&str]) -> Self {
        self.cache = Some(CacheDeclaration {
            expires,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        });
        self
    }
}

/// `cache = { expires = 60, roles = ["guest"] }` on a route.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CacheDeclaration {
    /// Lifetime in seconds. Zero disables caching.
    #[serde(default)]
    pub expires: u64,

    /// Roles whose responses may be cached and served from cache. Empty means all.
    #[serde(default)]
    pub roles: Vec<String>,
}

///
/// The right hand side of a dependency declaration.
///
/// ```toml
/// [packages.main.dependencies.Mailer]
/// transport = "SmtpTransport"          # resolved through the container
/// sender = { value = "noreply@x.org" } # injected as-is
/// ```
///
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DependencyValue {
    Reference(String),
    Literal { value: toml::Value },
}

impl DependencyValue {
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference(name.into())
    }

    pub fn literal(value: impl Into<toml::Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }
}

/// Component name to its ordered dependency declarations.
pub type DependencyMap = OrderedMap<OrderedMap<DependencyValue>>;

///
/// Everything configured for one package under `[packages.<name>]`.
///
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageConfig {
    /// Free-form settings exposed to controllers as the `Config` resource.
    #[serde(default)]
    pub config: toml::Table,

    #[serde(default)]
    pub routes: OrderedMap<RouteDeclaration>,

    #[serde(default)]
    pub dependencies: DependencyMap,

    /// Handler name to the events it subscribes to.
    #[serde(default)]
    pub handlers: OrderedMap<Vec<String>>,
}

impl PackageConfig {
    pub fn with_route(mut self, name: impl Into<String>, route: RouteDeclaration) -> Self {
        self.routes.insert(name, route);
        self
    }

    pub fn with_dependency(
        mut self,
        component: &str,
        dependency: impl Into<String>,
        value: DependencyValue,
    ) -> Self {
        let mut declared = self.dependencies.get(component).cloned().unwrap_or_default();
        declared.insert(dependency, value);
        self.dependencies.insert(component, declared);
        self
    }

    pub fn with_handler(mut self, name: impl Into<String>, events: &[&str]) -> Self {
        self.handlers
            .insert(name, events.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

///
/// Read access to a package's free-form settings with dotted keys.
///
/// ```
/// use axum_mvc::config::PackageSettings;
///
/// let settings = PackageSettings::new(toml::from_str("[mvc]\nlayout_path = \"x\"").unwrap());
/// assert_eq!(settings.get_str("mvc.layout_path"), Some("x"));
/// assert!(settings.get("mvc.missing").is_none());
/// ```
///
#[derive(Debug, Clone, Default)]
pub struct PackageSettings(toml::Table);

impl PackageSettings {
    pub fn new(table: toml::Table) -> Self {
        Self(table)
    }

    pub fn get(&self, dotted_key: &str) -> Option<&toml::Value> {
        let mut parts = dotted_key.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, dotted_key: &str) -> Option<&str> {
        self.get(dotted_key).and_then(toml::Value::as_str)
    }

    pub fn table(&self) -> &toml::Table {
        &self.0
    }
}
