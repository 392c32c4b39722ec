//!
//! File based templates with variables, partials and view helpers.
//!
//! | Tag                        | Output                                   |
//! |----------------------------|------------------------------------------|
//! | `{{ name }}`               | variable, HTML escaped                   |
//! | `{{{ name }}}`             | variable, verbatim                       |
//! | `{{> name }}`              | the partial registered under `name`      |
//! | `{{ @helper a key=value }}`| output of a view helper                  |
//!
//! Unknown variables render as the empty string. Before a partial renders it
//! receives every variable of its parent (the parent's value wins) and the
//! parent's helper broker.
//!

use {
    super::{HelperArgs, ViewHelperBroker},
    crate::{Error, ErrorKind, Result, utils::escape_html},
    parking_lot::Mutex,
    std::{
        collections::{BTreeMap, HashMap},
        fmt,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Templates are shared between the layout that embeds them and the
/// controller that fills them.
pub type SharedTemplate = Arc<Mutex<Template>>;

const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    File(PathBuf),
    Inline(String),
}

///
/// A renderable template.
///
/// ```
/// use axum_mvc::mvc::Template;
/// use parking_lot::Mutex;
/// use std::sync::Arc;
///
/// let mut view = Template::inline("<p>{{ name }}</p>");
/// view.assign("name", "Tom & Jerry");
///
/// let mut layout = Template::inline("<body>{{> content }}</body>");
/// layout.add_partial("content", Arc::new(Mutex::new(view)));
///
/// assert_eq!(layout.render().unwrap(), "<body><p>Tom &amp; Jerry</p></body>");
/// ```
///
#[derive(Clone)]
pub struct Template {
    source: Source,
    vars: HashMap<String, String>,
    partials: BTreeMap<String, SharedTemplate>,
    helpers: Option<Arc<ViewHelperBroker>>,
}

impl Template {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(Source::File(path.into()))
    }

    pub fn inline(source: impl Into<String>) -> Self {
        Self::with_source(Source::Inline(source.into()))
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            vars: HashMap::new(),
            partials: BTreeMap::new(),
            helpers: None,
        }
    }

    pub fn set_file(&mut self, path: impl Into<PathBuf>) {
        self.source = Source::File(path.into());
    }

    /// The template file, `None` for inline templates.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Inline(_) => None,
        }
    }

    pub fn assign(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.vars.insert(name.into(), value.to_string());
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn add_partial(&mut self, name: impl Into<String>, partial: SharedTemplate) {
        self.partials.insert(name.into(), partial);
    }

    pub fn partial(&self, name: &str) -> Option<SharedTemplate> {
        self.partials.get(name).cloned()
    }

    pub fn set_helpers(&mut self, helpers: Arc<ViewHelperBroker>) {
        self.helpers = Some(helpers);
    }

    pub fn helpers(&self) -> Option<&Arc<ViewHelperBroker>> {
        self.helpers.as_ref()
    }

    pub fn render(&self) -> Result<String> {
        self.render_at(0)
    }

    fn describe(&self) -> String {
        match &self.source {
            Source::File(path) => path.display().to_string(),
            Source::Inline(_) => "<inline>".into(),
        }
    }

    fn load(&self) -> Result<String> {
        match &self.source {
            Source::File(path) => std::fs::read_to_string(path)
                .map_err(|e| Error::io(format!("View {} can not be read: {}", path.display(), e))),
            Source::Inline(source) => Ok(source.clone()),
        }
    }

    fn render_at(&self, depth: usize) -> Result<String> {
        if depth > MAX_DEPTH {
            return Err(Error::invalid_input(format!(
                "Partials nested deeper than {} levels in {}",
                MAX_DEPTH,
                self.describe()
            )));
        }

        let source = self.load()?;
        let mut out = String::with_capacity(source.len());
        let mut rest = source.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let (raw, open, close) = if tail.starts_with("{{{") {
                (true, 3, "}}}")
            } else {
                (false, 2, "}}")
            };

            let Some(end) = tail[open..].find(close) else {
                return Err(Error::invalid_input(format!(
                    "Unclosed tag in {}",
                    self.describe()
                )));
            };

            let tag = tail[open..open + end].trim();
            out.push_str(&self.render_tag(tag, raw, depth)?);
            rest = &tail[open + end + close.len()..];
        }

        out.push_str(rest);
        Ok(out)
    }

    fn render_tag(&self, tag: &str, raw: bool, depth: usize) -> Result<String> {
        if let Some(name) = tag.strip_prefix('>') {
            return self.render_partial(name.trim(), depth);
        }

        if let Some(call) = tag.strip_prefix('@') {
            let (name, args) = call.split_once(char::is_whitespace).unwrap_or((call, ""));
            let helpers = self.helpers.as_ref().ok_or_else(|| {
                Error::new(
                    ErrorKind::ResourceNotFound,
                    format!("No view helpers available to {}", self.describe()),
                )
            })?;
            return helpers.get(name)?.render(&HelperArgs::parse(args));
        }

        let value = self.var(tag).unwrap_or_default();
        Ok(if raw {
            value.to_string()
        } else {
            escape_html(value)
        })
    }

    fn render_partial(&self, name: &str, depth: usize) -> Result<String> {
        let shared = self.partials.get(name).ok_or_else(|| {
            Error::new(
                ErrorKind::ResourceNotFound,
                format!("Partial {} is not set on {}", name, self.describe()),
            )
        })?;

        let mut partial = shared.lock().clone();
        for (key, value) in &self.vars {
            partial.vars.insert(key.clone(), value.clone());
        }
        if self.helpers.is_some() {
            partial.helpers = self.helpers.clone();
        }
        partial.render_at(depth + 1)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut vars: Vec<_> = self.vars.keys().collect();
        vars.sort();
        f.debug_struct("Template")
            .field("source", &self.describe())
            .field("vars", &vars)
            .field("partials", &self.partials.keys().collect::<Vec<_>>())
            .finish()
    }
}
