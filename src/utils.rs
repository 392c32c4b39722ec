//!
//! Small helpers shared across the framework.
//!
//! - [`Sensitive`] hides secrets (database passwords) from debug output
//! - [`RequestIdGenerator`] keeps or mints the `x-request-id` of each request
//! - [`replace_handlebars_with_env`] expands `{{ VAR }}` references in config files
//! - naming helpers used by the controller/action convention
//!

use {
    http::{HeaderValue, Request},
    regex::{Captures, Regex},
    serde::Deserialize,
    std::{env, sync::LazyLock},
    tower_http::request_id::{MakeRequestId, RequestId},
    uuid::{ContextV7, Timestamp, Uuid},
    zeroize::{Zeroize, ZeroizeOnDrop},
};

/// Matches `{{ VAR_NAME }}` with optional inner whitespace. Only upper case
/// names are matched so that view placeholders like `{{ title }}` survive.
static HANDLEBAR_REGEXP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Z0-9_]+)\s*\}\}").unwrap());

///
/// A wrapper for secrets that prints as `Sensitive(****)` and zeroes its
/// memory on drop.
///
/// # Type Parameters
///
/// * `T` - The wrapped value; it must implement `Default` and `Zeroize`
///
/// # Security Features
///
/// - `Debug` never prints the value, so configs can be logged with `{:?}`
/// - The memory is overwritten with zeros when the wrapper is dropped
/// - Deserializes transparently, e.g. `password = "{{ DB_PASSWORD }}"`
///
/// # Examples
///
/// ```
/// use axum_mvc::Sensitive;
///
/// let password = Sensitive::from("s3cr3t");
/// assert_eq!(format!("{:?}", password), "Sensitive(****)");
/// assert_eq!(password.0, "s3cr3t");
/// assert!(!password.is_empty());
/// ```
///
#[derive(Clone, Deserialize, Default, Zeroize, ZeroizeOnDrop)]
pub struct Sensitive<T: Default + Zeroize>(pub T);

impl Sensitive<String> {
    /// Wraps a string slice.
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Default + Zeroize + PartialEq> PartialEq for Sensitive<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: Default + Zeroize> std::fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sensitive(****)")
    }
}

///
/// Request id maker for `tower-http`'s `SetRequestIdLayer`.
///
/// An incoming `x-request-id` header is preserved; otherwise a UUIDv7 is
/// generated so ids sort by arrival time in the logs.
///
/// # Request ID Flow
///
/// ```text
/// client ──x-request-id?──▶ SetRequestIdLayer ──▶ TraceLayer span ──▶ dispatch
///                              │ (keep or mint)                          │
///                              ▼                                         ▼
///                         request header ◀── PropagateRequestIdLayer ◀── response
/// ```
///
/// # Examples
///
/// ```
/// use axum::http::Request;
/// use axum_mvc::RequestIdGenerator;
/// use tower_http::request_id::MakeRequestId;
///
/// let mut ids = RequestIdGenerator;
///
/// let tagged = Request::builder().header("x-request-id", "abc-123").body(()).unwrap();
/// let id = ids.make_request_id(&tagged).unwrap();
/// assert_eq!(id.header_value(), "abc-123");
///
/// let untagged = Request::builder().body(()).unwrap();
/// let id = ids.make_request_id(&untagged).unwrap();
/// assert_eq!(id.header_value().len(), 36);
/// ```
///
#[derive(Debug, Clone, Copy)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, req: &Request<B>) -> Option<RequestId> {
        match req.headers().get("x-request-id") {
            Some(value) => Some(RequestId::new(value.clone())),
            None => {
                let value = HeaderValue::from_str(&new_uuid_v7().to_string()).ok()?;
                Some(RequestId::new(value))
            }
        }
    }
}

///
/// Mints a time ordered UUIDv7. Used for request ids.
///
/// # Returns
///
/// A UUID whose leading 48 bits hold the Unix time in milliseconds,
/// followed by sub-millisecond precision and random bits.
///
/// # Examples
///
/// ```
/// use axum_mvc::new_uuid_v7;
///
/// let first = new_uuid_v7();
/// let second = new_uuid_v7();
/// assert_eq!(first.get_version_num(), 7);
/// assert_ne!(first, second);
/// ```
///
pub fn new_uuid_v7() -> Uuid {
    let cx = ContextV7::new().with_additional_precision();
    Uuid::new_v7(Timestamp::now(cx))
}

///
/// Replaces `{{ VAR_NAME }}` placeholders with environment variable values.
///
/// Unset variables become empty strings and are reported with a warning.
///
/// # Arguments
///
/// * `input` - Text containing placeholders, usually a TOML config file
///
/// # Returns
///
/// The input with every placeholder replaced.
///
/// # Pattern Details
///
/// - Names are upper case letters, digits and underscores
/// - Whitespace inside the braces is optional: `{{VAR}}` and `{{ VAR }}`
/// - Lower case names such as `{{ title }}` are left alone, so view
///   templates pass through untouched
///
/// # Examples
///
/// ```
/// use axum_mvc::replace_handlebars_with_env;
///
/// let result = replace_handlebars_with_env("password = \"{{ AXUM_MVC_DOC_UNSET }}\"");
/// assert_eq!(result, "password = \"\"");
///
/// let view = replace_handlebars_with_env("<h1>{{ title }}</h1>");
/// assert_eq!(view, "<h1>{{ title }}</h1>");
/// ```
///
pub fn replace_handlebars_with_env(input: &str) -> String {
    HANDLEBAR_REGEXP
        .replace_all(input, |caps: &Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!(
                    variable = %var_name,
                    "Environment variable not found, substituting with empty string"
                );
                String::new()
            })
        })
        .to_string()
}

///
/// Upper-cases the first character: `index` becomes `Index`.
///
/// Routed controller names are lower camel case; their component keys use
/// the upper case form, e.g. `user` becomes `controllers::User`.
///
/// # Examples
///
/// ```
/// use axum_mvc::ucfirst;
///
/// assert_eq!(ucfirst("user"), "User");
/// assert_eq!(ucfirst("éclair"), "Éclair");
/// assert_eq!(ucfirst(""), "");
/// ```
///
pub fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-cases the first character: `UserProfile` becomes `userProfile`.
///
/// ```
/// use axum_mvc::lcfirst;
///
/// assert_eq!(lcfirst("PageNotFound"), "pageNotFound");
/// ```
pub fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

///
/// Escapes text for safe inclusion in HTML element content and attributes.
///
/// # Arguments
///
/// * `s` - Untrusted text, e.g. an error message or a request parameter
///
/// # Returns
///
/// The text with `&`, `<`, `>`, `"` and `'` replaced by entities.
///
/// # Examples
///
/// ```
/// use axum_mvc::escape_html;
///
/// assert_eq!(
///     escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
///     "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
/// );
/// ```
///
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
