use {
    crate::Result,
    axum::{
        body::Bytes,
        http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version, header, request::Parts},
    },
    std::{collections::BTreeMap, net::SocketAddr},
    tower_sessions::cookie::Cookie,
    url::form_urlencoded,
};

///
/// The inbound request: read-only HTTP data plus the routing result the
/// front controller records on it.
///
/// ```
/// use axum::http::Method;
/// use axum_mvc::http::Request;
///
/// let request = Request::new(Method::POST, "/posts?page=2").unwrap()
///     .with_header("content-type", "application/x-www-form-urlencoded").unwrap()
///     .with_body("title=Hello+world");
///
/// assert!(request.is_post());
/// assert_eq!(request.url(), "/posts");
/// assert_eq!(request.get("page"), Some("2"));
/// assert_eq!(request.post("title"), Some("Hello world"));
/// assert_eq!(request.server("QUERY_STRING").as_deref(), Some("page=2"));
/// ```
///
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    query: BTreeMap<String, String>,
    post: BTreeMap<String, String>,
    url: String,
    controller: String,
    action: String,
    params: BTreeMap<String, String>,
}

fn parse_form(input: &[u8]) -> BTreeMap<String, String> {
    form_urlencoded::parse(input).into_owned().collect()
}

impl Request {
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri: Uri = uri
            .parse()
            .map_err(|e| crate::Error::invalid_input(format!("Invalid request uri {}: {}", uri, e)))?;
        Ok(Self::from_parts_inner(
            method,
            uri,
            Version::HTTP_11,
            HeaderMap::new(),
            Bytes::new(),
            None,
        ))
    }

    /// Builds the request from what axum hands to a handler.
    pub fn from_parts(parts: Parts, body: Bytes, remote_addr: Option<SocketAddr>) -> Self {
        Self::from_parts_inner(
            parts.method,
            parts.uri,
            parts.version,
            parts.headers,
            body,
            remote_addr,
        )
    }

    fn from_parts_inner(
        method: Method,
        uri: Uri,
        version: Version,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let query = uri
            .query()
            .map(|q| parse_form(q.as_bytes()))
            .unwrap_or_default();
        let url = uri.path().to_string();

        let mut request = Self {
            method,
            uri,
            version,
            headers,
            body,
            remote_addr,
            query,
            post: BTreeMap::new(),
            url,
            controller: String::new(),
            action: String::new(),
            params: BTreeMap::new(),
        };
        request.parse_post();
        request
    }

    fn parse_post(&mut self) {
        let is_form = self
            .header(header::CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        self.post = if is_form {
            parse_form(&self.body)
        } else {
            BTreeMap::new()
        };
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.headers
            .append(HeaderName::try_from(name)?, HeaderValue::from_str(value)?);
        self.parse_post();
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.parse_post();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of the header, when it is valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the first request cookie called `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// A query string parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// A field of an `application/x-www-form-urlencoded` body.
    pub fn post(&self, name: &str) -> Option<&str> {
        self.post.get(name).map(String::as_str)
    }

    pub fn post_params(&self) -> &BTreeMap<String, String> {
        &self.post
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    pub fn is_put(&self) -> bool {
        self.method == Method::PUT
    }

    pub fn is_delete(&self) -> bool {
        self.method == Method::DELETE
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    pub fn is_options(&self) -> bool {
        self.method == Method::OPTIONS
    }

    /// `X-Requested-With: XMLHttpRequest`, in any case.
    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    ///
    /// CGI style server facts: `REQUEST_METHOD`, `REQUEST_URI`,
    /// `QUERY_STRING`, `SERVER_PROTOCOL`, `SERVER_NAME`, `REMOTE_ADDR`,
    /// `REMOTE_PORT` and `HTTP_<HEADER>` for any request header.
    ///
    pub fn server(&self, key: &str) -> Option<String> {
        match key {
            "REQUEST_METHOD" => Some(self.method.to_string()),
            "REQUEST_URI" => self.uri.path_and_query().map(|pq| pq.to_string()),
            "QUERY_STRING" => Some(self.uri.query().unwrap_or_default().to_string()),
            "SERVER_PROTOCOL" => Some(format!("{:?}", self.version)),
            "SERVER_NAME" => self
                .uri
                .host()
                .or_else(|| self.header("host").map(|h| h.split(':').next().unwrap_or(h)))
                .map(str::to_string),
            "REMOTE_ADDR" => self.remote_addr.map(|a| a.ip().to_string()),
            "REMOTE_PORT" => self.remote_addr.map(|a| a.port().to_string()),
            other => other.strip_prefix("HTTP_").and_then(|name| {
                let name = name.to_ascii_lowercase().replace('_', "-");
                self.header(&name).map(str::to_string)
            }),
        }
    }

    /// A process environment variable.
    pub fn env(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    /// The string matched against the routes: the request path.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn set_controller(&mut self, controller: impl Into<String>) {
        self.controller = controller.into();
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn set_action(&mut self, action: impl Into<String>) {
        self.action = action.into();
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn set_params(&mut self, params: BTreeMap<String, String>) {
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_from_parts() {
        let (parts, _) = axum::http::Request::builder()
            .method(Method::PUT)
            .uri("http://example.org:8080/a/b?x=1&y=%20z")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("cookie", "theme=dark; XENSESSID=abc")
            .body(())
            .unwrap()
            .into_parts();
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let request = Request::from_parts(parts, Bytes::from_static(b"raw"), Some(addr));

        assert!(request.is_put());
        assert!(!request.is_get());
        assert!(request.is_ajax());
        assert_eq!(request.url(), "/a/b");
        assert_eq!(request.get("y"), Some(" z"));
        assert_eq!(request.cookie("XENSESSID").as_deref(), Some("abc"));
        assert_eq!(request.cookie("missing"), None);
        assert!(request.post_params().is_empty());
        assert_eq!(request.body().as_ref(), b"raw");

        assert_eq!(request.server("REQUEST_METHOD").as_deref(), Some("PUT"));
        assert_eq!(request.server("REQUEST_URI").as_deref(), Some("/a/b?x=1&y=%20z"));
        assert_eq!(request.server("SERVER_NAME").as_deref(), Some("example.org"));
        assert_eq!(request.server("SERVER_PROTOCOL").as_deref(), Some("HTTP/1.1"));
        assert_eq!(request.server("REMOTE_ADDR").as_deref(), Some("10.0.0.1"));
        assert_eq!(
            request.server("HTTP_X_REQUESTED_WITH").as_deref(),
            Some("XMLHttpRequest")
        );
        assert_eq!(request.server("NOPE"), None);
    }

    #[test]
    fn test_routing_metadata() {
        let mut request = Request::new(Method::GET, "/users/7").unwrap();
        request.set_controller("user");
        request.set_action("show");
        request.set_params(BTreeMap::from([("id".to_string(), "7".to_string())]));
        assert_eq!(request.controller(), "user");
        assert_eq!(request.action(), "show");
        assert_eq!(request.params()["id"], "7");
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(
            Request::new(Method::GET, "not a uri").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        let request = Request::new(Method::GET, "/").unwrap();
        assert!(request.with_header("bad header", "x").is_err());
    }
}
