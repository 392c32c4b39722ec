use {
    crate::Result,
    axum::{
        body::Body,
        http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    },
};

const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

///
/// The response being assembled for the current request.
///
/// The status stays unset until an action or the front controller sets it.
/// [`send`](Self::send) consumes the response, so it can only happen once.
///
/// ```
/// use axum::http::StatusCode;
/// use axum_mvc::http::Response;
///
/// let mut response = Response::default();
/// assert_eq!(response.status(), None);
/// response.set_content("<h1>Hi</h1>");
///
/// let sent = response.send();
/// assert_eq!(sent.status(), StatusCode::OK);
/// assert_eq!(sent.headers()["content-type"], "text/html; charset=utf-8");
/// ```
///
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    content: String,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sets a header, replacing previous values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers
            .insert(HeaderName::try_from(name)?, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Adds a header value, keeping previous ones (`set-cookie`).
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers
            .append(HeaderName::try_from(name)?, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Drops every header set so far; the status is kept.
    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Converts into the HTTP response. A missing status means `200 OK`.
    pub fn send(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(Body::from(self.content));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);

        let headers = response.headers_mut();
        headers.extend(self.headers);
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send() {
        let mut response = Response::new();
        response.set_status(StatusCode::NOT_FOUND);
        response.set_header("content-type", "text/plain").unwrap();
        response.append_header("set-cookie", "a=1").unwrap();
        response.append_header("set-cookie", "b=2").unwrap();
        response.set_content("missing");

        let sent = response.send();
        assert_eq!(sent.status(), StatusCode::NOT_FOUND);
        assert_eq!(sent.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(sent.headers().get_all(header::SET_COOKIE).iter().count(), 2);

        let body = axum::body::to_bytes(sent.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"missing");
    }

    #[test]
    fn test_clear_headers_keeps_status() {
        let mut response = Response::new();
        response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.set_header("content-type", "application/json").unwrap();
        response.append_header("x-trace", "1").unwrap();

        response.clear_headers();
        assert!(response.headers().is_empty());
        assert_eq!(response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));

        let sent = response.send();
        assert_eq!(sent.headers()[header::CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_invalid_header() {
        let mut response = Response::new();
        assert!(response.set_header("x-bad", "line\nbreak").is_err());
        assert!(response.headers().is_empty());
    }
}
