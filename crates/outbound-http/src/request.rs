use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::Full;
use outbound_core::{CallContext, HasCallContext};

/// One outbound HTTP request together with the caller's context.
///
/// Cheap to clone: the body is reference-counted. The URI is parsed when the
/// request is sent, so a malformed URI surfaces as a permanent failure of
/// that call rather than a panic here.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    ctx: CallContext,
}

impl OutboundRequest {
    /// A request with an empty body.
    pub fn new(method: Method, uri: impl Into<String>, ctx: CallContext) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            ctx,
        }
    }

    /// A `GET` request.
    pub fn get(uri: impl Into<String>, ctx: CallContext) -> Self {
        Self::new(Method::GET, uri, ctx)
    }

    /// A `POST` request carrying `body`.
    pub fn post(uri: impl Into<String>, body: impl Into<Bytes>, ctx: CallContext) -> Self {
        Self::new(Method::POST, uri, ctx).with_body(body)
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the context, e.g. with a child carrying a tighter deadline.
    pub fn with_context(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// The method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URI as given.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builds the wire request.
    pub(crate) fn to_http(&self) -> Result<Request<Full<Bytes>>, http::Error> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.uri.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        builder.body(Full::new(self.body.clone()))
    }
}

impl HasCallContext for OutboundRequest {
    fn call_context(&self) -> &CallContext {
        &self.ctx
    }
}

/// A successful response with its body fully read.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// Response status, always below 400.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}
