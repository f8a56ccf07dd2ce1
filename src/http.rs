//! Tower middleware that applies a [`Limiter`] to HTTP requests.
//!
//! For every request the layer:
//!
//! 1. derives an identifier with the key function; on failure the error handler
//!    builds the response and the inner service is skipped,
//! 2. counts the request with [`Limiter::record_request`]; a store failure is
//!    answered with `500 Internal Server Error`,
//! 3. sets `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
//!    (seconds until the window resets),
//! 4. answers `429 Too Many Requests` when the limit is reached, otherwise calls
//!    the inner service.
//!
//! # Examples
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{Router, body::Body, routing::get};
//! use http::{Request, Response, StatusCode};
//! use ratewatch::http::RateLimitLayer;
//!
//! let layer = RateLimitLayer::new(
//!     Arc::new(limiter),
//!     |req: &Request<Body>| {
//!         req.headers()
//!             .get("x-api-key")
//!             .and_then(|v| v.to_str().ok())
//!             .map(str::to_string)
//!             .ok_or("missing api key")
//!     },
//!     |_err: &str| {
//!         let mut res = Response::new(Body::empty());
//!         *res.status_mut() = StatusCode::UNAUTHORIZED;
//!         res
//!     },
//! );
//!
//! let app: Router = Router::new().route("/", get(|| async { "ok" })).layer(layer);
//! ```

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use tower::{Layer, Service};

use crate::{CounterStore, LimitRecord, Limiter};

/// `X-RateLimit-Limit`
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
/// `X-RateLimit-Remaining`
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// `X-RateLimit-Reset`
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Write the rate limit headers for `record` into `headers`.
pub fn apply_headers(record: &LimitRecord, headers: &mut HeaderMap) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(record.limit()));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(record.remaining()));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(record.seconds_remaining()));
}

fn status_response<B: Default>(status: StatusCode) -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = status;
    response
}

/// [`Layer`] wrapping services with [`RateLimitService`].
pub struct RateLimitLayer<S, K, H> {
    limiter: Arc<Limiter<S>>,
    key_fn: K,
    on_key_error: H,
}

impl<S, K, H> RateLimitLayer<S, K, H> {
    /// Create a new layer.
    ///
    /// `key_fn` derives the identifier from a request; when it fails,
    /// `on_key_error` produces the response.
    pub fn new(limiter: Arc<Limiter<S>>, key_fn: K, on_key_error: H) -> Self {
        Self {
            limiter,
            key_fn,
            on_key_error,
        }
    }
}

impl<S, K: Clone, H: Clone> Clone for RateLimitLayer<S, K, H> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            key_fn: self.key_fn.clone(),
            on_key_error: self.on_key_error.clone(),
        }
    }
}

impl<I, S, K: Clone, H: Clone> Layer<I> for RateLimitLayer<S, K, H> {
    type Service = RateLimitService<I, S, K, H>;

    fn layer(&self, inner: I) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            key_fn: self.key_fn.clone(),
            on_key_error: self.on_key_error.clone(),
        }
    }
}

/// Middleware service produced by [`RateLimitLayer`].
pub struct RateLimitService<I, S, K, H> {
    inner: I,
    limiter: Arc<Limiter<S>>,
    key_fn: K,
    on_key_error: H,
}

impl<I: Clone, S, K: Clone, H: Clone> Clone for RateLimitService<I, S, K, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            key_fn: self.key_fn.clone(),
            on_key_error: self.on_key_error.clone(),
        }
    }
}

impl<I, S, K, H, E, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<I, S, K, H>
where
    I: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    I::Future: Send + 'static,
    S: CounterStore + 'static,
    K: Fn(&Request<ReqBody>) -> Result<String, E>,
    H: Fn(E) -> Response<ResBody>,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = I::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let key = match (self.key_fn)(&request) {
            Ok(key) => key,
            Err(err) => {
                let response = (self.on_key_error)(err);
                return Box::pin(async move { Ok(response) });
            }
        };

        // The ready service goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = self.limiter.clone();

        Box::pin(async move {
            let record = match limiter.record_request(&key).await {
                Ok(record) => record,
                Err(err) => {
                    tracing::error!(error = %err, key = %key, "rate limiter store failure");
                    return Ok(status_response(StatusCode::INTERNAL_SERVER_ERROR));
                }
            };

            if record.is_limit_reached() {
                let mut response = status_response(StatusCode::TOO_MANY_REQUESTS);
                apply_headers(&record, response.headers_mut());
                return Ok(response);
            }

            let mut response = inner.call(request).await?;
            apply_headers(&record, response.headers_mut());

            Ok(response)
        })
    }
}
