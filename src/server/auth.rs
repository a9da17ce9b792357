//! Authentication middleware for the server
//!
//! Validates Bearer tokens on /api and /ws requests. WebSocket clients pass
//! the token as a `token` query parameter.

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::Layer;

/// Authentication layer that validates Bearer tokens
#[derive(Clone)]
pub struct AuthLayer {
    token: Arc<String>,
}

impl AuthLayer {
    pub fn new(token: String) -> Self {
        Self {
            token: Arc::new(token),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            token: self.token.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    token: Arc<String>,
}

/// Whether `req` carries `token`, via header or (for /ws) query string
fn is_authorized(req: &Request, token: &str) -> bool {
    let path = req.uri().path();

    if path.starts_with("/ws/") {
        let from_query = req.uri().query().is_some_and(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .any(|(key, value)| key == "token" && value == token)
        });
        if from_query {
            return true;
        }
    }

    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|provided| provided == token)
}

fn requires_auth(req: &Request) -> bool {
    // CORS preflight never carries credentials
    if req.method() == Method::OPTIONS {
        return false;
    }
    let path = req.uri().path();
    path.starts_with("/api/") || path.starts_with("/ws/")
}

impl<S> tower::Service<Request> for AuthMiddleware<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let allowed = !requires_auth(&req) || is_authorized(&req, &self.token);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if allowed {
                return inner.call(req).await;
            }
            log::debug!("Rejected unauthenticated request to {}", req.uri().path());
            Ok((
                StatusCode::UNAUTHORIZED,
                "Unauthorized: Invalid or missing Bearer token",
            )
                .into_response())
        })
    }
}

/// Generate a random 128-bit auth token as hex
pub fn generate_auth_token() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
