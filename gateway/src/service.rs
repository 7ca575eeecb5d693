use crate::cors::{Admission, OriginFilter};
use crate::errors::GatewayError;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS};
use crate::path::normalize_request;
use crate::router::{Route, Router};
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response};
use shared::http::boxed;
use shared::{counter, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Front door of the gateway: path normalization, then origin filtering, then routing.
#[derive(Clone)]
pub struct GatewayService {
    origins: Arc<OriginFilter>,
    router: Router,
}

impl GatewayService {
    pub fn new(origins: OriginFilter, router: Router) -> Self {
        Self {
            origins: Arc::new(origins),
            router,
        }
    }

    pub async fn handle<B>(&self, mut req: Request<B>) -> Response<Bytes>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        normalize_request(&mut req);

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let route = match method {
            Method::OPTIONS => "preflight",
            _ => Route::matching(&method, &path).map_or("unmatched", |r| r.name()),
        };

        let admission = self.origins.admit(req.headers());
        if let Admission::Rejected(origin) = &admission {
            tracing::debug!(%origin, %path, "Origin not allowed, omitting CORS headers");
        }

        // Preflights end here on every path, matched or not.
        let response = match method {
            Method::OPTIONS => self.origins.preflight_response(&admission),
            _ => {
                let mut response = self.router.route(req).await;
                self.origins.apply(&admission, response.headers_mut(), false);
                response
            }
        };

        let status = response.status();
        let elapsed = started.elapsed();
        counter!(REQUESTS, "route" => route, "status" => status.as_str().to_string()).increment(1);
        histogram!(REQUEST_DURATION, "route" => route).record(elapsed.as_secs_f64());
        tracing::info!(
            %method,
            %path,
            status = status.as_u16(),
            latency_ms = elapsed.as_millis() as u64,
            "Handled request"
        );

        response
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<BoxBody<Bytes, GatewayError>>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await.map(boxed)) })
    }
}
