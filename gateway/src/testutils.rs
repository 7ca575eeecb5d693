use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct MockResponse {
    status: StatusCode,
    body: &'static str,
    delay: Option<Duration>,
}

impl MockResponse {
    pub fn new(status: u16, body: &'static str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            delay: None,
        }
    }

    /// Holds the response back for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct Recorded {
    paths: Vec<String>,
    last_body: Option<Value>,
}

/// A prediction service stand-in. Paths without a canned response answer 404.
pub struct MockUpstream {
    pub base_url: String,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockUpstream {
    /// Paths hit so far, in order.
    pub fn hits(&self) -> Vec<String> {
        self.recorded.lock().unwrap().paths.clone()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.recorded.lock().unwrap().last_body.clone()
    }
}

pub async fn start_mock_upstream(routes: Vec<(&'static str, MockResponse)>) -> MockUpstream {
    let routes: Arc<HashMap<&'static str, MockResponse>> = Arc::new(routes.into_iter().collect());
    let recorded = Arc::new(Mutex::new(Recorded::default()));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();

    let server_recorded = recorded.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let routes = routes.clone();
            let recorded = server_recorded.clone();

            tokio::spawn(async move {
                let handler = service_fn(move |req: Request<Incoming>| {
                    let routes = routes.clone();
                    let recorded = recorded.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        {
                            let mut recorded = recorded.lock().unwrap();
                            recorded.paths.push(path.clone());
                            recorded.last_body = serde_json::from_slice(&body).ok();
                        }

                        let mock = routes
                            .get(path.as_str())
                            .cloned()
                            .unwrap_or_else(|| MockResponse::new(404, "Not Found"));
                        if let Some(delay) = mock.delay {
                            tokio::time::sleep(delay).await;
                        }
                        let mut response = Response::new(Full::new(Bytes::from(mock.body)));
                        *response.status_mut() = mock.status;
                        Ok::<_, Infallible>(response)
                    }
                });

                if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, handler)
                    .await
                {
                    eprintln!("Error serving connection: {:?}", err);
                }
            });
        }
    });

    MockUpstream {
        base_url: format!("http://127.0.0.1:{port}"),
        recorded,
    }
}
