use crate::config::UpstreamConfig;
use crate::metrics_defs::{UPSTREAM_ATTEMPTS, UPSTREAM_DURATION};
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{StatusCode, Version};
use serde_json::Value;
use shared::http::add_via_header;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Paths tried in order when no explicit recommend path is configured.
pub const DEFAULT_CANDIDATE_PATHS: [&str; 6] = [
    "/api/recommend",
    "/recommend",
    "/api/predict",
    "/predict",
    "/api/recommendations",
    "/recommendations",
];

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    /// The upstream answered with a non-404 error; the search stopped there.
    #[error("upstream {url} returned {status}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
        tried: Vec<String>,
    },
    /// Every candidate answered 404 (or could not be reached).
    #[error("no matching upstream path")]
    Exhausted { tried: Vec<String> },
    /// No candidate produced an HTTP response at all.
    #[error("upstream unreachable: {last_error}")]
    Unreachable {
        tried: Vec<String>,
        last_error: String,
    },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Status { status, .. } => *status,
            DispatchError::Exhausted { .. } => StatusCode::NOT_FOUND,
            DispatchError::Unreachable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn tried(&self) -> &[String] {
        match self {
            DispatchError::Status { tried, .. }
            | DispatchError::Exhausted { tried }
            | DispatchError::Unreachable { tried, .. } => tried,
        }
    }
}

#[derive(Debug)]
pub struct Dispatched {
    /// Parsed JSON, or the raw text as a JSON string when the body was not JSON
    pub payload: Value,
    pub url: String,
    pub tried: Vec<String>,
}

/// Outcome of a single POST against one candidate url.
enum Attempt {
    Success(Value),
    NotFound,
    Failed(StatusCode, String),
    Transport(String),
}

impl Attempt {
    fn label(&self) -> &'static str {
        match self {
            Attempt::Success(_) => "success",
            Attempt::NotFound => "not_found",
            Attempt::Failed(..) => "failed",
            Attempt::Transport(_) => "transport_error",
        }
    }
}

/// Relays recommend requests to the prediction service, searching the
/// candidate paths until one exists.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    base_url: Arc<str>,
    candidates: Arc<[String]>,
    explicit: bool,
}

impl Dispatcher {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let (candidates, explicit) = match config.explicit_path() {
            Some(path) => (vec![path], true),
            None => (
                DEFAULT_CANDIDATE_PATHS.iter().map(|p| p.to_string()).collect(),
                false,
            ),
        };

        Ok(Self {
            client,
            base_url: config.normalized_base_url().into(),
            candidates: candidates.into(),
            explicit,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The configured path, if the candidate search is disabled.
    pub fn explicit_path(&self) -> Option<&str> {
        match self.explicit {
            true => self.candidates.first().map(String::as_str),
            false => None,
        }
    }

    /// POSTs `body` (or `{}`) to each candidate in order.
    ///
    /// A 404 or a transport error moves on to the next candidate. Any other
    /// non-success status ends the search and is returned as is.
    pub async fn dispatch(&self, body: Option<&Value>) -> Result<Dispatched, DispatchError> {
        let empty = Value::Object(Default::default());
        let request_body =
            serde_json::to_vec(body.unwrap_or(&empty)).unwrap_or_else(|_| b"{}".to_vec());

        let mut tried = Vec::with_capacity(self.candidates.len());
        let mut answered = false;
        let mut last_error = String::new();

        for path in self.candidates.iter() {
            let url = format!("{}{}", self.base_url, path);
            tried.push(url.clone());

            let started = Instant::now();
            let attempt = self.attempt(&url, request_body.clone()).await;
            histogram!(UPSTREAM_DURATION, "outcome" => attempt.label())
                .record(started.elapsed().as_secs_f64());
            counter!(UPSTREAM_ATTEMPTS, "outcome" => attempt.label()).increment(1);

            match attempt {
                Attempt::Success(payload) => {
                    tracing::debug!(%url, "Upstream answered");
                    return Ok(Dispatched {
                        payload,
                        url,
                        tried,
                    });
                }
                Attempt::NotFound => {
                    tracing::debug!(%url, "Upstream path not found, trying next candidate");
                    answered = true;
                }
                Attempt::Failed(status, body) => {
                    return Err(DispatchError::Status {
                        url,
                        status,
                        body,
                        tried,
                    });
                }
                Attempt::Transport(error) => {
                    tracing::warn!(%url, %error, "Could not reach upstream, trying next candidate");
                    last_error = error;
                }
            }
        }

        match answered {
            true => Err(DispatchError::Exhausted { tried }),
            false => Err(DispatchError::Unreachable { tried, last_error }),
        }
    }

    async fn attempt(&self, url: &str, body: Vec<u8>) -> Attempt {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        add_via_header(&mut headers, Version::HTTP_11);

        let response = match self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Transport(e.to_string()),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Attempt::Transport(e.to_string()),
        };

        if status.is_success() {
            let payload = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Attempt::Success(payload);
        }

        match status {
            StatusCode::NOT_FOUND => Attempt::NotFound,
            status => Attempt::Failed(status, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockResponse, start_mock_upstream};
    use serde_json::json;

    fn dispatcher(base_url: &str, recommend_path: Option<&str>) -> Dispatcher {
        Dispatcher::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            recommend_path: recommend_path.map(String::from),
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[test]
    fn test_candidates() {
        let d = dispatcher("http://127.0.0.1:1/", None);
        assert_eq!(d.base_url(), "http://127.0.0.1:1");
        assert_eq!(d.candidates(), DEFAULT_CANDIDATE_PATHS);
        assert_eq!(d.explicit_path(), None);

        let d = dispatcher("http://127.0.0.1:1", Some("predict"));
        assert_eq!(d.candidates(), ["/predict"]);
        assert_eq!(d.explicit_path(), Some("/predict"));
    }

    #[tokio::test]
    async fn test_falls_through_404s() {
        let upstream = start_mock_upstream(vec![
            ("/api/recommend", MockResponse::new(404, "missing")),
            ("/recommend", MockResponse::new(404, "missing")),
            ("/api/predict", MockResponse::new(200, r#"{"score":1}"#)),
        ])
        .await;

        let body = json!({"age": 30});
        let result = dispatcher(&upstream.base_url, None)
            .dispatch(Some(&body))
            .await
            .unwrap();

        assert_eq!(result.payload, json!({"score": 1}));
        assert_eq!(result.url, format!("{}/api/predict", upstream.base_url));
        assert_eq!(result.tried.len(), 3);
        assert_eq!(
            upstream.hits(),
            vec!["/api/recommend", "/recommend", "/api/predict"]
        );
        assert_eq!(upstream.last_body(), Some(json!({"age": 30})));
    }

    #[tokio::test]
    async fn test_stops_on_server_error() {
        let upstream = start_mock_upstream(vec![
            ("/api/recommend", MockResponse::new(500, "boom")),
            ("/recommend", MockResponse::new(200, "{}")),
        ])
        .await;

        let err = dispatcher(&upstream.base_url, None)
            .dispatch(None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.tried().len(), 1);
        assert!(matches!(&err, DispatchError::Status { body, .. } if body == "boom"));
        assert_eq!(upstream.hits(), vec!["/api/recommend"]);
        // no body means an empty object
        assert_eq!(upstream.last_body(), Some(json!({})));
    }

    #[tokio::test]
    async fn test_raw_text_payload() {
        let upstream =
            start_mock_upstream(vec![("/api/recommend", MockResponse::new(200, "plain text"))])
                .await;

        let result = dispatcher(&upstream.base_url, None)
            .dispatch(None)
            .await
            .unwrap();
        assert_eq!(result.payload, json!("plain text"));
    }

    #[tokio::test]
    async fn test_exhausted() {
        // unrouted paths answer 404
        let upstream = start_mock_upstream(vec![]).await;

        let err = dispatcher(&upstream.base_url, None)
            .dispatch(None)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Exhausted { .. }));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let expected: Vec<String> = DEFAULT_CANDIDATE_PATHS
            .iter()
            .map(|p| format!("{}{}", upstream.base_url, p))
            .collect();
        assert_eq!(err.tried(), expected);
    }

    #[tokio::test]
    async fn test_explicit_path_only() {
        let upstream = start_mock_upstream(vec![
            ("/api/recommend", MockResponse::new(200, r#"{"wrong":true}"#)),
            ("/v2/predict", MockResponse::new(201, r#"{"right":true}"#)),
        ])
        .await;

        let result = dispatcher(&upstream.base_url, Some("/v2/predict"))
            .dispatch(None)
            .await
            .unwrap();
        assert_eq!(result.payload, json!({"right": true}));
        assert_eq!(upstream.hits(), vec!["/v2/predict"]);
    }

    #[tokio::test]
    async fn test_slow_candidate_times_out_and_continues() {
        let upstream = start_mock_upstream(vec![
            (
                "/api/recommend",
                MockResponse::new(200, r#"{"from":"slow"}"#).with_delay(Duration::from_secs(5)),
            ),
            ("/recommend", MockResponse::new(200, r#"{"from":"fast"}"#)),
        ])
        .await;

        let dispatcher = Dispatcher::new(&UpstreamConfig {
            base_url: upstream.base_url.clone(),
            recommend_path: None,
            timeout_secs: 1,
        })
        .unwrap();

        let started = Instant::now();
        let result = dispatcher.dispatch(None).await.unwrap();

        assert_eq!(result.payload, json!({"from": "fast"}));
        assert_eq!(result.url, format!("{}/recommend", upstream.base_url));
        assert_eq!(result.tried.len(), 2);
        assert_eq!(upstream.hits(), vec!["/api/recommend", "/recommend"]);
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_unreachable() {
        // nothing listens on port 1
        let err = dispatcher("http://127.0.0.1:1", None)
            .dispatch(None)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Unreachable { .. }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.tried().len(), DEFAULT_CANDIDATE_PATHS.len());
    }
}
