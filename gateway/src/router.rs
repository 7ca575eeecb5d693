use crate::errors::{GatewayError, Result};
use crate::metrics_defs::RECORDS_SAVED;
use crate::store::{Fields, RecordStore, missing_fields};
use crate::upstream::{DispatchError, Dispatcher};
use chrono::{SecondsFormat, Utc};
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use shared::counter;
use shared::http::make_json_response;
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The gateway's routes, matched on method and normalized path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route<'a> {
    Recommend,
    Save,
    ListWorkouts,
    GetWorkout(&'a str),
    Health,
}

impl<'a> Route<'a> {
    pub fn matching(method: &Method, path: &'a str) -> Option<Self> {
        // "/api/health/" routes like "/api/health"
        let path = match path.len() > 1 {
            true => path.strip_suffix('/').unwrap_or(path),
            false => path,
        };

        match (method, path) {
            (&Method::POST, "/api/recommend") => Some(Route::Recommend),
            (&Method::POST, "/api/save") => Some(Route::Save),
            (&Method::GET, "/api/saved-workouts") => Some(Route::ListWorkouts),
            (&Method::GET, "/api/health") => Some(Route::Health),
            (&Method::GET, path) => path
                .strip_prefix("/api/saved-workouts/")
                .filter(|id| !id.is_empty() && !id.contains('/'))
                .map(Route::GetWorkout),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::Recommend => "recommend",
            Route::Save => "save",
            Route::ListWorkouts => "saved_workouts",
            Route::GetWorkout(_) => "saved_workout",
            Route::Health => "health",
        }
    }
}

#[derive(Serialize)]
struct Health<'a> {
    ok: bool,
    proxy: &'static str,
    python_api: &'a str,
    recommend_path: &'a str,
    allowed_origins: &'a [String],
    time: String,
}

/// Dispatches matched requests to their handlers and renders every outcome,
/// including errors, as a JSON response.
#[derive(Clone)]
pub struct Router {
    dispatcher: Dispatcher,
    store: RecordStore,
    allowed_origins: Arc<[String]>,
    max_body_bytes: usize,
}

impl Router {
    pub fn new(
        dispatcher: Dispatcher,
        store: RecordStore,
        allowed_origins: Vec<String>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            dispatcher,
            store,
            allowed_origins: allowed_origins.into(),
            max_body_bytes,
        }
    }

    pub async fn route<B>(&self, req: Request<B>) -> Response<Bytes>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let path = req.uri().path().to_string();
        let result = match Route::matching(req.method(), &path) {
            Some(route) => {
                tracing::debug!(route = route.name(), "Matched route");
                self.handle(route, req).await
            }
            None => {
                tracing::debug!(method = %req.method(), %path, "No route matched");
                Err(GatewayError::NotFound)
            }
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                if e.status().is_server_error() {
                    tracing::error!(%path, error = %e, "Request failed");
                }
                e.into_response()
            }
        }
    }

    async fn handle<B>(&self, route: Route<'_>, req: Request<B>) -> Result<Response<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        match route {
            Route::Recommend => {
                let body = self.read_body(req).await?;
                self.recommend(body).await
            }
            Route::Save => {
                let body = self.read_body(req).await?;
                self.save(body)
            }
            Route::ListWorkouts => Ok(make_json_response(
                StatusCode::OK,
                &json!({"success": true, "data": self.store.all()}),
            )?),
            Route::GetWorkout(id) => {
                let record = self.store.find_by_id(id).ok_or(GatewayError::NotFound)?;
                Ok(make_json_response(
                    StatusCode::OK,
                    &json!({"success": true, "data": record}),
                )?)
            }
            Route::Health => self.health(),
        }
    }

    async fn recommend(&self, body: Option<Value>) -> Result<Response<Bytes>> {
        match self.dispatcher.dispatch(body.as_ref()).await {
            Ok(dispatched) => {
                tracing::debug!(url = %dispatched.url, "Recommendation relayed");
                Ok(make_json_response(StatusCode::OK, &dispatched.payload)?)
            }
            Err(e) => {
                match &e {
                    DispatchError::Status { status, body, .. } => {
                        tracing::error!(%status, %body, tried = ?e.tried(), "Upstream failed")
                    }
                    _ => tracing::error!(error = %e, tried = ?e.tried(), "Upstream not found"),
                }
                Err(e.into())
            }
        }
    }

    fn save(&self, body: Option<Value>) -> Result<Response<Bytes>> {
        let fields = match body {
            Some(Value::Object(fields)) => fields,
            None => Fields::new(),
            Some(_) => {
                return Err(GatewayError::Validation(
                    "Request body must be a JSON object".to_string(),
                ));
            }
        };

        let missing = missing_fields(&fields);
        if !missing.is_empty() {
            return Err(GatewayError::Validation(format!(
                "Incomplete data: {}",
                missing.join(", ")
            )));
        }

        let record = self.store.insert_unique(fields)?;
        counter!(RECORDS_SAVED).increment(1);
        tracing::info!(id = %record.id, "Workout record saved");

        Ok(make_json_response(
            StatusCode::CREATED,
            &json!({"success": true, "message": "Saved", "data": {"id": record.id}}),
        )?)
    }

    fn health(&self) -> Result<Response<Bytes>> {
        let health = Health {
            ok: true,
            proxy: "up",
            python_api: self.dispatcher.base_url(),
            recommend_path: self.dispatcher.explicit_path().unwrap_or("(auto-fallback)"),
            allowed_origins: &self.allowed_origins,
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        Ok(make_json_response(StatusCode::OK, &health)?)
    }

    /// Reads the request body as JSON, or as a flat object for url-encoded
    /// forms. An empty body reads as `None`.
    async fn read_body<B>(&self, req: Request<B>) -> Result<Option<Value>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

        let bytes = match Limited::new(req.into_body(), self.max_body_bytes)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return Err(GatewayError::PayloadTooLarge(self.max_body_bytes));
            }
            Err(e) => return Err(GatewayError::RequestBodyError(e.to_string())),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        if is_form {
            let fields: Fields = url::form_urlencoded::parse(&bytes)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
            return Ok(Some(Value::Object(fields)));
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| GatewayError::Validation(format!("Invalid JSON body: {e}")))
    }
}
