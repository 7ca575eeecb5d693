// Origin allow-list filtering for browser clients.
//
// Requests without an Origin header (curl, health probes, server-to-server
// calls) are always admitted. Requests from an origin outside the allow-list
// are still served, but without any CORS headers, so the browser blocks the
// response on its side.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, HeaderMap, HeaderValue, ORIGIN, VARY,
};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::collections::HashSet;

const ALLOWED_METHODS: &str = "GET,HEAD,POST,PUT,PATCH,DELETE,OPTIONS";
const ALLOWED_HEADERS: &str = "Origin,X-Requested-With,Content-Type,Accept,Authorization";
const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

/// Trims, strips trailing slashes and lowercases an origin.
pub fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// No Origin header was sent
    NoOrigin,
    /// The origin is in the allow-list; holds the value to echo back
    Allowed(HeaderValue),
    /// The origin is not in the allow-list
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct OriginFilter {
    // insertion order, for reporting
    origins: Vec<String>,
    lookup: HashSet<String>,
}

impl OriginFilter {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lookup = HashSet::new();
        let origins = origins
            .into_iter()
            .map(|o| normalize_origin(o.as_ref()))
            .filter(|o| !o.is_empty())
            .filter(|o| lookup.insert(o.clone()))
            .collect();

        Self { origins, lookup }
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.origins
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.lookup.contains(&normalize_origin(origin))
    }

    pub fn admit(&self, headers: &HeaderMap) -> Admission {
        let Some(value) = headers.get(ORIGIN) else {
            return Admission::NoOrigin;
        };

        match value.to_str() {
            Ok(origin) if self.is_allowed(origin) => Admission::Allowed(value.clone()),
            Ok(origin) => Admission::Rejected(origin.to_string()),
            Err(_) => Admission::Rejected(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        }
    }

    /// Adds the CORS headers for an admitted request. Rejected origins get none.
    ///
    /// Without an Origin header there is nothing to echo, so only
    /// `Access-Control-Allow-Origin` is left out.
    pub fn apply(&self, admission: &Admission, headers: &mut HeaderMap, preflight: bool) {
        match admission {
            Admission::Rejected(_) => return,
            Admission::Allowed(origin) => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            }
            Admission::NoOrigin => {}
        }
        headers.append(VARY, HeaderValue::from_static("Origin"));

        if preflight {
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOWED_HEADERS),
            );
            headers.insert(
                ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
            );
        }
    }

    /// Terminal answer to an OPTIONS request on any path.
    pub fn preflight_response(&self, admission: &Admission) -> Response<Bytes> {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = StatusCode::NO_CONTENT;
        self.apply(admission, response.headers_mut(), true);
        response
    }
}
