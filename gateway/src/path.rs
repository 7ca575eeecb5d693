use http::uri::{PathAndQuery, Uri};
use hyper::Request;
use std::borrow::Cow;

/// Collapses every run of two or more `/` into a single one.
pub fn collapse_slashes(path: &str) -> Cow<'_, str> {
    if !path.contains("//") {
        return Cow::Borrowed(path);
    }

    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    Cow::Owned(out)
}

/// Rewrites the request path in place before routing. The query string is left as is.
pub fn normalize_request<B>(req: &mut Request<B>) {
    let Some(rewritten) = normalized_uri(req.uri()) else {
        return;
    };
    *req.uri_mut() = rewritten;
}

fn normalized_uri(uri: &Uri) -> Option<Uri> {
    let Cow::Owned(path) = collapse_slashes(uri.path()) else {
        return None;
    };

    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_slashes() {
        assert_eq!(collapse_slashes("/api/health"), "/api/health");
        assert!(matches!(collapse_slashes("/api/health"), Cow::Borrowed(_)));
        assert_eq!(collapse_slashes("//api//health"), "/api/health");
        assert_eq!(collapse_slashes("///api////saved-workouts//"), "/api/saved-workouts/");
        assert_eq!(collapse_slashes("/"), "/");
    }

    #[test]
    fn test_normalize_request() {
        let mut req = Request::builder()
            .uri("//api//saved-workouts///42?x=a//b")
            .body(())
            .unwrap();
        normalize_request(&mut req);
        assert_eq!(req.uri().path(), "/api/saved-workouts/42");
        assert_eq!(req.uri().query(), Some("x=a//b"));

        let mut req = Request::builder()
            .uri("http://example.com//api//health")
            .body(())
            .unwrap();
        normalize_request(&mut req);
        assert_eq!(req.uri().to_string(), "http://example.com/api/health");

        let mut req = Request::builder().uri("/api/health").body(()).unwrap();
        normalize_request(&mut req);
        assert_eq!(req.uri().path(), "/api/health");
    }
}
