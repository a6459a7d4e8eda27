//! Incoming HTTP request type.

use bytes::Bytes;
use http::header::{COOKIE, HeaderMap};
use http::{Method, Uri};

/// An incoming HTTP request with its body fully buffered.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self { method, uri, headers, body }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the value of the first cookie called `name`, across every
    /// `Cookie` header on the request.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }
}

#[cfg(test)]
pub(crate) fn test_request(method: Method, uri: &str, headers: &[(&str, &str)]) -> Request {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        map.append(
            http::header::HeaderName::try_from(*k).unwrap(),
            http::header::HeaderValue::try_from(*v).unwrap(),
        );
    }
    Request::new(method, uri.parse().unwrap(), map, Bytes::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_across_headers() {
        let req = test_request(
            Method::GET,
            "/x?a=1",
            &[("cookie", "a=1; b=2"), ("cookie", "token=\"abc\"")],
        );
        assert_eq!(req.cookie("b"), Some("2"));
        assert_eq!(req.cookie("token"), Some("abc"));
        assert_eq!(req.cookie("missing"), None);
        assert_eq!(req.query(), Some("a=1"));
        assert_eq!(req.path(), "/x");
    }
}
