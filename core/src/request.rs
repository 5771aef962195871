use std::mem;

use http::header::{AsHeaderName, HeaderName};
use http::request::Parts;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, HeaderValue, Method, Uri};

use crate::{Error, Result};

/// A request taken apart for signing.
///
/// [`SigningRequest::build`] moves the uri and headers out of the request
/// parts; [`SigningRequest::apply`] moves them back once the signer is done.
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// Scheme, `https` when the uri has none.
    pub scheme: Scheme,
    /// Host and port.
    pub authority: Authority,
    /// Path as it appears on the wire.
    pub path: String,
    /// Query pairs, percent decoded by `build`.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Take `parts` apart. The request must carry an absolute uri.
    pub fn build(parts: &mut Parts) -> Result<Self> {
        let uri = mem::take(&mut parts.uri).into_parts();
        let Some(authority) = uri.authority else {
            return Err(Error::request_invalid(
                "request without authority is invalid for signing",
            ));
        };
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        let query = match paq.query() {
            Some(q) => form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            method: parts.method.clone(),
            scheme: uri.scheme.unwrap_or(Scheme::HTTPS),
            authority,
            path: paq.path().to_string(),
            query,
            headers: mem::take(&mut parts.headers),
        })
    }

    /// Put the request back into `parts`.
    ///
    /// Query pairs are joined verbatim, so they must already be encoded.
    pub fn apply(self, parts: &mut Parts) -> Result<()> {
        let mut paq = self.path;
        for (i, (k, v)) in self.query.iter().enumerate() {
            paq.push(if i == 0 { '?' } else { '&' });
            paq.push_str(k);
            paq.push('=');
            paq.push_str(v);
        }

        let mut uri = mem::take(&mut parts.uri).into_parts();
        uri.scheme = Some(self.scheme);
        uri.authority = Some(self.authority);
        uri.path_and_query = Some(PathAndQuery::try_from(paq)?);

        parts.uri = Uri::from_parts(uri)?;
        parts.method = self.method;
        parts.headers = self.headers;
        Ok(())
    }

    /// Append a query pair.
    pub fn query_push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Value of header `name` as text, None when absent.
    pub fn header_str(&self, name: impl AsHeaderName) -> Result<Option<&str>> {
        match self.headers.get(name) {
            Some(v) => Ok(Some(v.to_str()?)),
            None => Ok(None),
        }
    }

    /// Trim every header value and collapse inner runs of whitespace.
    ///
    /// Values that are not visible ascii are signed as they are.
    pub fn normalize_headers(&mut self) -> Result<()> {
        for value in self.headers.values_mut() {
            let Ok(s) = value.to_str() else {
                continue;
            };

            let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
            if normalized != s {
                let sensitive = value.is_sensitive();
                *value = HeaderValue::from_str(&normalized)?;
                value.set_sensitive(sensitive);
            }
        }
        Ok(())
    }

    /// Header names in signing order.
    pub fn signed_headers(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.headers.keys().map(HeaderName::as_str).collect();
        names.sort_unstable();
        names
    }
}
