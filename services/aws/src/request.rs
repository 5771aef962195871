use crate::constants::X_AMZ_TARGET;
use crate::endpoint::Service;
use crate::transport::CallOptions;
use crate::Credential;
use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use std::time::Duration;

/// Describes one logical service call.
///
/// Paths and query pairs are given unencoded, the pipeline encodes them when
/// it builds the wire request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub(crate) service: Service,
    pub(crate) region: String,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) hostname_prefix: Option<String>,
    pub(crate) retryable: bool,
    pub(crate) retry_not_found: bool,
    pub(crate) credential: Option<Credential>,
    pub(crate) deadline: Option<Duration>,
}

impl RequestDescriptor {
    /// A REST style call such as `GET /bucket/key`.
    ///
    /// Calls with an idempotent method are retry-safe by default.
    pub fn rest(service: Service, region: impl Into<String>, method: Method, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Self {
            service,
            region: region.into(),
            retryable: method.is_idempotent(),
            method,
            path,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            hostname_prefix: None,
            retry_not_found: false,
            credential: None,
            deadline: None,
        }
    }

    /// A query protocol call: `POST /` with a form encoded body.
    ///
    /// `params` must carry the `Action`. Not retry-safe unless marked with
    /// [`RequestDescriptor::retryable`].
    pub fn query<K, V>(
        service: Service,
        region: impl Into<String>,
        version: &str,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut form = form_urlencoded::Serializer::new(String::new());
        for (k, v) in params {
            form.append_pair(k.as_ref(), v.as_ref());
        }
        form.append_pair("Version", version);

        Self::rest(service, region, Method::POST, "/")
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
            )
            .with_body(form.finish())
    }

    /// A JSON protocol call: `POST /` with `x-amz-target` naming the operation.
    ///
    /// CloudWatch Logs and KMS speak `application/x-amz-json-1.1`, the other
    /// services `application/x-amz-json-1.0`.
    pub fn json(
        service: Service,
        region: impl Into<String>,
        target: &str,
        body: serde_json::Value,
    ) -> Self {
        let mut desc = Self::rest(service, region, Method::POST, "/")
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static(json_content_type(service)),
            )
            .with_body(body.to_string());

        match HeaderValue::from_str(target) {
            Ok(v) => {
                desc.headers.insert(X_AMZ_TARGET, v);
            }
            // Leave the header out, the service rejects the call as invalid.
            Err(_) => log::warn!("ignoring invalid x-amz-target value: {target:?}"),
        }
        desc
    }

    /// Append a query pair.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Prepend `prefix` to the resolved host, e.g. a bucket name.
    pub fn with_hostname_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.hostname_prefix = Some(prefix.into());
        self
    }

    /// Declare whether the call may be sent more than once.
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Retry "not found" errors while a newly created resource propagates.
    pub fn retry_not_found(mut self, retry: bool) -> Self {
        self.retry_not_found = retry;
        self
    }

    /// Sign this call with `credential` instead of the pipeline's store.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Bound the whole call, retries included, by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub(crate) fn call_options(&self) -> CallOptions {
        CallOptions {
            retryable: self.retryable,
            retry_not_found: self.retry_not_found,
            deadline: self.deadline,
        }
    }
}

fn json_content_type(service: Service) -> &'static str {
    match service {
        Service::Logs | Service::Kms => "application/x-amz-json-1.1",
        _ => "application/x-amz-json-1.0",
    }
}
