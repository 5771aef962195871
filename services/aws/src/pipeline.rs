use crate::arn::arn;
use crate::constants::{AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, X_AMZ_CONTENT_SHA_256};
use crate::credential::{Credential, Identity};
use crate::decode::{Decoded, ResponseDecoder};
use crate::endpoint::{self, Endpoint, Service};
use crate::error::{ApiError, ErrorCode, Result};
use crate::provide_credential::DefaultCredentialProvider;
use crate::request::RequestDescriptor;
use crate::sign_request::RequestSigner;
use crate::store::CredentialStore;
use crate::transport::{Attempt, TransportExecutor};
use crate::Config;
use bytes::Bytes;
use cloudcall_core::hash::hex_sha256;
use cloudcall_core::time::{now, DateTime};
use cloudcall_core::{Context, ProvideCredential};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Uri};
use log::debug;
use percent_encoding::utf8_percent_encode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Turns [`RequestDescriptor`]s into signed, retried calls and decoded
/// responses.
///
/// Clones share the same [`CredentialStore`].
///
/// ```no_run
/// use cloudcall_aws::{Config, RequestDescriptor, RequestPipeline, Service};
/// use cloudcall_core::{Context, OsEnv};
/// use http::Method;
///
/// # async fn example() -> cloudcall_aws::Result<()> {
/// let ctx = Context::new().with_env(OsEnv);
/// let config = Config::from_env(&ctx);
/// let pipeline = RequestPipeline::new(ctx, config);
///
/// let desc = RequestDescriptor::rest(Service::S3, "us-east-1", Method::GET, "/test.txt")
///     .with_hostname_prefix("examplebucket");
/// let resp = pipeline.call(desc).await?;
/// println!("{:?}", resp.body);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    ctx: Context,
    config: Config,
    store: Arc<CredentialStore>,
    executor: TransportExecutor,
    decoder: ResponseDecoder,
    time: Option<DateTime>,
}

impl RequestPipeline {
    /// Create a pipeline resolving credentials through the default chain
    /// described by `config`.
    pub fn new(ctx: Context, config: Config) -> Self {
        let provider = DefaultCredentialProvider::from_config(&config);
        Self::with_provider(ctx, config, provider)
    }

    /// Create a pipeline resolving credentials from `provider`.
    pub fn with_provider(
        ctx: Context,
        config: Config,
        provider: impl ProvideCredential<Credential = Credential>,
    ) -> Self {
        Self {
            executor: TransportExecutor::new(config.retry.clone()),
            store: Arc::new(CredentialStore::new(provider)),
            decoder: ResponseDecoder,
            time: None,
            ctx,
            config,
        }
    }

    /// Sign every request at `time` instead of the current time.
    ///
    /// Only useful to reproduce a known signature.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    fn signing_time(&self) -> DateTime {
        self.time.unwrap_or_else(now)
    }

    /// Returns the config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the credential store.
    pub fn credential_store(&self) -> &CredentialStore {
        &self.store
    }

    /// Send `desc` and decode the response.
    ///
    /// Every attempt resolves a credential and signs a fresh copy of the
    /// request at the current time (or the one set by [`Self::with_time`]).
    /// After an expired-token rejection only the key that attempt used is
    /// invalidated.
    pub async fn call(&self, desc: RequestDescriptor) -> Result<Decoded> {
        let endpoint = endpoint::resolve(desc.service, &desc.region, desc.hostname_prefix.as_deref());
        let signer = RequestSigner::new(
            desc.service.as_str(),
            desc.service.signing_region(&desc.region),
        );
        let template = Template::new(&endpoint, &desc)?.with_payload_headers()?;
        debug!("calling {} {}", template.method, template.uri);

        let last_key = Mutex::new(None);
        let (template, signer, desc, last_key) = (&template, &signer, &desc, &last_key);
        self.executor
            .execute(desc.call_options(), move |attempt| {
                self.send_once(template, signer, desc, last_key, attempt)
            })
            .await
    }

    async fn send_once(
        &self,
        template: &Template,
        signer: &RequestSigner,
        desc: &RequestDescriptor,
        last_key: &Mutex<Option<String>>,
        attempt: Attempt,
    ) -> Result<Decoded> {
        let mut last_key = last_key.lock().await;
        let rejected = if attempt.refresh_credential {
            last_key.take()
        } else {
            None
        };
        let cred = self.credential(desc, rejected.as_deref()).await?;
        *last_key = Some(cred.access_key_id.clone());
        drop(last_key);

        let signed = signer.sign(template.to_request(), &cred, self.signing_time())?;
        let resp = self.ctx.http_send(signed.request).await?;
        self.decoder.decode(resp)
    }

    /// Credential for one attempt of `desc`.
    ///
    /// `rejected` is the key the service refused on the previous attempt.
    /// The store keeps a newer key that another call already loaded.
    async fn credential(
        &self,
        desc: &RequestDescriptor,
        rejected: Option<&str>,
    ) -> Result<Credential> {
        if let Some(cred) = &desc.credential {
            return Ok(cred.clone());
        }

        if let Some(key) = rejected {
            self.store.invalidate(key).await;
        }
        Ok(self.store.resolve(&self.ctx).await?)
    }

    /// Build a presigned request for `desc` that stays valid for `expires_in`.
    ///
    /// The body of `desc` is not signed; the holder of the returned request
    /// may send any payload with it.
    pub async fn presign(
        &self,
        desc: RequestDescriptor,
        expires_in: Duration,
    ) -> Result<http::Request<()>> {
        let endpoint = endpoint::resolve(desc.service, &desc.region, desc.hostname_prefix.as_deref());
        let signer = RequestSigner::new(
            desc.service.as_str(),
            desc.service.signing_region(&desc.region),
        );
        let cred = self.credential(&desc, None).await?;

        let (mut parts, _) = Template::new(&endpoint, &desc)?.to_request().into_parts();
        signer.presign(&mut parts, &cred, expires_in, self.signing_time())?;
        Ok(http::Request::from_parts(parts, ()))
    }

    /// Look up the identity the current credential belongs to.
    ///
    /// The result is cached with the credential and dropped when it rotates.
    pub async fn caller_identity(&self) -> Result<Identity> {
        let cred = self.store.resolve(&self.ctx).await?;
        if let Some(identity) = &cred.identity {
            return Ok(identity.clone());
        }

        let desc = RequestDescriptor::query(
            Service::Sts,
            &self.config.region,
            "2011-06-15",
            [("Action", "GetCallerIdentity")],
        )
        .retryable(true)
        .with_credential(cred.clone());

        let resp: GetCallerIdentityResponse = self.call(desc).await?.xml()?;
        let result = resp.result;
        let identity = Identity {
            account_id: result.account,
            arn: result.arn,
            user_id: result.user_id,
        };

        self.store
            .set_identity(&cred.access_key_id, identity.clone())
            .await;
        Ok(identity)
    }

    /// Build an ARN for `resource` in the caller's account and the configured
    /// region.
    pub async fn arn(&self, service: Service, resource: &str) -> Result<String> {
        let identity = self.caller_identity().await?;
        Ok(arn(service, resource, &self.config.region, &identity.account_id))
    }
}

/// The unsigned request, rebuilt into a fresh `http::Request` per attempt.
#[derive(Debug)]
struct Template {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl Template {
    fn new(endpoint: &Endpoint, desc: &RequestDescriptor) -> Result<Self> {
        let mut uri = endpoint.url();
        uri.push_str(&utf8_percent_encode(&desc.path, &AWS_URI_ENCODE_SET).to_string());
        if !desc.query.is_empty() {
            uri.push('?');
            let query = desc
                .query
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET),
                        utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET)
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            uri.push_str(&query);
        }

        let uri = uri.parse::<Uri>().map_err(|e| {
            ApiError::configuration(
                ErrorCode::InvalidRequest,
                format!("invalid request uri: {uri}"),
            )
            .with_source(e)
        })?;

        Ok(Self {
            method: desc.method.clone(),
            uri,
            headers: desc.headers.clone(),
            body: desc.body.clone(),
        })
    }

    /// Add the headers describing the payload. Presigned requests leave them
    /// out.
    fn with_payload_headers(mut self) -> Result<Self> {
        self.headers.insert(
            X_AMZ_CONTENT_SHA_256,
            HeaderValue::try_from(hex_sha256(&self.body))?,
        );

        if !self.body.is_empty() {
            self.headers
                .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
            if !self.headers.contains_key(CONTENT_TYPE) {
                self.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
            }
        }
        Ok(self)
    }

    fn to_request(&self) -> http::Request<Bytes> {
        let mut req = http::Request::new(self.body.clone());
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.headers_mut() = self.headers.clone();
        req
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct GetCallerIdentityResponse {
    #[serde(rename = "GetCallerIdentityResult")]
    result: GetCallerIdentityResult,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct GetCallerIdentityResult {
    arn: String,
    user_id: String,
    account: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provide_credential::StaticCredentialProvider;
    use async_trait::async_trait;
    use cloudcall_core::HttpSend;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    struct Recorder {
        requests: Arc<Mutex<Vec<http::Request<Bytes>>>>,
    }

    #[async_trait]
    impl HttpSend for Recorder {
        async fn http_send(
            &self,
            req: http::Request<Bytes>,
        ) -> cloudcall_core::Result<http::Response<Bytes>> {
            let body = if req.uri().host() == Some("sts.amazonaws.com") {
                r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult>
    <Arn>arn:aws:iam::123456789012:user/Alice</Arn>
    <UserId>AIDACKCEVSQ6C2EXAMPLE</UserId>
    <Account>123456789012</Account>
  </GetCallerIdentityResult>
  <ResponseMetadata>
    <RequestId>01234567-89ab-cdef-0123-456789abcdef</RequestId>
  </ResponseMetadata>
</GetCallerIdentityResponse>"#
            } else {
                ""
            };
            self.requests.lock().unwrap().push(req);

            Ok(http::Response::builder()
                .status(200)
                .header(CONTENT_TYPE, "text/xml")
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap())
        }
    }

    fn pipeline(recorder: Recorder) -> RequestPipeline {
        RequestPipeline::with_provider(
            Context::new().with_http_send(recorder),
            Config::default().with_region("eu-west-1"),
            StaticCredentialProvider::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
        )
    }

    #[tokio::test]
    async fn test_call_builds_wire_request() {
        let recorder = Recorder::default();
        let pipeline = pipeline(recorder.clone());

        let desc = RequestDescriptor::rest(Service::S3, "eu-west-1", Method::PUT, "/photos/my cat.jpg")
            .with_hostname_prefix("examplebucket")
            .with_query("x-id", "PutObject")
            .with_body("meow");
        let decoded = pipeline.call(desc).await.unwrap();
        assert_eq!(decoded.body, crate::Body::Empty);

        let requests = recorder.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(
            req.uri().to_string(),
            "https://examplebucket.s3.eu-west-1.amazonaws.com/photos/my%20cat.jpg?x-id=PutObject"
        );
        assert_eq!(req.headers()[CONTENT_LENGTH], "4");
        assert_eq!(req.headers()[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(req.headers()[X_AMZ_CONTENT_SHA_256], hex_sha256(b"meow"));

        let auth = req.headers()[http::header::AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(auth.contains("/eu-west-1/s3/aws4_request"));
        assert!(auth.contains(
            "SignedHeaders=content-length;content-type;host;x-amz-content-sha256;x-amz-date,"
        ));
    }

    #[tokio::test]
    async fn test_empty_body_has_no_content_headers() {
        let recorder = Recorder::default();
        let pipeline = pipeline(recorder.clone());

        pipeline
            .call(RequestDescriptor::rest(Service::Sqs, "eu-west-1", Method::GET, "/"))
            .await
            .unwrap();

        let requests = recorder.requests.lock().unwrap();
        assert!(!requests[0].headers().contains_key(CONTENT_LENGTH));
        assert!(!requests[0].headers().contains_key(CONTENT_TYPE));
        assert_eq!(
            requests[0].headers()[X_AMZ_CONTENT_SHA_256],
            cloudcall_core::hash::EMPTY_SHA256
        );
    }

    #[tokio::test]
    async fn test_caller_identity_is_cached() {
        let recorder = Recorder::default();
        let pipeline = pipeline(recorder.clone());

        let identity = pipeline.caller_identity().await.unwrap();
        assert_eq!(identity.account_id, "123456789012");
        assert_eq!(identity.arn, "arn:aws:iam::123456789012:user/Alice");
        assert_eq!(identity.user_id, "AIDACKCEVSQ6C2EXAMPLE");

        let arn = pipeline.arn(Service::Sqs, "queue1").await.unwrap();
        assert_eq!(arn, "arn:aws:sqs:eu-west-1:123456789012:queue1");

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method(), Method::POST);
        assert_eq!(
            requests[0].body(),
            &Bytes::from_static(b"Action=GetCallerIdentity&Version=2011-06-15")
        );
        let auth = requests[0].headers()[http::header::AUTHORIZATION]
            .to_str()
            .unwrap();
        assert!(auth.contains("/us-east-1/sts/aws4_request"));
    }

    #[tokio::test]
    async fn test_presign() {
        let recorder = Recorder::default();
        let pipeline = pipeline(recorder.clone());

        let desc = RequestDescriptor::rest(Service::S3, "us-east-1", Method::GET, "/test.txt")
            .with_hostname_prefix("examplebucket");
        let req = pipeline
            .presign(desc, Duration::from_secs(3600))
            .await
            .unwrap();

        let query = req.uri().query().unwrap();
        assert!(req.uri().to_string().starts_with("https://examplebucket.s3.amazonaws.com/test.txt?"));
        assert!(query.contains("X-Amz-Expires=3600"));
        assert!(query.contains("X-Amz-SignedHeaders=host"));
        assert!(query.rsplit('&').next().unwrap().starts_with("X-Amz-Signature="));
        assert!(recorder.requests.lock().unwrap().is_empty());
    }
}
