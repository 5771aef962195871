use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use bytes::Bytes;
use cloudcall_core::time::{now, parse_rfc3339, DateTime};
use cloudcall_core::{Context, Error, ProvideCredential, Result};
use http::header::CONTENT_LENGTH;
use http::{Method, StatusCode};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Session token TTL requested from IMDS, 6h as recommended by AWS.
const TOKEN_TTL_SECONDS: i64 = 21600;

/// ImdsCredentialProvider loads the instance role credential from the EC2
/// instance metadata service using the IMDSv2 session token flow.
///
/// Every metadata request is bounded by a short timeout so hosts that are
/// not on EC2 fall through quickly.
#[derive(Debug, Clone)]
pub struct ImdsCredentialProvider {
    endpoint: Option<String>,
    timeout: Duration,
    token: Arc<Mutex<(String, DateTime)>>,
}

impl Default for ImdsCredentialProvider {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(1),
            token: Arc::new(Mutex::new((String::new(), DateTime::default()))),
        }
    }
}

impl ImdsCredentialProvider {
    /// Create a new `ImdsCredentialProvider` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint for the metadata service.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the timeout for each metadata request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, ctx: &Context) -> String {
        self.endpoint
            .clone()
            .or_else(|| ctx.env_var(AWS_EC2_METADATA_SERVICE_ENDPOINT))
            .unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    async fn send(&self, ctx: &Context, req: http::Request<Bytes>) -> Result<(StatusCode, String)> {
        let uri = req.uri().to_string();
        let resp = tokio::time::timeout(self.timeout, ctx.http_send_as_string(req))
            .await
            .map_err(|_| {
                Error::unexpected("IMDS request timed out")
                    .with_context(format!("uri: {uri}"))
                    .with_context("hint: check if running on EC2 instance")
                    .set_retryable(true)
            })?
            .map_err(|e| {
                Error::unexpected("failed to connect to IMDS")
                    .with_context(format!("uri: {uri}"))
                    .set_retryable(true)
                    .with_source(e)
            })?;

        Ok((resp.status(), resp.into_body()))
    }

    async fn load_token(&self, ctx: &Context, endpoint: &str) -> Result<String> {
        let mut token = self.token.lock().await;
        if token.1 > now() {
            return Ok(token.0.clone());
        }

        let url = format!("{endpoint}/latest/api/token");
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::PUT)
            .header(CONTENT_LENGTH, "0")
            .header(
                "x-aws-ec2-metadata-token-ttl-seconds",
                TOKEN_TTL_SECONDS.to_string(),
            )
            .body(Bytes::new())?;

        let (status, body) = self.send(ctx, req).await?;
        if status != StatusCode::OK {
            return Err(imds_error("fetch_token", status, &body));
        }

        // Refresh 10 minutes ahead of the TTL.
        let expires_in = now() + chrono::TimeDelta::seconds(TOKEN_TTL_SECONDS - 600);
        *token = (body.clone(), expires_in);

        Ok(body)
    }
}

#[async_trait]
impl ProvideCredential for ImdsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        if ctx.env_flag(AWS_EC2_METADATA_DISABLED) {
            debug!("IMDS credential provider is disabled by {AWS_EC2_METADATA_DISABLED}");
            return Ok(None);
        }

        let endpoint = self.endpoint(ctx);
        let token = self.load_token(ctx, &endpoint).await?;

        // List the role attached to this instance.
        let url = format!("{endpoint}/latest/meta-data/iam/security-credentials/");
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::GET)
            .header("x-aws-ec2-metadata-token", &token)
            .body(Bytes::new())?;
        let (status, body) = self.send(ctx, req).await?;
        if status != StatusCode::OK {
            return Err(imds_error("list_instance_profiles", status, &body));
        }

        let Some(role) = body.lines().next().map(str::trim).filter(|v| !v.is_empty()) else {
            return Err(
                Error::config_invalid("no IAM role attached to EC2 instance")
                    .with_context("hint: attach an IAM role to your EC2 instance"),
            );
        };

        let url = format!("{endpoint}/latest/meta-data/iam/security-credentials/{role}");
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::GET)
            .header("x-aws-ec2-metadata-token", &token)
            .body(Bytes::new())?;
        let (status, body) = self.send(ctx, req).await?;
        if status != StatusCode::OK {
            return Err(imds_error("fetch_credentials", status, &body)
                .with_context(format!("role: {role}")));
        }

        let resp: Ec2MetadataIamSecurityCredentials = serde_json::from_str(&body).map_err(|e| {
            Error::unexpected("failed to parse IMDS credentials response")
                .with_context(format!("role: {role}"))
                .with_source(e)
        })?;

        if resp.code != "Success" {
            return Err(Error::credential_invalid(format!(
                "IMDS returned error: [{}] {}",
                resp.code, resp.message
            ))
            .with_context(format!("role: {role}")));
        }

        let expires_in = parse_rfc3339(&resp.expiration)
            .map_err(|e| e.with_context(format!("role: {role}")))?;

        Ok(Some(
            Credential::new(resp.access_key_id, resp.secret_access_key)
                .with_session_token(resp.token)
                .with_expires_in(expires_in),
        ))
    }
}

fn imds_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let err = match status.as_u16() {
        401 => Error::permission_denied("IMDS session token rejected"),
        403 => Error::permission_denied("IMDS access forbidden"),
        404 => Error::credential_not_found("IMDS resource not found"),
        s if s >= 500 => Error::unexpected("IMDS service error").set_retryable(true),
        _ => Error::unexpected(format!("IMDS returned unexpected status {status}")),
    };

    err.with_context(format!("operation: {operation}"))
        .with_context(format!("status: {status}"))
        .with_context(format!("body: {}", body.chars().take(200).collect::<String>()))
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Ec2MetadataIamSecurityCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,

    code: String,
    message: String,
}
