use crate::constants::{
    AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, UNSIGNED_PAYLOAD, X_AMZ_CONTENT_SHA_256,
    X_AMZ_DATE, X_AMZ_SECURITY_TOKEN,
};
use crate::Credential;
use bytes::Bytes;
use cloudcall_core::hash::{hex_hmac_sha256, hex_sha256, hmac_chain};
use cloudcall_core::time::{format_date, format_iso8601, DateTime};
use cloudcall_core::{Error, Result, SigningRequest};
use http::request::Parts;
use http::{header, HeaderValue};
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use std::fmt::Write;
use std::time::Duration;

/// RequestSigner that implement AWS SigV4.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service: String,
    region: String,
}

/// A request carrying a SigV4 signature, ready to send.
#[derive(Debug)]
pub struct SignedRequest {
    /// The signed request.
    pub request: http::Request<Bytes>,
    /// Timestamp the signature was computed for.
    pub signed_at: DateTime,
}

impl RequestSigner {
    /// Create a signer for `service` in `region`.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),
        }
    }

    /// Sign `req` with header based authorization.
    ///
    /// `host` and `x-amz-date` are added when missing and every header present
    /// on the request is signed. The payload hash is taken from
    /// `x-amz-content-sha256` when the caller set it, otherwise it is computed
    /// over the body.
    pub fn sign(
        &self,
        req: http::Request<Bytes>,
        cred: &Credential,
        now: DateTime,
    ) -> Result<SignedRequest> {
        let (mut parts, body) = req.into_parts();
        let mut signed_req = SigningRequest::build(&mut parts)?;

        canonicalize_header(&mut signed_req, cred, None, now)?;
        canonicalize_query(&mut signed_req, cred, None, now, &self.service, &self.region)?;

        let payload_hash = match signed_req.header_str(X_AMZ_CONTENT_SHA_256)? {
            Some(v) => v.to_string(),
            None => hex_sha256(&body),
        };

        let creq = canonical_request_string(&signed_req, &payload_hash)?;
        let scope = self.scope(now);
        let signature = self.signature(cred, &scope, &creq, now)?;

        let mut authorization = HeaderValue::from_str(&format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            cred.access_key_id,
            scope,
            signed_req.signed_headers().join(";"),
            signature
        ))?;
        authorization.set_sensitive(true);
        signed_req
            .headers
            .insert(header::AUTHORIZATION, authorization);

        signed_req.apply(&mut parts)?;
        Ok(SignedRequest {
            request: http::Request::from_parts(parts, body),
            signed_at: now,
        })
    }

    /// Sign `parts` by moving the signature into `X-Amz-*` query parameters.
    ///
    /// The payload is not signed, so the resulting URL can be handed to any
    /// client that issues the same verb before `expires_in` elapses.
    pub fn presign(
        &self,
        parts: &mut Parts,
        cred: &Credential,
        expires_in: Duration,
        now: DateTime,
    ) -> Result<()> {
        if expires_in.is_zero() || expires_in > Duration::from_secs(7 * 24 * 3600) {
            return Err(Error::request_invalid(
                "presigned url expiry must be between 1 second and 7 days",
            ));
        }

        let mut signed_req = SigningRequest::build(parts)?;

        canonicalize_header(&mut signed_req, cred, Some(expires_in), now)?;
        canonicalize_query(
            &mut signed_req,
            cred,
            Some(expires_in),
            now,
            &self.service,
            &self.region,
        )?;

        let creq = canonical_request_string(&signed_req, UNSIGNED_PAYLOAD)?;
        let scope = self.scope(now);
        let signature = self.signature(cred, &scope, &creq, now)?;
        signed_req.query_push("X-Amz-Signature", signature);

        signed_req.apply(parts)
    }

    fn scope(&self, now: DateTime) -> String {
        // Scope: "20220313/<region>/<service>/aws4_request"
        let scope = format!(
            "{}/{}/{}/aws4_request",
            format_date(now),
            self.region,
            self.service
        );
        debug!("calculated scope: {scope}");
        scope
    }

    fn signature(
        &self,
        cred: &Credential,
        scope: &str,
        creq: &str,
        now: DateTime,
    ) -> Result<String> {
        debug!("calculated canonical request: {creq}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let mut string_to_sign = String::new();
        writeln!(string_to_sign, "AWS4-HMAC-SHA256")?;
        writeln!(string_to_sign, "{}", format_iso8601(now))?;
        writeln!(string_to_sign, "{scope}")?;
        write!(string_to_sign, "{}", hex_sha256(creq.as_bytes()))?;
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key =
            generate_signing_key(&cred.secret_access_key, now, &self.region, &self.service);
        Ok(hex_hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }
}

/// Build the canonical request.
///
/// The query must already be canonicalized by [`canonicalize_query`].
fn canonical_request_string(
    ctx: &SigningRequest,
    payload_hash: &str,
) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    writeln!(f, "{}", ctx.method)?;
    writeln!(f, "{}", canonical_path(&ctx.path)?)?;
    writeln!(
        f,
        "{}",
        ctx.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    )?;

    let signed_headers = ctx.signed_headers();
    for header in signed_headers.iter() {
        let value = ctx.headers[*header].to_str()?;
        writeln!(f, "{header}:{value}")?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;
    write!(f, "{payload_hash}")?;

    Ok(f)
}

/// Percent-decode then re-encode the path, so that encoding an already
/// canonical path is a no-op.
fn canonical_path(path: &str) -> Result<String> {
    let path = percent_decode_str(path).decode_utf8().map_err(|e| {
        Error::request_invalid("request path is not valid utf-8 once decoded").with_source(e)
    })?;
    let path = if path.is_empty() { "/".into() } else { path };

    Ok(utf8_percent_encode(&path, &AWS_URI_ENCODE_SET).to_string())
}

fn canonicalize_header(
    ctx: &mut SigningRequest,
    cred: &Credential,
    expires_in: Option<Duration>,
    now: DateTime,
) -> Result<()> {
    // Header values need to be normalized according to Step 4 of https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html
    ctx.normalize_headers()?;

    // Insert HOST header if not present.
    if ctx.headers.get(header::HOST).is_none() {
        ctx.headers
            .insert(header::HOST, ctx.authority.as_str().parse()?);
    }

    if expires_in.is_none() {
        // Insert DATE header if not present.
        if ctx.headers.get(X_AMZ_DATE).is_none() {
            ctx.headers
                .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);
        }

        // Insert X_AMZ_SECURITY_TOKEN header if security token exists.
        if let Some(token) = &cred.session_token {
            let mut value = HeaderValue::from_str(token)?;
            // Set token value sensitive to valid leaking.
            value.set_sensitive(true);

            ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
        }
    }

    Ok(())
}

fn canonicalize_query(
    ctx: &mut SigningRequest,
    cred: &Credential,
    expires_in: Option<Duration>,
    now: DateTime,
    service: &str,
    region: &str,
) -> Result<()> {
    if let Some(expire) = expires_in {
        ctx.query_push("X-Amz-Algorithm", "AWS4-HMAC-SHA256");
        ctx.query_push(
            "X-Amz-Credential",
            format!(
                "{}/{}/{}/{}/aws4_request",
                cred.access_key_id,
                format_date(now),
                region,
                service
            ),
        );
        ctx.query_push("X-Amz-Date", format_iso8601(now));
        ctx.query_push("X-Amz-Expires", expire.as_secs().to_string());
        ctx.query_push(
            "X-Amz-SignedHeaders",
            ctx.signed_headers().join(";"),
        );

        if let Some(token) = &cred.session_token {
            ctx.query_push("X-Amz-Security-Token", token);
        }
    }

    // Return if query is empty.
    if ctx.query.is_empty() {
        return Ok(());
    }

    ctx.query = ctx
        .query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect();
    // Sort by encoded param name, then value.
    ctx.query.sort();

    Ok(())
}

/// Derive the signing key: "AWS4" + secret, then date, region, service and
/// the literal `aws4_request`.
fn generate_signing_key(secret: &str, time: DateTime, region: &str, service: &str) -> Vec<u8> {
    hmac_chain(
        format!("AWS4{secret}").as_bytes(),
        &[
            format_date(time).as_bytes(),
            region.as_bytes(),
            service.as_bytes(),
            &b"aws4_request"[..],
        ],
    )
}
