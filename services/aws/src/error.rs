//! Errors returned by the request pipeline.

use http::StatusCode;
use std::fmt;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// The single error type surfaced by [`RequestPipeline`](crate::RequestPipeline).
#[derive(Debug, thiserror::Error)]
pub struct ApiError {
    kind: ApiErrorKind,
    code: ErrorCode,
    message: String,
    status: Option<StatusCode>,
    request_id: Option<String>,
    retryable: bool,
    attempts: u32,
    #[source]
    source: Option<anyhow::Error>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error [{}]", self.kind, self.code)?;
        if let Some(status) = self.status {
            write!(f, " (status {})", status.as_u16())?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if self.attempts > 1 {
            write!(f, " after {} attempts", self.attempts)?;
        }
        Ok(())
    }
}

impl ApiError {
    /// Create a new error. Retryability follows from the kind.
    pub fn new(kind: ApiErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            status: None,
            request_id: None,
            retryable: kind == ApiErrorKind::Transient,
            attempts: 0,
            source: None,
        }
    }

    /// Build the error for a non-success service response.
    pub fn from_service(
        status: StatusCode,
        code: ErrorCode,
        message: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        let kind = match ErrorClass::of(&code, status) {
            ErrorClass::Transient => ApiErrorKind::Transient,
            _ => ApiErrorKind::Terminal,
        };

        let mut err = Self::new(kind, code, message);
        err.status = Some(status);
        err.request_id = request_id;
        err
    }

    /// Configuration error, never retried.
    pub fn configuration(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Configuration, code, message)
    }

    /// Deadline exceeded.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Timeout, ErrorCode::DeadlineExceeded, message)
    }

    /// A response that could not be decoded.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Terminal, ErrorCode::MalformedResponse, message)
    }

    /// Attach a source error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Record how many transport attempts were made.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Error kind.
    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    /// Service error code, or a local code for failures that never reached
    /// the service.
    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    /// Error message, verbatim from the service when there is one.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the failed response.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Request id reported by the service.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Number of transport attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the call may succeed if tried again.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// How the retry loop should treat this error.
    pub fn class(&self) -> ErrorClass {
        match self.kind {
            ApiErrorKind::Transient => ErrorClass::Transient,
            ApiErrorKind::Configuration | ApiErrorKind::Timeout => ErrorClass::Terminal,
            ApiErrorKind::Terminal => match self.status {
                Some(status) => ErrorClass::of(&self.code, status),
                None => self.code.class(),
            },
        }
    }
}

impl From<cloudcall_core::Error> for ApiError {
    fn from(err: cloudcall_core::Error) -> Self {
        use cloudcall_core::ErrorKind;

        let mut message = err.message().to_string();
        for ctx in err.context() {
            message.push_str(", ");
            message.push_str(ctx);
        }

        let e = match err.kind() {
            ErrorKind::CredentialNotFound | ErrorKind::CredentialInvalid => {
                Self::configuration(ErrorCode::NoCredentials, message)
            }
            ErrorKind::ConfigInvalid | ErrorKind::RequestInvalid => {
                Self::configuration(ErrorCode::InvalidRequest, message)
            }
            ErrorKind::PermissionDenied => {
                Self::new(ApiErrorKind::Terminal, ErrorCode::AccessDenied, message)
            }
            ErrorKind::Unexpected if err.is_retryable() => {
                Self::new(ApiErrorKind::Transient, ErrorCode::Transport, message)
            }
            ErrorKind::Unexpected => {
                Self::new(ApiErrorKind::Terminal, ErrorCode::Transport, message)
            }
        };
        e.with_source(err)
    }
}

impl From<http::Error> for ApiError {
    fn from(err: http::Error) -> Self {
        Self::configuration(ErrorCode::InvalidRequest, err.to_string()).with_source(err)
    }
}

impl From<http::header::InvalidHeaderValue> for ApiError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::configuration(ErrorCode::InvalidRequest, err.to_string()).with_source(err)
    }
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Missing credentials, unknown service or an invalid request.
    Configuration,
    /// Throttling, server or network failure. Retried when allowed.
    Transient,
    /// Rejected by the service, surfaced as-is.
    Terminal,
    /// The caller deadline passed.
    Timeout,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Configuration => write!(f, "configuration"),
            ApiErrorKind::Transient => write!(f, "transient"),
            ApiErrorKind::Terminal => write!(f, "terminal"),
            ApiErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Retry treatment of an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff.
    Transient,
    /// Resource not visible yet. Retry only when the caller opted in.
    EventualConsistency,
    /// Refresh the credential once, then retry.
    CredentialExpired,
    /// Never retry.
    Terminal,
}

impl ErrorClass {
    /// Classify a service error. 5xx and 429 responses are transient
    /// whatever their code says.
    pub fn of(code: &ErrorCode, status: StatusCode) -> Self {
        match code.class() {
            ErrorClass::Terminal
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS =>
            {
                ErrorClass::Transient
            }
            class => class,
        }
    }
}

/// Error codes the pipeline knows how to treat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Transient.
    SlowDown,
    Throttling,
    ThrottlingException,
    RequestLimitExceeded,
    RequestThrottled,
    TooManyRequestsException,
    ProvisionedThroughputExceededException,
    ServiceUnavailable,
    InternalError,
    InternalFailure,
    RequestTimeout,
    RequestTimeTooSkewed,
    OperationAborted,

    // Eventual consistency.
    NoSuchBucket,
    NoSuchKey,
    NonExistentQueue,

    // Credential expired.
    ExpiredToken,
    ExpiredTokenException,
    RequestExpired,

    // Terminal.
    AccessDenied,
    AccessDeniedException,
    SignatureDoesNotMatch,
    InvalidAccessKeyId,
    InvalidClientTokenId,
    MalformedXML,
    InvalidParameterValue,
    ValidationError,

    // Local codes, never sent by the service.
    NoCredentials,
    InvalidRequest,
    UnknownService,
    Transport,
    DeadlineExceeded,
    MalformedResponse,

    /// Any other code, kept verbatim.
    Unknown(String),
}

impl ErrorCode {
    /// Parse a code reported by the service.
    ///
    /// JSON protocols may send `prefix#Code`, only the part after `#` is kept.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let s = s.rsplit_once('#').map(|(_, v)| v).unwrap_or(s);
        // Some JSON services append `:` plus a type URI.
        let s = s.split_once(':').map(|(v, _)| v).unwrap_or(s);

        match s {
            "SlowDown" => ErrorCode::SlowDown,
            "Throttling" => ErrorCode::Throttling,
            "ThrottlingException" => ErrorCode::ThrottlingException,
            "RequestLimitExceeded" => ErrorCode::RequestLimitExceeded,
            "RequestThrottled" => ErrorCode::RequestThrottled,
            "TooManyRequestsException" => ErrorCode::TooManyRequestsException,
            "ProvisionedThroughputExceededException" => {
                ErrorCode::ProvisionedThroughputExceededException
            }
            "ServiceUnavailable" => ErrorCode::ServiceUnavailable,
            "InternalError" => ErrorCode::InternalError,
            "InternalFailure" => ErrorCode::InternalFailure,
            "RequestTimeout" => ErrorCode::RequestTimeout,
            "RequestTimeTooSkewed" => ErrorCode::RequestTimeTooSkewed,
            "OperationAborted" => ErrorCode::OperationAborted,
            "NoSuchBucket" => ErrorCode::NoSuchBucket,
            "NoSuchKey" => ErrorCode::NoSuchKey,
            "AWS.SimpleQueueService.NonExistentQueue" => ErrorCode::NonExistentQueue,
            "ExpiredToken" => ErrorCode::ExpiredToken,
            "ExpiredTokenException" => ErrorCode::ExpiredTokenException,
            "RequestExpired" => ErrorCode::RequestExpired,
            "AccessDenied" => ErrorCode::AccessDenied,
            "AccessDeniedException" => ErrorCode::AccessDeniedException,
            "SignatureDoesNotMatch" => ErrorCode::SignatureDoesNotMatch,
            "InvalidAccessKeyId" => ErrorCode::InvalidAccessKeyId,
            "InvalidClientTokenId" => ErrorCode::InvalidClientTokenId,
            "MalformedXML" => ErrorCode::MalformedXML,
            "InvalidParameterValue" => ErrorCode::InvalidParameterValue,
            "ValidationError" => ErrorCode::ValidationError,
            v => ErrorCode::Unknown(v.to_string()),
        }
    }

    /// Fallback code for a response without a parsable error body.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::FORBIDDEN => ErrorCode::AccessDenied,
            StatusCode::TOO_MANY_REQUESTS => ErrorCode::Throttling,
            StatusCode::SERVICE_UNAVAILABLE => ErrorCode::ServiceUnavailable,
            StatusCode::REQUEST_TIMEOUT => ErrorCode::RequestTimeout,
            s if s.is_server_error() => ErrorCode::InternalError,
            s => ErrorCode::Unknown(format!("Http{}", s.as_u16())),
        }
    }

    /// The wire name of this code.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::SlowDown => "SlowDown",
            ErrorCode::Throttling => "Throttling",
            ErrorCode::ThrottlingException => "ThrottlingException",
            ErrorCode::RequestLimitExceeded => "RequestLimitExceeded",
            ErrorCode::RequestThrottled => "RequestThrottled",
            ErrorCode::TooManyRequestsException => "TooManyRequestsException",
            ErrorCode::ProvisionedThroughputExceededException => {
                "ProvisionedThroughputExceededException"
            }
            ErrorCode::ServiceUnavailable => "ServiceUnavailable",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::InternalFailure => "InternalFailure",
            ErrorCode::RequestTimeout => "RequestTimeout",
            ErrorCode::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            ErrorCode::OperationAborted => "OperationAborted",
            ErrorCode::NoSuchBucket => "NoSuchBucket",
            ErrorCode::NoSuchKey => "NoSuchKey",
            ErrorCode::NonExistentQueue => "AWS.SimpleQueueService.NonExistentQueue",
            ErrorCode::ExpiredToken => "ExpiredToken",
            ErrorCode::ExpiredTokenException => "ExpiredTokenException",
            ErrorCode::RequestExpired => "RequestExpired",
            ErrorCode::AccessDenied => "AccessDenied",
            ErrorCode::AccessDeniedException => "AccessDeniedException",
            ErrorCode::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            ErrorCode::InvalidAccessKeyId => "InvalidAccessKeyId",
            ErrorCode::InvalidClientTokenId => "InvalidClientTokenId",
            ErrorCode::MalformedXML => "MalformedXML",
            ErrorCode::InvalidParameterValue => "InvalidParameterValue",
            ErrorCode::ValidationError => "ValidationError",
            ErrorCode::NoCredentials => "NoCredentials",
            ErrorCode::InvalidRequest => "InvalidRequest",
            ErrorCode::UnknownService => "UnknownService",
            ErrorCode::Transport => "Transport",
            ErrorCode::DeadlineExceeded => "DeadlineExceeded",
            ErrorCode::MalformedResponse => "MalformedResponse",
            ErrorCode::Unknown(v) => v,
        }
    }

    /// Retry treatment of this code alone.
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorCode::SlowDown
            | ErrorCode::Throttling
            | ErrorCode::ThrottlingException
            | ErrorCode::RequestLimitExceeded
            | ErrorCode::RequestThrottled
            | ErrorCode::TooManyRequestsException
            | ErrorCode::ProvisionedThroughputExceededException
            | ErrorCode::ServiceUnavailable
            | ErrorCode::InternalError
            | ErrorCode::InternalFailure
            | ErrorCode::RequestTimeout
            | ErrorCode::RequestTimeTooSkewed
            | ErrorCode::OperationAborted
            | ErrorCode::Transport => ErrorClass::Transient,

            ErrorCode::NoSuchBucket | ErrorCode::NoSuchKey | ErrorCode::NonExistentQueue => {
                ErrorClass::EventualConsistency
            }

            ErrorCode::ExpiredToken | ErrorCode::ExpiredTokenException | ErrorCode::RequestExpired => {
                ErrorClass::CredentialExpired
            }

            ErrorCode::AccessDenied
            | ErrorCode::AccessDeniedException
            | ErrorCode::SignatureDoesNotMatch
            | ErrorCode::InvalidAccessKeyId
            | ErrorCode::InvalidClientTokenId
            | ErrorCode::MalformedXML
            | ErrorCode::InvalidParameterValue
            | ErrorCode::ValidationError
            | ErrorCode::NoCredentials
            | ErrorCode::InvalidRequest
            | ErrorCode::UnknownService
            | ErrorCode::DeadlineExceeded
            | ErrorCode::MalformedResponse
            | ErrorCode::Unknown(_) => ErrorClass::Terminal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("SlowDown", 503, ErrorClass::Transient)]
    #[test_case("Throttling", 400, ErrorClass::Transient)]
    #[test_case("RequestTimeTooSkewed", 403, ErrorClass::Transient)]
    #[test_case("NoSuchKey", 404, ErrorClass::EventualConsistency)]
    #[test_case("AWS.SimpleQueueService.NonExistentQueue", 400, ErrorClass::EventualConsistency)]
    #[test_case("ExpiredToken", 400, ErrorClass::CredentialExpired)]
    #[test_case("AccessDenied", 403, ErrorClass::Terminal)]
    #[test_case("SomethingNew", 400, ErrorClass::Terminal)]
    #[test_case("SomethingNew", 502, ErrorClass::Transient)]
    #[test_case("SomethingNew", 429, ErrorClass::Transient)]
    fn test_classify(code: &str, status: u16, expected: ErrorClass) {
        let status = StatusCode::from_u16(status).unwrap();
        assert_eq!(ErrorClass::of(&ErrorCode::parse(code), status), expected);
    }

    #[test]
    fn test_parse_json_code() {
        assert_eq!(
            ErrorCode::parse("com.amazonaws.dynamodb.v20120810#ThrottlingException"),
            ErrorCode::ThrottlingException
        );
        assert_eq!(
            ErrorCode::parse("ValidationError:http://internal.amazon.com/coral/"),
            ErrorCode::ValidationError
        );
        assert_eq!(
            ErrorCode::parse("AWS.SimpleQueueService.NonExistentQueue").as_str(),
            "AWS.SimpleQueueService.NonExistentQueue"
        );
    }

    #[test]
    fn test_service_error() {
        let err = ApiError::from_service(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::SlowDown,
            "Please reduce your request rate.",
            Some("4442587FB7D0A2F9".to_string()),
        )
        .with_attempts(3);

        assert_eq!(err.kind(), ApiErrorKind::Transient);
        assert!(err.is_retryable());
        assert_eq!(err.request_id(), Some("4442587FB7D0A2F9"));
        assert_eq!(
            err.to_string(),
            "transient error [SlowDown] (status 503): Please reduce your request rate. after 3 attempts"
        );

        let err = ApiError::from_service(
            StatusCode::FORBIDDEN,
            ErrorCode::AccessDenied,
            "Access Denied",
            None,
        );
        assert_eq!(err.kind(), ApiErrorKind::Terminal);
        assert!(!err.is_retryable());
        assert_eq!(err.class(), ErrorClass::Terminal);
    }

    #[test]
    fn test_from_core_error() {
        let err: ApiError = cloudcall_core::Error::credential_not_found("no credential")
            .with_context("hint: set AWS_ACCESS_KEY_ID")
            .into();
        assert_eq!(err.kind(), ApiErrorKind::Configuration);
        assert_eq!(err.code(), &ErrorCode::NoCredentials);
        assert_eq!(err.message(), "no credential, hint: set AWS_ACCESS_KEY_ID");
        assert!(!err.is_retryable());

        let err: ApiError = cloudcall_core::Error::unexpected("connection reset")
            .set_retryable(true)
            .into();
        assert_eq!(err.kind(), ApiErrorKind::Transient);
        assert_eq!(err.class(), ErrorClass::Transient);
    }
}
