use std::fmt;
use thiserror::Error;

/// Error raised while loading credentials or preparing a request.
///
/// Service level failures are modelled by the service crates, this type only
/// covers what happens before and around the wire.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
    context: Vec<String>,
    retryable: bool,
}

/// What went wrong, coarse enough to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A credential was found but cannot be used.
    CredentialInvalid,
    /// No source produced a credential.
    CredentialNotFound,
    /// A credential source refused access.
    PermissionDenied,
    /// The request cannot be signed or sent as built.
    RequestInvalid,
    /// Settings are missing or malformed.
    ConfigInvalid,
    /// Anything else: I/O, network, undecodable replies.
    Unexpected,
}

impl Error {
    /// Create an error of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            context: Vec::new(),
            retryable: false,
        }
    }

    /// Shorthand for [`ErrorKind::CredentialInvalid`].
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Shorthand for [`ErrorKind::CredentialNotFound`].
    pub fn credential_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialNotFound, message)
    }

    /// Shorthand for [`ErrorKind::PermissionDenied`].
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    /// Shorthand for [`ErrorKind::RequestInvalid`].
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Shorthand for [`ErrorKind::ConfigInvalid`].
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Shorthand for [`ErrorKind::Unexpected`].
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Set the underlying cause.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach a line of context, e.g. `"path: ~/.aws/config"`.
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        self.context.push(context.to_string());
        self
    }

    /// Mark whether trying again may succeed.
    pub fn set_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// The error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The message, without context lines.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context lines, oldest first.
    pub fn context(&self) -> &[String] {
        &self.context
    }

    /// Whether trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::CredentialInvalid => "invalid credentials",
            ErrorKind::CredentialNotFound => "no credentials found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::RequestInvalid => "invalid request",
            ErrorKind::ConfigInvalid => "invalid configuration",
            ErrorKind::Unexpected => "unexpected error",
        };
        f.write_str(s)
    }
}

/// Result with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

macro_rules! impl_from {
    ($kind:ident: $($err:ty),+ $(,)?) => {
        $(
            impl From<$err> for Error {
                fn from(err: $err) -> Self {
                    Self::new(ErrorKind::$kind, err.to_string()).with_source(err)
                }
            }
        )+
    };
}

impl_from!(
    RequestInvalid: http::Error,
    http::header::InvalidHeaderValue,
    http::header::InvalidHeaderName,
    http::header::ToStrError,
    http::uri::InvalidUri,
    http::uri::InvalidUriParts,
);

impl_from!(
    Unexpected: fmt::Error,
    std::string::FromUtf8Error,
    std::io::Error,
);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_builders() {
        let err = Error::unexpected("failed to connect to IMDS")
            .with_context("endpoint: http://169.254.169.254")
            .set_retryable(true);

        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(err.to_string(), "failed to connect to IMDS");
        assert_eq!(err.context(), ["endpoint: http://169.254.169.254"]);
        assert!(err.is_retryable());
        assert!(!Error::config_invalid("bad").is_retryable());
    }

    #[test]
    fn test_from_http_errors() {
        let err: Error = http::HeaderValue::from_str("bad\nvalue").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::RequestInvalid);
        assert!(std::error::Error::source(&err).is_some());

        let err: Error = std::io::Error::other("disk gone").into();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(err.message(), "disk gone");
    }
}
