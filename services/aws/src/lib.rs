//! Signed, retried calls to AWS style HTTP APIs.
//!
//! [`RequestPipeline`] takes a [`RequestDescriptor`] and:
//!
//! - resolves a credential through the [`CredentialStore`]
//! - resolves the service endpoint for the region
//! - signs every attempt with [SigV4](RequestSigner)
//! - retries under the [`RetryConfig`] and the call deadline
//! - decodes the response or the error envelope
//!
//! Failures surface as a single [`ApiError`].

mod constants;

mod config;
pub use config::Config;

mod credential;
pub use credential::Credential;
pub use credential::Identity;

mod provide_credential;
pub use provide_credential::*;

mod store;
pub use store::CredentialStore;

mod endpoint;
pub use endpoint::resolve as resolve_endpoint;
pub use endpoint::Endpoint;
pub use endpoint::Service;

mod sign_request;
pub use sign_request::RequestSigner;
pub use sign_request::SignedRequest;

mod error;
pub use error::ApiError;
pub use error::ApiErrorKind;
pub use error::ErrorClass;
pub use error::ErrorCode;
pub use error::Result;

mod decode;
pub use decode::Body;
pub use decode::ContentType;
pub use decode::Decoded;
pub use decode::ResponseDecoder;
pub use decode::XmlNode;

mod retry;
pub use retry::BackoffStrategy;
pub use retry::RetryConfig;
pub use retry::RetryPolicy;

mod transport;
pub use transport::Attempt;
pub use transport::CallOptions;
pub use transport::TransportExecutor;

mod request;
pub use request::RequestDescriptor;

mod pipeline;
pub use pipeline::RequestPipeline;

mod arn;
pub use arn::arn;
pub use arn::arn_region;
