use crate::{context, leak, s3_error, xml, MockHttpSend};
use cloudcall_aws::{
    ApiErrorKind, Config, ErrorCode, RequestDescriptor, RequestPipeline, RetryConfig, Service,
    StaticCredentialProvider,
};
use http::Method;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::Instant;

fn pipeline(mock: &MockHttpSend, retry: RetryConfig) -> RequestPipeline {
    RequestPipeline::with_provider(
        context(mock.clone(), &[]),
        Config::default().with_retry(retry),
        StaticCredentialProvider::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
    )
}

fn get_object() -> RequestDescriptor {
    RequestDescriptor::rest(Service::S3, "us-east-1", Method::GET, "/test.txt")
        .with_hostname_prefix("examplebucket")
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_bounded() {
    let mock = MockHttpSend::always(503, leak(s3_error("SlowDown", "Please reduce your request rate.")));
    let pipeline = pipeline(&mock, RetryConfig::default());

    let err = pipeline.call(get_object()).await.unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Transient);
    assert_eq!(err.code(), &ErrorCode::SlowDown);
    assert_eq!(err.message(), "Please reduce your request rate.");
    assert_eq!(err.request_id(), Some("4442587FB7D0A2F9"));
    assert_eq!(err.attempts(), 4);

    let sent = mock.sent();
    assert_eq!(sent.len(), 4);
    let gaps = sent
        .windows(2)
        .map(|w| w[1].at - w[0].at)
        .collect::<Vec<_>>();
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]), "{gaps:?}");
    assert!(gaps.iter().all(|g| *g <= Duration::from_secs(20)));
}

#[tokio::test(start_paused = true)]
async fn test_every_attempt_is_signed_again() {
    let mock = MockHttpSend::new(|n, _| {
        if n == 0 {
            Ok(xml(500, ""))
        } else {
            Ok(xml(200, "<Ok/>"))
        }
    });
    let pipeline = pipeline(&mock, RetryConfig::default());

    pipeline.call(get_object()).await.unwrap();

    let sent = mock.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].uri, sent[1].uri);
    assert!(sent
        .iter()
        .all(|s| s.authorization.starts_with("AWS4-HMAC-SHA256 ")));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_error_is_sent_once() {
    let mock = MockHttpSend::always(403, leak(s3_error("AccessDenied", "Access Denied")));
    let pipeline = pipeline(&mock, RetryConfig::default());

    let err = pipeline.call(get_object()).await.unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Terminal);
    assert_eq!(err.code(), &ErrorCode::AccessDenied);
    assert_eq!(err.message(), "Access Denied");
    assert!(!err.is_retryable());
    assert_eq!(err.attempts(), 1);
    assert_eq!(mock.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_error_is_transient() {
    let mock = MockHttpSend::new(|n, _| {
        if n < 2 {
            Err(cloudcall_core::Error::unexpected("connection reset by peer").set_retryable(true))
        } else {
            Ok(xml(200, "<Ok/>"))
        }
    });
    let pipeline = pipeline(&mock, RetryConfig::default());

    pipeline.call(get_object()).await.unwrap();
    assert_eq!(mock.sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_call() {
    let mock = MockHttpSend::always(503, leak(s3_error("SlowDown", "Please reduce your request rate.")))
        .with_latency(Duration::from_secs(1));
    let pipeline = pipeline(&mock, RetryConfig::default());

    let start = Instant::now();
    let err = pipeline
        .call(get_object().with_deadline(Duration::from_secs(2)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Timeout);
    assert!(err.attempts() <= 2);
    assert!(mock.sent().len() <= 2);
    assert!(start.elapsed() <= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_eventual_consistency_is_opt_in() {
    let not_found = leak(s3_error("NoSuchBucket", "The specified bucket does not exist"));

    let mock = MockHttpSend::always(404, not_found);
    let err = pipeline(&mock, RetryConfig::default())
        .call(get_object())
        .await
        .unwrap_err();
    assert_eq!(err.code(), &ErrorCode::NoSuchBucket);
    assert_eq!(mock.sent().len(), 1);

    let mock = MockHttpSend::new(move |n, _| {
        if n < 2 {
            Ok(xml(404, not_found))
        } else {
            Ok(xml(200, "<Ok/>"))
        }
    });
    pipeline(&mock, RetryConfig::default())
        .call(get_object().retry_not_found(true))
        .await
        .unwrap();
    assert_eq!(mock.sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_config() {
    let mock = MockHttpSend::always(503, "");
    let err = pipeline(&mock, RetryConfig::no_retry())
        .call(get_object())
        .await
        .unwrap_err();

    assert_eq!(err.code(), &ErrorCode::ServiceUnavailable);
    assert_eq!(mock.sent().len(), 1);
}
