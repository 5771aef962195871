use cloudcall_aws::{Config, RequestPipeline, Service};
use cloudcall_core::{Context, OsEnv};
use cloudcall_file_read_tokio::TokioFileRead;
use cloudcall_http_send_reqwest::ReqwestHttpSend;
use log::{debug, info};
use std::env;

/// Build a pipeline against the real service when `CLOUDCALL_AWS_TEST=on`.
fn init_live_pipeline() -> Option<RequestPipeline> {
    let _ = env_logger::builder().is_test(true).try_init();
    let _ = dotenv::dotenv();

    if env::var("CLOUDCALL_AWS_TEST").unwrap_or_default() != "on" {
        info!("CLOUDCALL_AWS_TEST not set, skipping");
        return None;
    }

    let ctx = Context::new()
        .with_file_read(TokioFileRead)
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);
    let config = Config::from_env(&ctx);
    Some(RequestPipeline::new(ctx, config))
}

#[tokio::test]
async fn test_live_caller_identity() -> anyhow::Result<()> {
    let Some(pipeline) = init_live_pipeline() else {
        return Ok(());
    };

    let identity = pipeline.caller_identity().await?;
    debug!("caller identity: {identity:?}");
    assert!(!identity.account_id.is_empty());
    assert!(identity.arn.starts_with("arn:aws"));

    let arn = pipeline.arn(Service::Sqs, "cloudcall-test").await?;
    assert!(arn.ends_with(&format!(":{}:cloudcall-test", identity.account_id)));
    Ok(())
}
