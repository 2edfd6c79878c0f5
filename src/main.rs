use aws_sdk_s3::Client;
use dataset_purger::{get_client, purge_event, PurgeConfig, PurgeEvent, PurgeResult};
use lambda_runtime::{run, service_fn, Error as LmdError, LambdaEvent};
use serde::Serialize;
use tracing::{error, info_span, Instrument};
use tracing_subscriber::EnvFilter;

/// Returned to the orchestrator, serialized to JSON by the runtime.
#[derive(Serialize)]
struct Response {
    request_id: String,
    #[serde(flatten)]
    result: PurgeResult,
}

async fn function_handler(client: &Client, config: &PurgeConfig, event: LambdaEvent<PurgeEvent>) -> Result<Response, LmdError> {
    let (payload, context) = event.into_parts();
    let span = info_span!(
        "purge",
        request_id = %context.request_id,
        service = %config.full_service_name()
    );

    match purge_event(client, config, payload).instrument(span).await {
        Ok(result) => Ok(Response {
            request_id: context.request_id,
            result,
        }),
        Err(err) => {
            error!(request_id = %context.request_id, error = %err, "rejected invocation");
            Err(err.into())
        }
    }
}

fn init_tracing(config: &PurgeConfig) -> Result<(), LmdError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level)?)
        // disable printing the name of the module in every log line.
        .with_target(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time();

    if config.log_json {
        builder.json().flatten_event(true).init();
    } else {
        builder.init();
    }
    Ok(())
}

//Lambda-main
#[tokio::main]
async fn main() -> Result<(), LmdError> {
    let config = PurgeConfig::from_env()?;
    init_tracing(&config)?;

    let client = get_client(&config).await;
    let client = &client;
    let config = &config;

    run(service_fn(move |event: LambdaEvent<PurgeEvent>| async move {
        function_handler(client, config, event).await
    }))
    .await
}
