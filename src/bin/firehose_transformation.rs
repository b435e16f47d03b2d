use ddb_streaming_datalake::{
    config::LogFormat,
    telemetry,
    transform::{self, FirehoseEvent, FirehoseResponse},
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::debug;

async fn handler(event: LambdaEvent<FirehoseEvent>) -> Result<FirehoseResponse, Error> {
    let (event, _context) = event.into_parts();
    debug!(
        "Invocation {} with {} records",
        event.invocation_id,
        event.records.len()
    );

    Ok(transform::transform_event(event, chrono::Utc::now()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init_tracing(LogFormat::Json);
    run(service_fn(handler)).await
}
