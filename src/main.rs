use ddb_streaming_datalake::{app, config::Settings, telemetry, Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init_tracing(settings.log_format);

    let config = settings.consumer_sdk_config().await;
    let client = Client::new(&config);

    for path in app::run(client, settings).await? {
        println!("{}", path.display());
    }

    Ok(())
}
