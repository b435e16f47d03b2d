mod common;

use common::{settings_in, unreachable_sdk_config};
use ddb_streaming_datalake::{app, Client, Error, IdentityClient};

#[tokio::test]
async fn unreachable_identity_service_is_an_sdk_error() {
    let client = Client::new(&unreachable_sdk_config());

    let err = client.get_account_id().await.unwrap_err();
    assert!(matches!(err, Error::SdkError(_)));
}

#[tokio::test]
async fn unreachable_key_service_is_an_sdk_error() {
    let client = Client::new(&unreachable_sdk_config());

    let err = client
        .get_key_arn("alias/ConsumerBucketKmsKey")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SdkError(_)));
}

#[tokio::test]
async fn unreachable_identity_service_stops_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    let output_dir = settings.output_dir.clone();
    let client = Client::new(&unreachable_sdk_config());

    let result = app::run(client, settings).await;

    assert!(matches!(result, Err(Error::SdkError(_))));
    assert!(!output_dir.exists());
}
