mod common;

use common::{
    count_of_type, settings, settings_in, statements, FakeIdentityClient, CONSUMER_ACCOUNT,
    CONSUMER_KEY_ARN, PRODUCER_ACCOUNT,
};
use ddb_streaming_datalake::{
    app::{self, Synthesizer},
    stack::Assembly,
    Error,
};
use serde_json::{json, Value};
use std::fs;

async fn synth(vars: &[(&str, &str)]) -> Assembly {
    Synthesizer::new(FakeIdentityClient::new(CONSUMER_ACCOUNT), settings(vars))
        .synth()
        .await
        .unwrap()
}

fn template(assembly: &Assembly, name: &str) -> Value {
    serde_json::to_value(assembly.stack(name).unwrap().template()).unwrap()
}

#[tokio::test]
async fn producer_has_one_table_stream_and_delivery_per_destination() {
    let assembly = synth(&[]).await;
    let producer = template(&assembly, "dynamodb-streaming-datalake-demo");

    assert_eq!(count_of_type(&producer, "AWS::DynamoDB::Table"), 1);
    assert_eq!(count_of_type(&producer, "AWS::Kinesis::Stream"), 1);
    assert_eq!(
        count_of_type(&producer, "AWS::KinesisFirehose::DeliveryStream"),
        2
    );
    assert_eq!(count_of_type(&producer, "AWS::Lambda::Function"), 1);

    let consumer = template(&assembly, "ConsumerStack");
    assert_eq!(count_of_type(&consumer, "AWS::S3::Bucket"), 1);
    assert_eq!(count_of_type(&consumer, "AWS::Glue::Job"), 1);
}

#[tokio::test]
async fn cross_account_statements_are_scoped_to_a_role() {
    let assembly = synth(&[]).await;

    for stack in assembly.stacks() {
        let own_account = format!("iam::{}:", stack.env().account());
        let template = serde_json::to_value(stack.template()).unwrap();

        let foreign = statements(&template)
            .into_iter()
            .filter(|statement| {
                statement["Principal"]["AWS"]["Fn::Sub"]
                    .as_str()
                    .is_some_and(|arn| !arn.contains(&own_account))
            })
            .collect::<Vec<&Value>>();
        assert!(!foreign.is_empty(), "{} has no cross-account grant", stack.name());

        for statement in foreign {
            let role = statement["Condition"]["ArnEquals"]["aws:PrincipalArn"]["Fn::Sub"]
                .as_str()
                .unwrap_or_default();
            assert!(
                role.contains(":role/"),
                "unscoped cross-account statement in {}: {statement}",
                stack.name()
            );
        }
    }
}

#[tokio::test]
async fn bucket_names_are_derived_from_accounts() {
    let assembly = synth(&[]).await;

    let producer = template(&assembly, "dynamodb-streaming-datalake-demo");
    assert_eq!(
        producer["Resources"]["DatalakeBucket"]["Properties"]["BucketName"],
        json!(format!("dynamodb-streaming-datalake-{PRODUCER_ACCOUNT}"))
    );

    let consumer = template(&assembly, "ConsumerStack");
    assert_eq!(
        consumer["Resources"]["ConsumerBucket"]["Properties"]["BucketName"],
        json!(format!("dynamodb-streaming-datalake-{CONSUMER_ACCOUNT}"))
    );
    assert_eq!(
        producer["Resources"]["DynamoDBCrossAccountFirehose"]["Properties"]
            ["ExtendedS3DestinationConfiguration"]["BucketARN"],
        json!({
            "Fn::Sub": format!("arn:${{AWS::Partition}}:s3:::dynamodb-streaming-datalake-{CONSUMER_ACCOUNT}")
        })
    );
}

#[tokio::test]
async fn cross_account_delivery_encrypts_with_a_key_arn() {
    let assembly = synth(&[]).await;
    let producer = template(&assembly, "dynamodb-streaming-datalake-demo");

    let key = &producer["Resources"]["DynamoDBCrossAccountFirehose"]["Properties"]
        ["ExtendedS3DestinationConfiguration"]["EncryptionConfiguration"]["KMSEncryptionConfig"]
        ["AWSKMSKeyARN"];
    assert_eq!(key, &json!(CONSUMER_KEY_ARN));
    assert!(key.as_str().unwrap().contains(":key/"));
    assert!(!producer.to_string().contains(&format!("{CONSUMER_ACCOUNT}:alias/")));
}

#[tokio::test]
async fn supplied_bucket_is_reused() {
    let assembly = synth(&[("DATALAKE_BUCKET_NAME", "my-datalake")]).await;
    let producer = template(&assembly, "dynamodb-streaming-datalake-demo");

    assert!(producer["Resources"].get("DatalakeBucket").is_none());
    assert_eq!(
        producer["Outputs"]["DatalakeBucketArn"]["Value"],
        json!({ "Fn::Sub": "arn:${AWS::Partition}:s3:::my-datalake" })
    );
}

#[tokio::test]
async fn producer_and_consumer_agree_on_role_names() {
    let assembly = synth(&[
        ("CROSS_ACCOUNT_FIREHOSE_ROLE_NAME", "cross-firehose"),
        ("DDB_READ_ROLE_NAME", "ddb-reader"),
    ])
    .await;
    let producer = template(&assembly, "dynamodb-streaming-datalake-demo");
    let consumer = template(&assembly, "ConsumerStack");

    assert_eq!(
        producer["Resources"]["CrossAccountFirehoseRole"]["Properties"]["RoleName"],
        json!("cross-firehose")
    );
    assert_eq!(
        consumer["Resources"]["ConsumerBucketPolicy"]["Properties"]["PolicyDocument"]
            ["Statement"][0]["Condition"]["ArnEquals"]["aws:PrincipalArn"],
        json!({ "Fn::Sub": format!("arn:${{AWS::Partition}}:iam::{PRODUCER_ACCOUNT}:role/cross-firehose") })
    );
    assert_eq!(
        consumer["Resources"]["DdbGlueJob"]["Properties"]["DefaultArguments"]
            ["--PRODUCER_DYNAMODB_READ_ROLE_NAME"],
        json!("ddb-reader")
    );
}

#[tokio::test]
async fn failed_resolution_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    let output_dir = settings.output_dir.clone();

    let err = app::run(FakeIdentityClient::failing(), settings)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFoundAccount));
    assert!(!output_dir.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn run_writes_both_templates_and_the_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    let output_dir = settings.output_dir.clone();

    let written = app::run(FakeIdentityClient::new(CONSUMER_ACCOUNT), settings)
        .await
        .unwrap();

    let mut names = written
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
        .collect::<Vec<String>>();
    names.sort();
    assert_eq!(
        names,
        vec![
            "ConsumerStack.template.json",
            "dynamodb-streaming-datalake-demo.template.json",
            "manifest.json",
        ]
    );

    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(output_dir.join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(
        manifest["stacks"]["ConsumerStack"]["account"],
        json!(CONSUMER_ACCOUNT)
    );
}

#[tokio::test]
async fn synthesis_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    let synthesizer = Synthesizer::new(FakeIdentityClient::new(CONSUMER_ACCOUNT), settings);

    let first = synthesizer.synth().await.unwrap();
    let paths = first.write_to(&synthesizer.settings().output_dir).unwrap();
    let written = paths
        .iter()
        .map(|path| fs::read_to_string(path).unwrap())
        .collect::<Vec<String>>();

    let second = synthesizer.synth().await.unwrap();
    assert_eq!(first, second);

    second.write_to(&synthesizer.settings().output_dir).unwrap();
    let rewritten = paths
        .iter()
        .map(|path| fs::read_to_string(path).unwrap())
        .collect::<Vec<String>>();
    assert_eq!(written, rewritten);
}
