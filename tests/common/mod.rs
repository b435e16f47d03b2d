#![allow(dead_code)]

use async_trait::async_trait;
use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};
use aws_credential_types::{provider::SharedCredentialsProvider, Credentials};
use ddb_streaming_datalake::{config::Settings, Error, IdentityClient};
use serde_json::Value;
use std::{collections::HashMap, path::Path};
use ulid::Ulid;

pub const PRODUCER_ACCOUNT: &str = "111122223333";
pub const CONSUMER_ACCOUNT: &str = "444455556666";
pub const REGION: &str = "ap-northeast-1";
pub const CONSUMER_KEY_ARN: &str =
    "arn:aws:kms:ap-northeast-1:444455556666:key/0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";

/// Identity client answering without calling AWS. Every key resolves to
/// [`CONSUMER_KEY_ARN`].
#[derive(Debug, Clone)]
pub struct FakeIdentityClient {
    account: Option<String>,
}

impl FakeIdentityClient {
    pub fn new(account: &str) -> Self {
        Self {
            account: Some(account.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { account: None }
    }
}

#[async_trait]
impl IdentityClient for FakeIdentityClient {
    async fn get_account_id(&self) -> Result<String, Error> {
        self.account.clone().ok_or(Error::NotFoundAccount)
    }

    async fn get_key_arn(&self, _key_id: &str) -> Result<String, Error> {
        Ok(CONSUMER_KEY_ARN.to_string())
    }
}

pub fn settings(vars: &[(&str, &str)]) -> Settings {
    let mut env: HashMap<String, String> = HashMap::from([
        ("CDK_DEFAULT_ACCOUNT".to_string(), PRODUCER_ACCOUNT.to_string()),
        ("CDK_DEFAULT_REGION".to_string(), REGION.to_string()),
    ]);
    for (name, value) in vars {
        env.insert(name.to_string(), value.to_string());
    }

    Settings::from_lookup(|name| env.get(name).cloned()).unwrap()
}

pub fn settings_in(dir: &Path) -> Settings {
    let output_dir = dir.join("synth.out");
    settings(&[("SYNTH_OUTPUT_DIR", output_dir.to_str().unwrap())])
}

/// SDK config whose requests can never reach AWS.
pub fn unreachable_sdk_config() -> SdkConfig {
    let creds = Credentials::from_keys(Ulid::new(), Ulid::new(), None);
    let creds_provider = SharedCredentialsProvider::new(creds);

    SdkConfig::builder()
        .endpoint_url("http://127.0.0.1:1")
        .credentials_provider(creds_provider)
        .retry_config(RetryConfig::disabled())
        .behavior_version(BehaviorVersion::latest())
        .region(Some(Region::from_static("us-east-1")))
        .build()
}

/// Every policy statement found anywhere in a template.
pub fn statements(template: &Value) -> Vec<&Value> {
    let mut found = vec![];
    collect_statements(template, &mut found);
    found
}

fn collect_statements<'a>(value: &'a Value, found: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(statements)) = map.get("Statement") {
                found.extend(statements.iter());
            }
            map.values()
                .for_each(|value| collect_statements(value, found));
        }
        Value::Array(values) => values
            .iter()
            .for_each(|value| collect_statements(value, found)),
        _ => {}
    }
}

pub fn count_of_type(template: &Value, type_name: &str) -> usize {
    template["Resources"]
        .as_object()
        .map(|resources| {
            resources
                .values()
                .filter(|resource| resource["Type"] == type_name)
                .count()
        })
        .unwrap_or(0)
}
