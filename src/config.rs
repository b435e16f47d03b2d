use super::{
    error::Error,
    stack::{
        consumer::{self, ConsumerStackBuilder},
        datalake_bucket_name, normalize_prefix,
        processor::{CodeLocation, DEFAULT_CODE_KEY},
        producer::{self, CrossAccount, ProducerStackBuilder},
        KeyReference, StackEnv,
    },
};

use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};
use std::{env, path::PathBuf, str::FromStr};

pub const DEFAULT_OUTPUT_DIR: &str = "synth.out";

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Everything a synthesis run is parameterized by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub account: String,
    pub region: Option<String>,
    pub producer_stack_name: String,
    pub consumer_stack_name: String,
    pub datalake_bucket_name: Option<String>,
    pub datalake_bucket_key: KeyReference,
    pub create_kinesis_key: bool,
    pub table_name: String,
    pub firehose_role_name: String,
    pub cross_account_firehose_role_name: String,
    pub ddb_read_role_name: String,
    pub glue_job_role_name: String,
    pub s3_prefix: String,
    pub consumer_profile: Option<String>,
    pub consumer_region: Option<String>,
    pub consumer_bucket_key_id: Option<String>,
    /// Only synthesize the consumer stack. Its key has to exist before the
    /// producer stack can be synthesized.
    pub consumer_only: bool,
    pub transform_code: CodeLocation,
    pub output_dir: PathBuf,
    pub log_format: LogFormat,
}

impl Settings {
    /// Read the settings from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let account = var("CDK_DEFAULT_ACCOUNT")
            .ok_or_else(|| Error::MissingEnv("CDK_DEFAULT_ACCOUNT".to_string()))?;
        let region = var("CDK_DEFAULT_REGION");

        let datalake_bucket_key = match var("DATALAKE_BUCKET_KEY_ARN") {
            Some(arn) => KeyReference::Arn(arn),
            None => KeyReference::Alias(or(
                "DATALAKE_BUCKET_KEY_ALIAS",
                producer::DEFAULT_DATALAKE_KEY_ALIAS,
            )),
        };

        let create_kinesis_key = match var("CREATE_KINESIS_KEY") {
            Some(value) => parse_bool("CREATE_KINESIS_KEY", &value)?,
            None => true,
        };

        let consumer_only = match var("SYNTH_CONSUMER_ONLY") {
            Some(value) => parse_bool("SYNTH_CONSUMER_ONLY", &value)?,
            None => false,
        };

        let log_format = match var("LOG_FORMAT") {
            Some(value) => value.parse().map_err(|_| Error::InvalidEnv {
                name: "LOG_FORMAT".to_string(),
                value,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            consumer_region: var("CONSUMER_REGION").or_else(|| region.clone()),
            account,
            region,
            producer_stack_name: or("PRODUCER_STACK_NAME", producer::DEFAULT_STACK_NAME),
            consumer_stack_name: or("CONSUMER_STACK_NAME", consumer::DEFAULT_STACK_NAME),
            datalake_bucket_name: var("DATALAKE_BUCKET_NAME"),
            datalake_bucket_key,
            create_kinesis_key,
            table_name: or("DDB_TABLE_NAME", producer::DEFAULT_TABLE_NAME),
            firehose_role_name: or("FIREHOSE_ROLE_NAME", producer::DEFAULT_FIREHOSE_ROLE_NAME),
            cross_account_firehose_role_name: or(
                "CROSS_ACCOUNT_FIREHOSE_ROLE_NAME",
                producer::DEFAULT_CROSS_ACCOUNT_FIREHOSE_ROLE_NAME,
            ),
            ddb_read_role_name: or("DDB_READ_ROLE_NAME", producer::DEFAULT_DDB_READ_ROLE_NAME),
            glue_job_role_name: or("GLUE_JOB_ROLE_NAME", producer::DEFAULT_GLUE_JOB_ROLE_NAME),
            s3_prefix: normalize_prefix(&var("S3_PREFIX").unwrap_or_default()),
            consumer_profile: var("CONSUMER_PROFILE"),
            consumer_bucket_key_id: var("CONSUMER_BUCKET_KEY_ID"),
            consumer_only,
            transform_code: CodeLocation {
                bucket: var("TRANSFORM_CODE_BUCKET"),
                key: or("TRANSFORM_CODE_KEY", DEFAULT_CODE_KEY),
            },
            output_dir: PathBuf::from(or("SYNTH_OUTPUT_DIR", DEFAULT_OUTPUT_DIR)),
            log_format,
        })
    }

    /// SDK config used to resolve the consumer account and bucket key. Failed
    /// calls are not retried.
    pub async fn consumer_sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::disabled());

        if let Some(profile) = self.consumer_profile.as_deref() {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = self.consumer_region.clone() {
            loader = loader.region(Region::new(region));
        }

        loader.load().await
    }

    pub fn producer_env(&self) -> StackEnv {
        StackEnv::new(self.account.as_str(), self.region.clone())
    }

    pub fn consumer_env(&self, consumer_account: &str) -> StackEnv {
        StackEnv::new(consumer_account, self.consumer_region.clone())
    }

    /// Producer stack delivering into `consumer_account` as well, encrypted
    /// with `consumer_bucket_key`.
    pub fn producer_stack(
        &self,
        consumer_account: &str,
        consumer_bucket_key: KeyReference,
    ) -> ProducerStackBuilder {
        let cross_account = CrossAccount {
            account_id: consumer_account.to_string(),
            region: self.consumer_region.clone(),
            bucket_name: datalake_bucket_name(consumer_account),
            bucket_key: consumer_bucket_key,
            firehose_role_name: self.cross_account_firehose_role_name.clone(),
            ddb_read_role_name: self.ddb_read_role_name.clone(),
            glue_job_role_name: self.glue_job_role_name.clone(),
        };

        producer::builder()
            .stack_name(self.producer_stack_name.as_str())
            .env(self.producer_env())
            .datalake_bucket_name(self.datalake_bucket_name.clone())
            .datalake_bucket_key(self.datalake_bucket_key.clone())
            .create_kinesis_key(self.create_kinesis_key)
            .table_name(self.table_name.as_str())
            .firehose_role_name(self.firehose_role_name.as_str())
            .s3_prefix(self.s3_prefix.as_str())
            .transform_code(self.transform_code.clone())
            .cross_account(Some(cross_account))
    }

    pub fn consumer_stack(&self, consumer_account: &str) -> ConsumerStackBuilder {
        consumer::builder()
            .stack_name(self.consumer_stack_name.as_str())
            .env(self.consumer_env(consumer_account))
            .datalake_bucket_name(datalake_bucket_name(consumer_account))
            .producer_account_id(self.account.as_str())
            .producer_region(self.region.clone())
            .producer_firehose_role_name(self.cross_account_firehose_role_name.as_str())
            .producer_ddb_read_role_name(self.ddb_read_role_name.as_str())
            .producer_ddb_table_name(self.table_name.as_str())
            .glue_job_role_name(self.glue_job_role_name.as_str())
            .s3_prefix(self.s3_prefix.as_str())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
