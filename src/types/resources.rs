use super::{expr::Expr, policy::PolicyDocument};

use aws_sdk_dynamodb::types::{BillingMode, KeyType, ScalarAttributeType};
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::collections::BTreeMap;

/// A resource entry of a template: its type, properties and lifecycle attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    kind: ResourceKind,
    depends_on: Vec<String>,
    removal_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            depends_on: vec![],
            removal_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        let logical_id = logical_id.into();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
        }
        self
    }

    pub fn removal_policy(self, policy: RemovalPolicy) -> Self {
        Self {
            removal_policy: Some(policy),
            ..self
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn get_depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn get_removal_policy(&self) -> Option<RemovalPolicy> {
        self.removal_policy
    }
}

impl From<ResourceKind> for Resource {
    fn from(kind: ResourceKind) -> Self {
        Self::new(kind)
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Type", self.type_name())?;
        map.serialize_entry("Properties", &self.kind)?;
        if !self.depends_on.is_empty() {
            map.serialize_entry("DependsOn", &self.depends_on)?;
        }
        if let Some(policy) = self.removal_policy {
            map.serialize_entry("DeletionPolicy", &policy)?;
            map.serialize_entry("UpdateReplacePolicy", &policy)?;
        }
        map.end()
    }
}

/// What happens to a resource when it leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
}

macro_rules! resource_kinds {
    ($($variant:ident($props:ty) => $type_name:literal,)*) => {
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum ResourceKind {
            $($variant($props),)*
        }

        impl ResourceKind {
            /// The CloudFormation resource type.
            pub fn type_name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => $type_name,)*
                }
            }
        }

        $(
            impl From<$props> for ResourceKind {
                fn from(props: $props) -> Self {
                    Self::$variant(props)
                }
            }

            impl From<$props> for Resource {
                fn from(props: $props) -> Self {
                    Self::new(ResourceKind::$variant(props))
                }
            }
        )*
    };
}

resource_kinds! {
    Key(KeyProperties) => "AWS::KMS::Key",
    Alias(AliasProperties) => "AWS::KMS::Alias",
    Bucket(BucketProperties) => "AWS::S3::Bucket",
    BucketPolicy(BucketPolicyProperties) => "AWS::S3::BucketPolicy",
    Stream(StreamProperties) => "AWS::Kinesis::Stream",
    Table(TableProperties) => "AWS::DynamoDB::Table",
    Role(RoleProperties) => "AWS::IAM::Role",
    Function(FunctionProperties) => "AWS::Lambda::Function",
    LogGroup(LogGroupProperties) => "AWS::Logs::LogGroup",
    DeliveryStream(DeliveryStreamProperties) => "AWS::KinesisFirehose::DeliveryStream",
    GlueJob(GlueJobProperties) => "AWS::Glue::Job",
}

fn as_str<T: AsRef<str>, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_ref())
}

// KMS

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    pub enable_key_rotation: bool,
    pub key_policy: PolicyDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AliasProperties {
    pub alias_name: String,
    pub target_key_id: Expr,
}

// S3

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketProperties {
    pub bucket_name: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_control: Option<String>,
    pub public_access_block_configuration: PublicAccessBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_encryption: Option<BucketEncryption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketEncryption {
    pub server_side_encryption_configuration: Vec<ServerSideEncryptionRule>,
}

impl BucketEncryption {
    pub fn kms(key_arn: Expr) -> Self {
        Self {
            server_side_encryption_configuration: vec![ServerSideEncryptionRule {
                server_side_encryption_by_default: ServerSideEncryptionByDefault {
                    sse_algorithm: "aws:kms".to_string(),
                    kms_master_key_id: key_arn,
                },
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerSideEncryptionRule {
    pub server_side_encryption_by_default: ServerSideEncryptionByDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSideEncryptionByDefault {
    #[serde(rename = "SSEAlgorithm")]
    pub sse_algorithm: String,
    #[serde(rename = "KMSMasterKeyID")]
    pub kms_master_key_id: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicyProperties {
    pub bucket: Expr,
    pub policy_document: PolicyDocument,
}

// Kinesis

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamProperties {
    pub name: String,
    pub shard_count: u32,
    pub retention_period_hours: u32,
    pub stream_encryption: StreamEncryption,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamEncryption {
    pub encryption_type: String,
    pub key_id: Expr,
}

impl StreamEncryption {
    pub fn kms(key_arn: Expr) -> Self {
        Self {
            encryption_type: "KMS".to_string(),
            key_id: key_arn,
        }
    }
}

// DynamoDB

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableProperties {
    pub table_name: String,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(serialize_with = "as_str")]
    pub billing_mode: BillingMode,
    pub point_in_time_recovery_specification: PointInTimeRecoverySpecification,
    #[serde(rename = "SSESpecification")]
    pub sse_specification: SseSpecification,
    pub kinesis_stream_specification: KinesisStreamSpecification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    pub attribute_name: String,
    #[serde(serialize_with = "as_str")]
    pub attribute_type: ScalarAttributeType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    pub attribute_name: String,
    #[serde(serialize_with = "as_str")]
    pub key_type: KeyType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PointInTimeRecoverySpecification {
    pub point_in_time_recovery_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SseSpecification {
    #[serde(rename = "SSEEnabled")]
    pub sse_enabled: bool,
    #[serde(rename = "SSEType")]
    pub sse_type: String,
    #[serde(rename = "KMSMasterKeyId")]
    pub kms_master_key_id: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KinesisStreamSpecification {
    pub stream_arn: Expr,
}

// IAM

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleProperties {
    pub role_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<Expr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<InlinePolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InlinePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

impl InlinePolicy {
    pub fn new(name: impl Into<String>, document: PolicyDocument) -> Self {
        Self {
            policy_name: name.into(),
            policy_document: document,
        }
    }
}

// Lambda

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionProperties {
    pub function_name: String,
    pub description: String,
    pub runtime: String,
    pub handler: String,
    pub role: Expr,
    pub timeout: u32,
    pub memory_size: u32,
    pub architectures: Vec<String>,
    pub code: FunctionCode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCode {
    #[serde(rename = "S3Bucket")]
    pub s3_bucket: Expr,
    #[serde(rename = "S3Key")]
    pub s3_key: Expr,
}

// CloudWatch Logs

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogGroupProperties {
    pub log_group_name: String,
    pub retention_in_days: u32,
}

// Kinesis Data Firehose

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryStreamProperties {
    pub delivery_stream_name: String,
    pub delivery_stream_type: DeliveryStreamType,
    pub kinesis_stream_source_configuration: KinesisStreamSourceConfiguration,
    pub extended_s3_destination_configuration: ExtendedS3DestinationConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryStreamType {
    KinesisStreamAsSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KinesisStreamSourceConfiguration {
    #[serde(rename = "KinesisStreamARN")]
    pub kinesis_stream_arn: Expr,
    #[serde(rename = "RoleARN")]
    pub role_arn: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedS3DestinationConfiguration {
    #[serde(rename = "BucketARN")]
    pub bucket_arn: Expr,
    pub buffering_hints: BufferingHints,
    pub cloud_watch_logging_options: CloudWatchLoggingOptions,
    pub compression_format: CompressionFormat,
    pub encryption_configuration: EncryptionConfiguration,
    pub error_output_prefix: String,
    pub prefix: String,
    #[serde(rename = "RoleARN")]
    pub role_arn: Expr,
    pub processing_configuration: ProcessingConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferingHints {
    #[serde(rename = "IntervalInSeconds")]
    pub interval_in_seconds: u32,
    #[serde(rename = "SizeInMBs")]
    pub size_in_mbs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloudWatchLoggingOptions {
    pub enabled: bool,
    pub log_group_name: String,
    pub log_stream_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompressionFormat {
    #[serde(rename = "GZIP")]
    Gzip,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncryptionConfiguration {
    #[serde(rename = "KMSEncryptionConfig")]
    pub kms_encryption_config: KmsEncryptionConfig,
}

impl EncryptionConfiguration {
    pub fn kms(key_arn: Expr) -> Self {
        Self {
            kms_encryption_config: KmsEncryptionConfig {
                awskms_key_arn: key_arn,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KmsEncryptionConfig {
    #[serde(rename = "AWSKMSKeyARN")]
    pub awskms_key_arn: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessingConfiguration {
    pub enabled: bool,
    pub processors: Vec<Processor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Processor {
    #[serde(rename = "Type")]
    pub processor_type: String,
    pub parameters: Vec<ProcessorParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessorParameter {
    pub parameter_name: ProcessorParameterName,
    pub parameter_value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessorParameterName {
    LambdaArn,
    NumberOfRetries,
    #[serde(rename = "BufferSizeInMBs")]
    BufferSizeInMbs,
    BufferIntervalInSeconds,
}

// Glue

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlueJobProperties {
    pub name: String,
    pub role: Expr,
    pub glue_version: String,
    pub worker_type: String,
    pub number_of_workers: u32,
    pub default_arguments: BTreeMap<String, Expr>,
    pub command: JobCommand,
    pub execution_property: ExecutionProperty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobCommand {
    pub name: String,
    pub python_version: String,
    pub script_location: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionProperty {
    pub max_concurrent_runs: u32,
}
