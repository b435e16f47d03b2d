//! The producer account half of the pipeline.
//!
//! A DynamoDB table streams its changes into a Kinesis data stream, and one or
//! two Firehose delivery streams read that stream, run every batch through the
//! [`JsonProcessor`] and land the result in S3. The second delivery stream
//! writes into a bucket of another account and is only declared when
//! [`ProducerStackBuilder::cross_account`] is set.

use super::{
    alias_name, datalake_bucket_name, declare_key, normalize_prefix,
    processor::{CodeLocation, JsonProcessor},
    Error, KeyOptions, KeyReference, KeyUsage, ResourceRef, Stack, StackEnv, DEFAULT_S3_PREFIX,
    KMS_ACTIONS,
};
use crate::types::{
    expr::{bucket_arn, managed_policy_arn, ACCOUNT_ID, PARTITION, REGION},
    policy::{PolicyDocument, Principal, Statement},
    resources::{
        AttributeDefinition, BucketProperties, BufferingHints, CloudWatchLoggingOptions,
        CompressionFormat, DeliveryStreamProperties, DeliveryStreamType, EncryptionConfiguration,
        ExtendedS3DestinationConfiguration, InlinePolicy, KeySchemaElement,
        KinesisStreamSourceConfiguration, KinesisStreamSpecification, LogGroupProperties,
        PointInTimeRecoverySpecification, ProcessingConfiguration, Processor, ProcessorParameter,
        ProcessorParameterName, PublicAccessBlock, RoleProperties, SseSpecification,
        StreamEncryption, StreamProperties, TableProperties,
    },
    Expr, RemovalPolicy, Resource,
};

use aws_sdk_dynamodb::types::{BillingMode, KeyType, ScalarAttributeType};
use tracing::debug;

pub const DEFAULT_STACK_NAME: &str = "dynamodb-streaming-datalake-demo";
pub const DEFAULT_TABLE_NAME: &str = "ddb-streaming-datalake-table";
pub const DEFAULT_FIREHOSE_ROLE_NAME: &str = "firehose-dbstream-role";
pub const DEFAULT_DATALAKE_KEY_ALIAS: &str = "alias/DataLake";
pub const DEFAULT_CROSS_ACCOUNT_FIREHOSE_ROLE_NAME: &str = "firehose-cross-account-dbstream-role";
pub const DEFAULT_DDB_READ_ROLE_NAME: &str = "ddb-cross-account-read-role";
pub const DEFAULT_GLUE_JOB_ROLE_NAME: &str = "ddb-cross-account-glue-job-role";

pub const KINESIS_KEY_ALIAS: &str = "alias/kinesis-exclusive-key";
pub const STREAM_NAME: &str = "ddb-exclusive-stream";
pub const DELIVERY_STREAM_NAME: &str = "ddb-table-firehose-delivery-stream";
pub const CROSS_ACCOUNT_DELIVERY_STREAM_NAME: &str =
    "ddb-table-firehose-cross-account-delivery-stream";

const SHARD_COUNT: u32 = 10;
const STREAM_RETENTION_HOURS: u32 = 24;
const LOG_RETENTION_DAYS: u32 = 90;
const LOG_STREAM_NAME: &str = "S3Delivery";
const PARTITION_KEY: &str = "id";
const SORT_KEY: &str = "name";

/// Create [`ProducerStackBuilder`].
pub fn builder() -> ProducerStackBuilder {
    ProducerStackBuilder::new()
}

/// The consumer account a second delivery stream writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossAccount {
    pub account_id: String,
    /// Region of the consumer bucket and key. `None` means the producer's region.
    pub region: Option<String>,
    pub bucket_name: String,
    /// Key of the consumer bucket. Firehose cannot encrypt with an alias of
    /// another account, so it has to be an ARN or a key id.
    pub bucket_key: KeyReference,
    /// Name of the producer role the cross-account delivery stream assumes.
    /// The consumer stack trusts this name.
    pub firehose_role_name: String,
    /// Name of the producer role the consumer's Glue job assumes to read the table.
    pub ddb_read_role_name: String,
    /// Name of the consumer's Glue job role.
    pub glue_job_role_name: String,
}

#[derive(Debug, Clone)]
pub struct ProducerStackBuilder {
    stack_name: String,
    env: Option<StackEnv>,
    datalake_bucket_name: Option<String>,
    datalake_bucket_key: KeyReference,
    create_kinesis_key: bool,
    table_name: String,
    firehose_role_name: String,
    s3_prefix: String,
    transform_code: CodeLocation,
    cross_account: Option<CrossAccount>,
}

impl ProducerStackBuilder {
    pub fn new() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            env: None,
            datalake_bucket_name: None,
            datalake_bucket_key: KeyReference::Alias(DEFAULT_DATALAKE_KEY_ALIAS.to_string()),
            create_kinesis_key: true,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            firehose_role_name: DEFAULT_FIREHOSE_ROLE_NAME.to_string(),
            s3_prefix: DEFAULT_S3_PREFIX.to_string(),
            transform_code: CodeLocation::default(),
            cross_account: None,
        }
    }

    pub fn stack_name(self, stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            ..self
        }
    }

    pub fn env(self, env: StackEnv) -> Self {
        Self {
            env: Some(env),
            ..self
        }
    }

    /// Reuse an existing bucket instead of declaring one.
    pub fn datalake_bucket_name(self, name: Option<String>) -> Self {
        Self {
            datalake_bucket_name: name,
            ..self
        }
    }

    pub fn datalake_bucket_key(self, key: KeyReference) -> Self {
        Self {
            datalake_bucket_key: key,
            ..self
        }
    }

    /// Declare a dedicated key for the table, the stream and the processor.
    /// Otherwise the data lake bucket key is used for them too.
    pub fn create_kinesis_key(self, create_kinesis_key: bool) -> Self {
        Self {
            create_kinesis_key,
            ..self
        }
    }

    pub fn table_name(self, table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..self
        }
    }

    pub fn firehose_role_name(self, role_name: impl Into<String>) -> Self {
        Self {
            firehose_role_name: role_name.into(),
            ..self
        }
    }

    /// Key prefix of delivered objects. Surrounding slashes are dropped.
    pub fn s3_prefix(self, s3_prefix: impl AsRef<str>) -> Self {
        Self {
            s3_prefix: normalize_prefix(s3_prefix.as_ref()),
            ..self
        }
    }

    pub fn transform_code(self, transform_code: CodeLocation) -> Self {
        Self {
            transform_code,
            ..self
        }
    }

    pub fn cross_account(self, cross_account: Option<CrossAccount>) -> Self {
        Self {
            cross_account,
            ..self
        }
    }

    pub fn build(self) -> Result<Stack, Error> {
        let env = self.env.clone().ok_or(Error::MissingProperty("env"))?;
        let account = env.account().to_string();

        let mut stack = Stack::new(self.stack_name.as_str(), env);
        stack.set_description(
            "DynamoDB change capture delivered to an S3 data lake through Kinesis and Firehose",
        );

        if let Some(KeyReference::Alias(alias)) =
            self.cross_account.as_ref().map(|cross| &cross.bucket_key)
        {
            return Err(Error::CrossAccountKeyAlias(alias_name(alias)));
        }

        let datalake_key = KeyUsage::external(&self.datalake_bucket_key, None, &account);
        let kinesis_key = if self.create_kinesis_key {
            let key = declare_key(
                &mut stack,
                KeyOptions {
                    logical_id: "KinesisKmsKey",
                    alias: KINESIS_KEY_ALIAS,
                    description: Some(
                        "KMS Key for the Kinesis family, i.e., Data Streams and Firehose",
                    ),
                    rotation: false,
                    grants: vec![],
                },
            )?;
            KeyUsage::declared(&key)
        } else {
            datalake_key.clone()
        };

        let datalake_bucket_arn = match self.datalake_bucket_name.as_deref() {
            Some(name) => {
                debug!("Reusing data lake bucket {name}");
                bucket_arn(name)
            }
            None => {
                let name = datalake_bucket_name(&account);
                debug!("Declaring data lake bucket {name}");
                stack
                    .add_resource(
                        "DatalakeBucket",
                        BucketProperties {
                            bucket_name: Expr::literal(name),
                            access_control: None,
                            public_access_block_configuration: PublicAccessBlock::block_all(),
                            bucket_encryption: None,
                        },
                    )?
                    .arn()
            }
        };

        let stream = stack.add_resource(
            "DynamoDBStream",
            StreamProperties {
                name: STREAM_NAME.to_string(),
                shard_count: SHARD_COUNT,
                retention_period_hours: STREAM_RETENTION_HOURS,
                stream_encryption: StreamEncryption::kms(kinesis_key.arn().clone()),
            },
        )?;

        let processor = JsonProcessor::declare(&mut stack, &kinesis_key, &self.transform_code)?;
        let table = self.declare_table(&mut stack, &stream, kinesis_key.arn())?;

        let source = Source {
            stream_arn: stream.arn(),
            function_arn: processor.function_arn(),
            prefix: format!(
                "{}/{}/!{{timestamp:yyyy/MM/dd/HH}}/",
                self.s3_prefix, self.table_name
            ),
            error_prefix: format!(
                "error/{}/{}/result=!{{firehose:error-output-type}}/!{{timestamp:yyyy/MM/dd/HH}}/",
                self.s3_prefix, self.table_name
            ),
            s3_prefix: self.s3_prefix.clone(),
        };

        let same_account = Delivery {
            log_group_id: "FirehoseLogGroup",
            role_id: "FirehoseDeliveryRole",
            stream_id: "DynamoDBFirehose",
            stream_name: DELIVERY_STREAM_NAME,
            role_name: &self.firehose_role_name,
            role_description: "Role for Firehose to deliver data to S3",
            bucket_arn: datalake_bucket_arn.clone(),
            destination_key: datalake_key.clone(),
            source_key: kinesis_key.clone(),
        }
        .declare(&mut stack, &source)?;

        let cross_account = match &self.cross_account {
            Some(cross) => {
                debug!("Declaring cross-account delivery into {}", cross.account_id);
                let region = cross.region.as_deref();
                let destination_key = KeyUsage::external(&cross.bucket_key, region, &cross.account_id);
                let delivery = Delivery {
                    log_group_id: "FirehoseCrossAccountLogGroup",
                    role_id: "CrossAccountFirehoseRole",
                    stream_id: "DynamoDBCrossAccountFirehose",
                    stream_name: CROSS_ACCOUNT_DELIVERY_STREAM_NAME,
                    role_name: &cross.firehose_role_name,
                    role_description:
                        "A role for Firehose to deliver data to S3 for another AWS account.",
                    bucket_arn: bucket_arn(&cross.bucket_name),
                    destination_key,
                    source_key: kinesis_key.clone(),
                }
                .declare(&mut stack, &source)?;
                let read_role = declare_ddb_read_role(&mut stack, cross, &kinesis_key)?;
                Some((delivery, read_role))
            }
            None => None,
        };

        stack.add_output(
            "DatalakeBucketArn",
            datalake_bucket_arn,
            Some("Datalake Bucket ARN"),
        )?;
        stack.add_output(
            "DdbStreamArn",
            stream.arn(),
            Some("The ARN of the Kinesis Stream for DynamoDB"),
        )?;
        stack.add_output(
            "SameAccountDeliveryStreamArn",
            same_account.stream.arn(),
            Some("The ARN of the Firehose Delivery Stream for the same account"),
        )?;
        stack.add_output("DataLakeBucketKeyArn", datalake_key.arn().clone(), None)?;
        stack.add_output(
            "DdbTableArn",
            table.arn(),
            Some("The ARN of the DynamoDB table"),
        )?;
        stack.add_output(
            "FirehoseRoleArn",
            same_account.role.arn(),
            Some("The ARN of the Firehose Delivery Role"),
        )?;
        stack.add_output(
            "FirehoseRoleId",
            same_account.role.attr("RoleId"),
            Some("The ID of the Firehose Delivery Role"),
        )?;

        if let Some((delivery, read_role)) = cross_account {
            stack.add_output(
                "CrossAccountDeliveryStreamArn",
                delivery.stream.arn(),
                Some("The ARN of the Firehose Delivery Stream for the cross account"),
            )?;
            stack.add_output(
                "DdbCrossAccountRoleArn",
                read_role.arn(),
                Some("The ARN of the DynamoDB read role for the cross account"),
            )?;
        }

        Ok(stack)
    }

    fn declare_table(
        &self,
        stack: &mut Stack,
        stream: &ResourceRef,
        key_arn: &Expr,
    ) -> Result<ResourceRef, Error> {
        let table = TableProperties {
            table_name: self.table_name.clone(),
            attribute_definitions: vec![
                AttributeDefinition {
                    attribute_name: PARTITION_KEY.to_string(),
                    attribute_type: ScalarAttributeType::S,
                },
                AttributeDefinition {
                    attribute_name: SORT_KEY.to_string(),
                    attribute_type: ScalarAttributeType::S,
                },
            ],
            key_schema: vec![
                KeySchemaElement {
                    attribute_name: PARTITION_KEY.to_string(),
                    key_type: KeyType::Hash,
                },
                KeySchemaElement {
                    attribute_name: SORT_KEY.to_string(),
                    key_type: KeyType::Range,
                },
            ],
            billing_mode: BillingMode::PayPerRequest,
            point_in_time_recovery_specification: PointInTimeRecoverySpecification {
                point_in_time_recovery_enabled: true,
            },
            sse_specification: SseSpecification {
                sse_enabled: true,
                sse_type: "KMS".to_string(),
                kms_master_key_id: key_arn.clone(),
            },
            kinesis_stream_specification: KinesisStreamSpecification {
                stream_arn: stream.arn(),
            },
        };

        stack.add_resource(
            "ChangeCaptureTable",
            Resource::from(table).removal_policy(RemovalPolicy::Retain),
        )
    }
}

impl Default for ProducerStackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What every delivery stream of the stack reads from and how it names objects.
struct Source {
    stream_arn: Expr,
    function_arn: Expr,
    s3_prefix: String,
    prefix: String,
    error_prefix: String,
}

/// One Firehose delivery stream with its role and log group.
struct Delivery<'a> {
    log_group_id: &'a str,
    role_id: &'a str,
    stream_id: &'a str,
    stream_name: &'a str,
    role_name: &'a str,
    role_description: &'a str,
    bucket_arn: Expr,
    destination_key: KeyUsage,
    /// Key of the Kinesis stream the delivery reads from.
    source_key: KeyUsage,
}

struct DeclaredDelivery {
    role: ResourceRef,
    stream: ResourceRef,
}

impl Delivery<'_> {
    fn declare(self, stack: &mut Stack, source: &Source) -> Result<DeclaredDelivery, Error> {
        let log_group_name = format!("/aws/kinesisfirehose/{}", self.stream_name);
        let log_group = stack.add_resource(
            self.log_group_id,
            Resource::from(LogGroupProperties {
                log_group_name: log_group_name.clone(),
                retention_in_days: LOG_RETENTION_DAYS,
            })
            .removal_policy(RemovalPolicy::Delete),
        )?;

        let role = stack.add_resource(self.role_id, self.role(source))?;

        let properties = DeliveryStreamProperties {
            delivery_stream_name: self.stream_name.to_string(),
            delivery_stream_type: DeliveryStreamType::KinesisStreamAsSource,
            kinesis_stream_source_configuration: KinesisStreamSourceConfiguration {
                kinesis_stream_arn: source.stream_arn.clone(),
                role_arn: role.arn(),
            },
            extended_s3_destination_configuration: ExtendedS3DestinationConfiguration {
                bucket_arn: self.bucket_arn,
                buffering_hints: BufferingHints {
                    interval_in_seconds: 60,
                    size_in_mbs: 16,
                },
                cloud_watch_logging_options: CloudWatchLoggingOptions {
                    enabled: true,
                    log_group_name,
                    log_stream_name: LOG_STREAM_NAME.to_string(),
                },
                compression_format: CompressionFormat::Gzip,
                encryption_configuration: EncryptionConfiguration::kms(self.destination_key.arn().clone()),
                error_output_prefix: source.error_prefix.clone(),
                prefix: source.prefix.clone(),
                role_arn: role.arn(),
                processing_configuration: ProcessingConfiguration {
                    enabled: true,
                    processors: vec![lambda_processor(source.function_arn.clone())],
                },
            },
        };

        let stream = stack.add_resource(
            self.stream_id,
            Resource::from(properties)
                .depends_on(role.logical_id())
                .depends_on(log_group.logical_id())
                .removal_policy(RemovalPolicy::Delete),
        )?;

        Ok(DeclaredDelivery { role, stream })
    }

    fn role(&self, source: &Source) -> RoleProperties {
        let object_arns = [
            self.bucket_arn.suffixed(&format!("/{}/*", source.s3_prefix)),
            self.bucket_arn
                .suffixed(&format!("/error/{}/*", source.s3_prefix)),
        ];

        let policy = |name: &str, statement: Statement| {
            InlinePolicy::new(name, PolicyDocument::with_sids(vec![statement]))
        };

        let mut key_grants = vec![self.destination_key.grant(KMS_ACTIONS)];
        if self.source_key != self.destination_key {
            key_grants.push(self.source_key.grant(KMS_ACTIONS));
        }

        RoleProperties {
            role_name: self.role_name.to_string(),
            description: Some(self.role_description.to_string()),
            assume_role_policy_document: PolicyDocument::assume_role(Principal::service(
                "firehose.amazonaws.com",
            )),
            managed_policy_arns: vec![],
            policies: vec![
                policy(
                    "AllowLogging",
                    Statement::allow()
                        .actions([
                            "logs:CreateLogGroup",
                            "logs:CreateLogStream",
                            "logs:PutLogEvents",
                        ])
                        .resources([Expr::sub(format!(
                            "arn:{PARTITION}:logs:{REGION}:{ACCOUNT_ID}:log-group:/aws/kinesisfirehose/*:*"
                        ))]),
                ),
                InlinePolicy::new("KmsPermissions", PolicyDocument::with_sids(key_grants)),
                policy(
                    "S3BucketPermissions",
                    Statement::allow()
                        .actions([
                            "s3:ListBucket",
                            "s3:ListBucketByTags",
                            "s3:GetBucketLocation",
                            "s3:ListBucketMultipartUploads",
                        ])
                        .resources([self.bucket_arn.clone()]),
                ),
                policy(
                    "S3ObjectPermissions",
                    Statement::allow()
                        .actions([
                            "s3:GetObject",
                            "s3:AbortMultipartUpload",
                            "s3:PutObject",
                            "s3:PutObjectAcl",
                        ])
                        .resources(object_arns),
                ),
                policy(
                    "KinesisPermissions",
                    Statement::allow()
                        .actions([
                            "kinesis:DescribeStream",
                            "kinesis:GetShardIterator",
                            "kinesis:GetRecords",
                            "kinesis:ListShards",
                        ])
                        .resources([source.stream_arn.clone()]),
                ),
                policy(
                    "LambdaPermissions",
                    Statement::allow()
                        .actions(["lambda:InvokeFunction", "lambda:GetFunctionConfiguration"])
                        .resources([source.function_arn.clone()]),
                ),
            ],
        }
    }
}

fn lambda_processor(function_arn: Expr) -> Processor {
    let parameter = |name, value: Expr| ProcessorParameter {
        parameter_name: name,
        parameter_value: value,
    };

    Processor {
        processor_type: "Lambda".to_string(),
        parameters: vec![
            parameter(ProcessorParameterName::LambdaArn, function_arn),
            parameter(ProcessorParameterName::NumberOfRetries, "2".into()),
            parameter(ProcessorParameterName::BufferSizeInMbs, "3".into()),
            parameter(ProcessorParameterName::BufferIntervalInSeconds, "60".into()),
        ],
    }
}

/// Role the consumer's Glue job assumes to read the table for a full load.
fn declare_ddb_read_role(
    stack: &mut Stack,
    cross: &CrossAccount,
    table_key: &KeyUsage,
) -> Result<ResourceRef, Error> {
    let trust = Statement::cross_account(&cross.account_id, &cross.glue_job_role_name)
        .actions(["sts:AssumeRole"]);

    stack.add_resource(
        "DdbCrossAccount4Glue",
        RoleProperties {
            role_name: cross.ddb_read_role_name.clone(),
            description: Some(
                "A role for the Glue job of another AWS account to read DynamoDB.".to_string(),
            ),
            assume_role_policy_document: PolicyDocument::new(vec![trust]),
            managed_policy_arns: vec![managed_policy_arn("AmazonDynamoDBReadOnlyAccess")],
            policies: vec![InlinePolicy::new(
                "DdbKmsPermission",
                PolicyDocument::with_sids(vec![table_key.grant(KMS_ACTIONS)]),
            )],
        },
    )
}
