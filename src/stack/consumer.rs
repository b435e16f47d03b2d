//! The consumer account half of the pipeline.
//!
//! The consumer owns the destination bucket and its key, and trusts the
//! producer's cross-account Firehose role to write into them. A Glue job
//! assumes the producer's read role to copy the whole table into the same
//! bucket.

use super::{
    declare_key, normalize_prefix, producer, Error, KeyOptions, ResourceRef, Stack, StackEnv,
    DEFAULT_S3_PREFIX, KMS_ACTIONS,
};
use crate::types::{
    expr::{managed_policy_arn, role_arn, ACCOUNT_ID, PARTITION, REGION},
    policy::{PolicyDocument, Principal, Statement},
    resources::{
        BucketEncryption, BucketPolicyProperties, BucketProperties, ExecutionProperty,
        GlueJobProperties, InlinePolicy, JobCommand, PublicAccessBlock, RoleProperties,
    },
    Expr,
};

use std::collections::BTreeMap;

pub const DEFAULT_STACK_NAME: &str = "ConsumerStack";
pub const BUCKET_KEY_ALIAS: &str = "alias/ConsumerBucketKmsKey";
pub const GLUE_JOB_NAME: &str = "ddb-cross-account-full-load-glue-job";
pub const GLUE_SCRIPT_PREFIX: &str = "glue_jobs/ddb";
pub const GLUE_SCRIPT_NAME: &str = "ddb_full_load.py";

const GLUE_VERSION: &str = "4.0";
const GLUE_WORKER_TYPE: &str = "Standard";
const GLUE_WORKERS: u32 = 1;

/// Create [`ConsumerStackBuilder`].
pub fn builder() -> ConsumerStackBuilder {
    ConsumerStackBuilder::new()
}

#[derive(Debug, Clone)]
pub struct ConsumerStackBuilder {
    stack_name: String,
    env: Option<StackEnv>,
    datalake_bucket_name: Option<String>,
    producer_account_id: Option<String>,
    producer_region: Option<String>,
    producer_firehose_role_name: String,
    producer_ddb_read_role_name: String,
    producer_ddb_table_name: String,
    glue_job_role_name: String,
    s3_prefix: String,
}

impl ConsumerStackBuilder {
    pub fn new() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            env: None,
            datalake_bucket_name: None,
            producer_account_id: None,
            producer_region: None,
            producer_firehose_role_name: producer::DEFAULT_CROSS_ACCOUNT_FIREHOSE_ROLE_NAME
                .to_string(),
            producer_ddb_read_role_name: producer::DEFAULT_DDB_READ_ROLE_NAME.to_string(),
            producer_ddb_table_name: producer::DEFAULT_TABLE_NAME.to_string(),
            glue_job_role_name: producer::DEFAULT_GLUE_JOB_ROLE_NAME.to_string(),
            s3_prefix: DEFAULT_S3_PREFIX.to_string(),
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

    pub fn datalake_bucket_name(self, name: impl Into<String>) -> Self {
        Self {
            datalake_bucket_name: Some(name.into()),
            ..self
        }
    }

    pub fn producer_account_id(self, account_id: impl Into<String>) -> Self {
        Self {
            producer_account_id: Some(account_id.into()),
            ..self
        }
    }

    /// Region of the producer table. `None` means the consumer's region.
    pub fn producer_region(self, region: Option<String>) -> Self {
        Self {
            producer_region: region,
            ..self
        }
    }

    pub fn producer_firehose_role_name(self, role_name: impl Into<String>) -> Self {
        Self {
            producer_firehose_role_name: role_name.into(),
            ..self
        }
    }

    pub fn producer_ddb_read_role_name(self, role_name: impl Into<String>) -> Self {
        Self {
            producer_ddb_read_role_name: role_name.into(),
            ..self
        }
    }

    pub fn producer_ddb_table_name(self, table_name: impl Into<String>) -> Self {
        Self {
            producer_ddb_table_name: table_name.into(),
            ..self
        }
    }

    pub fn glue_job_role_name(self, role_name: impl Into<String>) -> Self {
        Self {
            glue_job_role_name: role_name.into(),
            ..self
        }
    }

    /// Key prefix the Glue job writes under. Surrounding slashes are dropped.
    pub fn s3_prefix(self, s3_prefix: impl AsRef<str>) -> Self {
        Self {
            s3_prefix: normalize_prefix(s3_prefix.as_ref()),
            ..self
        }
    }

    pub fn build(self) -> Result<Stack, Error> {
        let env = self.env.clone().ok_or(Error::MissingProperty("env"))?;
        let bucket_name = self
            .datalake_bucket_name
            .clone()
            .ok_or(Error::MissingProperty("datalake_bucket_name"))?;
        let producer_account = self
            .producer_account_id
            .clone()
            .ok_or(Error::MissingProperty("producer_account_id"))?;

        let mut stack = Stack::new(self.stack_name.as_str(), env);
        stack.set_description(
            "Cross-account landing bucket and full-load Glue job for a DynamoDB data lake",
        );

        let key = declare_key(
            &mut stack,
            KeyOptions {
                logical_id: "ConsumerBucketKmsKey",
                alias: BUCKET_KEY_ALIAS,
                description: None,
                rotation: true,
                grants: vec![self
                    .firehose_grant(&producer_account)
                    .sid("Give the Firehose IAM role from the producer account access over this KMS key")
                    .actions(KMS_ACTIONS)
                    .resources([Expr::literal("*")])],
            },
        )?;

        let bucket = stack.add_resource(
            "ConsumerBucket",
            BucketProperties {
                bucket_name: Expr::literal(bucket_name.as_str()),
                access_control: Some("BucketOwnerFullControl".to_string()),
                public_access_block_configuration: PublicAccessBlock::block_all(),
                bucket_encryption: Some(BucketEncryption::kms(key.arn())),
            },
        )?;

        stack.add_resource(
            "ConsumerBucketPolicy",
            BucketPolicyProperties {
                bucket: bucket.reference(),
                policy_document: PolicyDocument::new(vec![self
                    .firehose_grant(&producer_account)
                    .actions([
                        "s3:DeleteObject",
                        "s3:DeleteObjectTagging",
                        "s3:GetObject",
                        "s3:GetObjectTagging",
                        "s3:ListBucket",
                        "s3:PutObject",
                        "s3:PutObjectTagging",
                        "s3:PutObjectAcl",
                    ])
                    .resources([bucket.arn(), bucket.arn().suffixed("/*")])]),
            },
        )?;

        let script = ScriptLocation {
            bucket_name: bucket_name.clone(),
            prefix: GLUE_SCRIPT_PREFIX,
        };
        let role = self.declare_glue_job_role(&mut stack, &producer_account, &script, &bucket, &key)?;
        let job = self.declare_glue_job(&mut stack, &producer_account, &script, &bucket_name, &role)?;

        stack.add_output(
            "ConsumerBucketArn",
            bucket.arn(),
            Some("The ARN of the consumer bucket"),
        )?;
        stack.add_output(
            "ConsumerBucketKmsKeyArn",
            key.arn(),
            Some("The ARN of the consumer bucket KMS key"),
        )?;
        stack.add_output(
            "DdbGlueJobRoleArn",
            role.arn(),
            Some("The ARN of the Glue job role"),
        )?;
        stack.add_output(
            "DdbGlueJobRoleId",
            role.attr("RoleId"),
            Some("The role ID of the Glue job role"),
        )?;
        stack.add_output(
            "DdbGlueJobArn",
            Expr::sub(format!(
                "arn:{PARTITION}:glue:{REGION}:{ACCOUNT_ID}:job/${{{}}}",
                job.logical_id()
            )),
            Some("The ARN of the Glue job"),
        )?;
        stack.add_output(
            "DdbGlueJobScriptLocation",
            script.object_url(),
            Some("Where the full-load script has to be uploaded"),
        )?;

        Ok(stack)
    }

    /// Statement granted to the producer's cross-account Firehose role only.
    fn firehose_grant(&self, producer_account: &str) -> Statement {
        Statement::cross_account(producer_account, &self.producer_firehose_role_name)
    }

    fn declare_glue_job_role(
        &self,
        stack: &mut Stack,
        producer_account: &str,
        script: &ScriptLocation,
        bucket: &ResourceRef,
        key: &ResourceRef,
    ) -> Result<ResourceRef, Error> {
        let policy = |name: &str, statement: Statement| {
            InlinePolicy::new(name, PolicyDocument::with_sids(vec![statement]))
        };

        stack.add_resource(
            "GlueJobRole",
            RoleProperties {
                role_name: self.glue_job_role_name.clone(),
                description: Some(
                    "An IAM role to allow the Glue job to read from DynamoDB cross account and write to S3."
                        .to_string(),
                ),
                assume_role_policy_document: PolicyDocument::assume_role(Principal::service(
                    "glue.amazonaws.com",
                )),
                managed_policy_arns: vec![managed_policy_arn("service-role/AWSGlueServiceRole")],
                policies: vec![
                    policy(
                        "CrossAccountAssumeRole",
                        Statement::allow()
                            .actions(["sts:AssumeRole"])
                            .resources([role_arn(
                                producer_account,
                                &self.producer_ddb_read_role_name,
                            )]),
                    ),
                    policy(
                        "DataLakeReadWrite",
                        Statement::allow()
                            .actions(["s3:GetObject", "s3:PutObject", "s3:DeleteObject"])
                            .resources([
                                bucket.arn().suffixed(&format!("/{}/*", script.prefix)),
                                bucket.arn().suffixed(&format!("/{}/*", self.s3_prefix)),
                            ]),
                    ),
                    policy(
                        "KmsPermissions",
                        Statement::allow()
                            .actions(KMS_ACTIONS)
                            .resources([key.arn()]),
                    ),
                ],
            },
        )
    }

    fn declare_glue_job(
        &self,
        stack: &mut Stack,
        producer_account: &str,
        script: &ScriptLocation,
        bucket_name: &str,
        role: &ResourceRef,
    ) -> Result<ResourceRef, Error> {
        let producer_region = self
            .producer_region
            .as_deref()
            .map(Expr::literal)
            .unwrap_or_else(|| Expr::sub(REGION));

        let default_arguments: BTreeMap<String, Expr> = [
            ("--PRODUCER_DYNAMODB_NAME", Expr::literal(self.producer_ddb_table_name.as_str())),
            ("--PRODUCER_ACCOUNT_ID", Expr::literal(producer_account)),
            (
                "--PRODUCER_DYNAMODB_READ_ROLE_NAME",
                Expr::literal(self.producer_ddb_read_role_name.as_str()),
            ),
            ("--PRODUCER_REGION", producer_region),
            ("--S3_BUCKET_NAME", Expr::literal(bucket_name)),
            ("--S3_PREFIX", Expr::literal(self.s3_prefix.as_str())),
            ("--WORKER_TYPE", Expr::literal(GLUE_WORKER_TYPE)),
            ("--NUM_WORKERS", Expr::literal(GLUE_WORKERS.to_string())),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        stack.add_resource(
            "DdbGlueJob",
            GlueJobProperties {
                name: GLUE_JOB_NAME.to_string(),
                role: role.arn(),
                glue_version: GLUE_VERSION.to_string(),
                worker_type: GLUE_WORKER_TYPE.to_string(),
                number_of_workers: GLUE_WORKERS,
                default_arguments,
                command: JobCommand {
                    name: "glueetl".to_string(),
                    python_version: "3".to_string(),
                    script_location: script.object_url(),
                },
                execution_property: ExecutionProperty {
                    max_concurrent_runs: 1,
                },
            },
        )
    }
}

impl Default for ConsumerStackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the Glue job script lives inside the consumer bucket.
struct ScriptLocation {
    bucket_name: String,
    prefix: &'static str,
}

impl ScriptLocation {
    fn object_url(&self) -> Expr {
        Expr::literal(format!(
            "s3://{}/{}/{}",
            self.bucket_name, self.prefix, GLUE_SCRIPT_NAME
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn consumer() -> ConsumerStackBuilder {
        builder()
            .env(StackEnv::new(
                "444455556666",
                Some("ap-northeast-1".to_string()),
            ))
            .datalake_bucket_name("consumer-bucket")
            .producer_account_id("111122223333")
            .producer_firehose_role_name("cross-firehose")
            .producer_ddb_read_role_name("ddb-read")
            .producer_ddb_table_name("People")
    }

    fn json(stack: &Stack) -> Value {
        serde_json::to_value(stack.template()).unwrap()
    }

    #[test]
    fn required_properties() {
        let err = builder()
            .env(StackEnv::new("444455556666", None))
            .producer_account_id("111122223333")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MissingProperty("datalake_bucket_name")));

        let err = builder()
            .env(StackEnv::new("444455556666", None))
            .datalake_bucket_name("bucket")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MissingProperty("producer_account_id")));
    }

    #[test]
    fn bucket_is_encrypted_with_its_own_key() {
        let template = json(&consumer().build().unwrap());
        let bucket = &template["Resources"]["ConsumerBucket"]["Properties"];

        assert_eq!(bucket["BucketName"], json!("consumer-bucket"));
        assert_eq!(bucket["AccessControl"], json!("BucketOwnerFullControl"));
        assert_eq!(
            bucket["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]
                ["ServerSideEncryptionByDefault"],
            json!({
                "SSEAlgorithm": "aws:kms",
                "KMSMasterKeyID": { "Fn::GetAtt": ["ConsumerBucketKmsKey", "Arn"] },
            })
        );
        assert_eq!(
            template["Resources"]["ConsumerBucketKmsKeyAlias"]["Properties"]["AliasName"],
            json!("alias/ConsumerBucketKmsKey")
        );
    }

    #[test]
    fn producer_firehose_role_is_trusted_on_bucket_and_key() {
        let template = json(&consumer().build().unwrap());
        let role = json!({
            "Fn::Sub": "arn:${AWS::Partition}:iam::111122223333:role/cross-firehose"
        });

        let bucket_statement =
            &template["Resources"]["ConsumerBucketPolicy"]["Properties"]["PolicyDocument"]
                ["Statement"][0];
        assert_eq!(bucket_statement["Condition"]["ArnEquals"]["aws:PrincipalArn"], role);
        assert_eq!(
            bucket_statement["Resource"],
            json!([
                { "Fn::GetAtt": ["ConsumerBucket", "Arn"] },
                { "Fn::Sub": "${ConsumerBucket.Arn}/*" },
            ])
        );

        let key_statement =
            &template["Resources"]["ConsumerBucketKmsKey"]["Properties"]["KeyPolicy"]["Statement"][1];
        assert_eq!(key_statement["Condition"]["ArnEquals"]["aws:PrincipalArn"], role);
    }

    #[test]
    fn glue_job_pulls_from_the_producer_table() {
        let template = json(&consumer().build().unwrap());
        let job = &template["Resources"]["DdbGlueJob"]["Properties"];

        assert_eq!(job["Name"], json!("ddb-cross-account-full-load-glue-job"));
        assert_eq!(job["Role"], json!({ "Fn::GetAtt": ["GlueJobRole", "Arn"] }));
        assert_eq!(
            job["Command"]["ScriptLocation"],
            json!("s3://consumer-bucket/glue_jobs/ddb/ddb_full_load.py")
        );
        assert_eq!(
            job["DefaultArguments"],
            json!({
                "--NUM_WORKERS": "1",
                "--PRODUCER_ACCOUNT_ID": "111122223333",
                "--PRODUCER_DYNAMODB_NAME": "People",
                "--PRODUCER_DYNAMODB_READ_ROLE_NAME": "ddb-read",
                "--PRODUCER_REGION": { "Fn::Sub": "${AWS::Region}" },
                "--S3_BUCKET_NAME": "consumer-bucket",
                "--S3_PREFIX": "dynamodb/aws21",
                "--WORKER_TYPE": "Standard",
            })
        );

        let assume = &template["Resources"]["GlueJobRole"]["Properties"]["Policies"][0];
        assert_eq!(assume["PolicyName"], json!("CrossAccountAssumeRole"));
        assert_eq!(
            assume["PolicyDocument"]["Statement"][0]["Resource"],
            json!([{ "Fn::Sub": "arn:${AWS::Partition}:iam::111122223333:role/ddb-read" }])
        );
    }

    #[test]
    fn glue_prefix_loses_surrounding_slashes() {
        let template = json(&consumer().s3_prefix("/raw/").build().unwrap());

        let read_write = &template["Resources"]["GlueJobRole"]["Properties"]["Policies"][1];
        assert_eq!(read_write["PolicyName"], json!("DataLakeReadWrite"));
        assert_eq!(
            read_write["PolicyDocument"]["Statement"][0]["Resource"][1],
            json!({ "Fn::Sub": "${ConsumerBucket.Arn}/raw/*" })
        );
        assert_eq!(
            template["Resources"]["DdbGlueJob"]["Properties"]["DefaultArguments"]["--S3_PREFIX"],
            json!("raw")
        );

        let template = json(&consumer().s3_prefix("/").build().unwrap());
        assert_eq!(
            template["Resources"]["DdbGlueJob"]["Properties"]["DefaultArguments"]["--S3_PREFIX"],
            json!("dynamodb/aws21")
        );
    }
}
