use super::{Error, KeyUsage, ResourceRef, Stack};
use crate::types::{
    expr::managed_policy_arn,
    policy::{PolicyDocument, Principal, Statement},
    resources::{FunctionCode, FunctionProperties, InlinePolicy, RoleProperties},
    Expr, Parameter, Resource,
};

pub const FUNCTION_NAME: &str = "ddb-delivery-transformation";
pub const ROLE_NAME: &str = "Ddb-Delivery-Transformation-Role";
pub const DEFAULT_CODE_KEY: &str = "firehose-transformation.zip";

const RUNTIME: &str = "provided.al2023";
const HANDLER: &str = "bootstrap";
const ARCHITECTURE: &str = "arm64";
const TIMEOUT_SECS: u32 = 300;
const MEMORY_SIZE_MB: u32 = 256;

/// Where the packaged `firehose-transformation` binary is uploaded.
///
/// Both values become template parameter defaults, so they can still be
/// overridden at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    pub bucket: Option<String>,
    pub key: String,
}

impl Default for CodeLocation {
    fn default() -> Self {
        Self {
            bucket: None,
            key: DEFAULT_CODE_KEY.to_string(),
        }
    }
}

/// The record processor Firehose invokes before writing to S3.
#[derive(Debug, Clone)]
pub struct JsonProcessor {
    pub role: ResourceRef,
    pub function: ResourceRef,
}

impl JsonProcessor {
    /// Declare the function, its execution role and code parameters in `stack`.
    pub fn declare(
        stack: &mut Stack,
        kinesis_key: &KeyUsage,
        code: &CodeLocation,
    ) -> Result<Self, Error> {
        let code_bucket = stack.add_parameter(
            "TransformFunctionCodeBucket",
            Parameter::string()
                .default_value(code.bucket.as_deref())
                .description("Bucket holding the firehose-transformation package"),
        )?;
        let code_key = stack.add_parameter(
            "TransformFunctionCodeKey",
            Parameter::string()
                .default_value(Some(code.key.as_str()))
                .description("Object key of the firehose-transformation package"),
        )?;

        let role = stack.add_resource(
            "TransformationFunctionRole",
            RoleProperties {
                role_name: ROLE_NAME.to_string(),
                description: Some(
                    "A role to allow the transformation Lambda function to convert multi-line JSON into single-line JSON."
                        .to_string(),
                ),
                assume_role_policy_document: PolicyDocument::assume_role(Principal::service(
                    "lambda.amazonaws.com",
                )),
                managed_policy_arns: vec![
                    managed_policy_arn("service-role/AWSLambdaBasicExecutionRole"),
                    managed_policy_arn("AWSXRayDaemonWriteAccess"),
                    managed_policy_arn("service-role/AWSLambdaVPCAccessExecutionRole"),
                ],
                policies: vec![InlinePolicy::new(
                    "DefaultPolicy",
                    PolicyDocument::with_sids(vec![
                        Statement::allow()
                            .actions(["cloudwatch:PutMetricData"])
                            .resources([Expr::literal("*")]),
                        kinesis_key.grant(strings![
                            "kms:Encrypt",
                            "kms:Decrypt",
                            "kms:ReEncrypt*",
                            "kms:GenerateDataKey*",
                        ]),
                    ]),
                )],
            },
        )?;

        let function = stack.add_resource(
            "TransformationLambda",
            Resource::from(FunctionProperties {
                function_name: FUNCTION_NAME.to_string(),
                description: "Flattens DynamoDB change records delivered by Firehose".to_string(),
                runtime: RUNTIME.to_string(),
                handler: HANDLER.to_string(),
                role: role.arn(),
                timeout: TIMEOUT_SECS,
                memory_size: MEMORY_SIZE_MB,
                architectures: strings![ARCHITECTURE],
                code: FunctionCode {
                    s3_bucket: code_bucket.reference(),
                    s3_key: code_key.reference(),
                },
            })
            .depends_on(role.logical_id()),
        )?;

        Ok(Self { role, function })
    }

    pub fn function_arn(&self) -> Expr {
        self.function.arn()
    }
}
