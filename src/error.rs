use thiserror::Error as ThisError;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not found account in caller identity")]
    NotFoundAccount,
    #[error("not found key metadata for {0}")]
    NotFoundKey(String),
    #[error("missing environment variable: {0}")]
    MissingEnv(String),
    #[error("invalid value for environment variable {name}: {value}")]
    InvalidEnv { name: String, value: String },
    #[error("missing stack property: {0}")]
    MissingProperty(&'static str),
    #[error("key alias {0} cannot be used from another account, resolve it to a key arn")]
    CrossAccountKeyAlias(String),
    #[error("duplicate logical id in stack {stack}: {logical_id}")]
    DuplicateLogicalId { stack: String, logical_id: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("aws-sdk error: {0}")]
    SdkError(Box<dyn std::error::Error + Send + Sync + 'static>),
}
