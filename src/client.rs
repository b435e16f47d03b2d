use super::error::Error;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_kms::Client as KmsClient;
use aws_sdk_sts::Client as StsClient;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Client {
    sts: StsClient,
    kms: KmsClient,
}

impl Client {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            sts: StsClient::new(config),
            kms: KmsClient::new(config),
        }
    }
}

#[async_trait]
pub trait IdentityClient: Clone + Send + Sync {
    /// Return the account id of the credentials the client was built with.
    async fn get_account_id(&self) -> Result<String, Error>;

    /// Return the ARN of the key `key_id` names. An alias (`alias/<name>`) is
    /// looked up in the client's account and region.
    async fn get_key_arn(&self, key_id: &str) -> Result<String, Error>;
}

#[async_trait]
impl IdentityClient for Client {
    async fn get_account_id(&self) -> Result<String, Error> {
        let account = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| Error::SdkError(Box::new(err)))?
            .account
            .ok_or(Error::NotFoundAccount)?;

        debug!("Resolved caller account {account}");
        Ok(account)
    }

    async fn get_key_arn(&self, key_id: &str) -> Result<String, Error> {
        let arn = self
            .kms
            .describe_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|err| Error::SdkError(Box::new(err)))?
            .key_metadata
            .and_then(|metadata| metadata.arn)
            .ok_or_else(|| Error::NotFoundKey(key_id.to_string()))?;

        debug!("Resolved {key_id} to {arn}");
        Ok(arn)
    }
}
