use super::{
    client::IdentityClient,
    config::Settings,
    error::Error,
    stack::{consumer::BUCKET_KEY_ALIAS, Assembly, KeyReference},
};

use std::path::PathBuf;
use tracing::{error, info};

/// Synthesize both stacks with `client` and write them to the configured
/// output directory. Nothing is written when synthesis fails.
pub async fn run<C: IdentityClient>(client: C, settings: Settings) -> Result<Vec<PathBuf>, Error> {
    let output_dir = settings.output_dir.clone();
    let assembly = Synthesizer::new(client, settings).synth().await?;

    let written = assembly.write_to(&output_dir)?;
    info!(
        "Synthesized {} stacks into {}",
        assembly.stacks().len(),
        output_dir.display()
    );
    Ok(written)
}

/// Resolves the consumer account and composes both stacks of the pipeline.
#[derive(Debug, Clone)]
pub struct Synthesizer<C: IdentityClient> {
    client: C,
    settings: Settings,
}

impl<C: IdentityClient> Synthesizer<C> {
    /// `client` must carry the consumer account's credentials.
    pub fn new(client: C, settings: Settings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Build the producer and consumer stacks.
    ///
    /// The consumer account and the key of its bucket are resolved first. If
    /// either fails, no stack is built. With `consumer_only` set only the
    /// consumer stack is built and the key is not looked up.
    pub async fn synth(&self) -> Result<Assembly, Error> {
        let consumer_account = self
            .client
            .get_account_id()
            .await
            .inspect_err(|err| error!("Failed to resolve the consumer account: {err}"))?;

        info!("Producer Account ID: {}", self.settings.account);
        info!("Consumer Account ID: {consumer_account}");

        let mut stacks = vec![];
        if !self.settings.consumer_only {
            let consumer_bucket_key = self
                .consumer_bucket_key()
                .await
                .inspect_err(|err| error!("Failed to resolve the consumer bucket key: {err}"))?;
            stacks.push(
                self.settings
                    .producer_stack(&consumer_account, consumer_bucket_key)
                    .build()?,
            );
        }
        stacks.push(self.settings.consumer_stack(&consumer_account).build()?);

        Ok(Assembly::new(stacks))
    }

    async fn consumer_bucket_key(&self) -> Result<KeyReference, Error> {
        match self.settings.consumer_bucket_key_id.as_deref() {
            Some(id) => Ok(KeyReference::Id(id.to_string())),
            None => {
                let arn = self.client.get_key_arn(BUCKET_KEY_ALIAS).await?;
                info!("Consumer bucket key: {arn}");
                Ok(KeyReference::Arn(arn))
            }
        }
    }
}
