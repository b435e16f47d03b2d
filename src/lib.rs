//! Synthesize the CloudFormation templates of a streaming data lake that
//! captures [Amazon DynamoDB](https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/Introduction.html)
//! changes through Kinesis and lands them in S3 with Kinesis Data Firehose,
//! optionally in another AWS account.
//!
//! ## Getting Started
//!
//! Two stacks are produced. The producer stack owns the table, the change
//! stream and the delivery streams. The consumer stack owns the cross-account
//! landing bucket and a Glue job that loads the whole table into it.
//!
//! ```rust,no_run
//! use ddb_streaming_datalake::{app, config::Settings, Client};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let config = settings.consumer_sdk_config().await;
//!
//!     let written = app::run(Client::new(&config), settings).await?;
//!     println!("{} files written", written.len());
//!     Ok(())
//! }
//! ```
//!
//! Single stacks can also be composed directly with [`stack::producer::builder`]
//! and [`stack::consumer::builder`].
//!
//! ## AWS SDK Dependency
//!
//! To build [`Client`] of this crate, you must pass the reference for
//! [`SdkConfig`](aws_config::SdkConfig) of the consumer account. It resolves
//! the consumer account id and the ARN of the consumer bucket key.

#[macro_use]
mod macros;

/// Consumer resolution, stack composition and output of a synthesis run.
pub mod app;

/// Client for calling AWS APIs.
pub mod client;

/// Environment driven configuration.
pub mod config;

/// Common errors.
pub mod error;

/// Stacks and the resources of the pipeline.
pub mod stack;

/// Tracing subscriber setup shared by the binaries.
pub mod telemetry;

/// Record processor run by Firehose before delivery.
pub mod transform;

/// CloudFormation template model.
pub mod types;

pub use client::{Client, IdentityClient};
pub use error::Error;
