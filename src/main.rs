//! Scheduled dispatch entrypoint. Invoked every five minutes by the
//! scheduler; each invocation runs one dispatch pass and exits. The schedule
//! is also what resumes rate-limited or interrupted campaigns, so overlapping
//! invocations must be prevented at the scheduler level.

use aws_config::BehaviorVersion;
use chrono::Utc;
use lambda_runtime::{Error, LambdaEvent, service_fn};
use newsletter_dispatch::configuration::DispatchConfig;
use newsletter_dispatch::dispatcher::CampaignDispatcher;
use newsletter_dispatch::mailer::SesMailer;
use newsletter_dispatch::storage::DynamoStorage;
use serde_json::Value;
use std::env;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    lambda_runtime::run(service_fn(handler)).await?;
    Ok(())
}

async fn handler(_event: LambdaEvent<Value>) -> Result<(), Error> {
    info!("Starting newsletter dispatch run...");

    // Read all configuration from environment variables
    let dynamodb_table = env::var("DYNAMODB_TABLE")
        .map_err(|_| Error::from("DYNAMODB_TABLE environment variable must be set"))?;
    let email_from = env::var("EMAIL_FROM")
        .map_err(|_| Error::from("EMAIL_FROM environment variable must be set"))?;
    let email_reply_to = env::var("EMAIL_REPLY_TO")
        .map_err(|_| Error::from("EMAIL_REPLY_TO environment variable must be set"))?;
    let base_url = env::var("PUBLIC_BASE_URL")
        .map_err(|_| Error::from("PUBLIC_BASE_URL environment variable must be set"))?;
    let unsubscribe_secret = env::var("UNSUBSCRIBE_SECRET")
        .map_err(|_| Error::from("UNSUBSCRIBE_SECRET environment variable must be set"))?;
    let configuration_set = env::var("SES_CONFIGURATION_SET")
        .ok()
        .filter(|s| !s.is_empty());

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let storage = Arc::new(DynamoStorage::new(
        aws_sdk_dynamodb::Client::new(&config),
        dynamodb_table,
    ));
    let mailer = Arc::new(SesMailer::new(
        aws_sdk_sesv2::Client::new(&config),
        email_from,
        email_reply_to,
        configuration_set,
    ));

    let dispatcher = CampaignDispatcher::new(
        storage,
        mailer,
        DispatchConfig::from_env(),
        unsubscribe_secret,
        base_url,
    );

    dispatcher
        .run(Utc::now())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    info!("Dispatch run completed.");
    Ok(())
}
