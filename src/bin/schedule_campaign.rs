use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use chrono::{DateTime, Utc};
use newsletter_dispatch::storage::DynamoStorage;
use newsletter_dispatch::types::{Campaign, EmailTemplate};
use std::env;
use std::fs;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: cargo run --bin schedule-campaign <subject> <title> <html-file> [scheduled-at]"
        );
        eprintln!(
            "Example: DYNAMODB_TABLE=Newsletter-staging cargo run --bin schedule-campaign \
             'Новости апреля' 'Апрельская рассылка' body.html 2024-04-01T09:00:00+03:00"
        );
        std::process::exit(1);
    }

    let subject = &args[1];
    let title = &args[2];
    let html_content = fs::read_to_string(&args[3])
        .with_context(|| format!("Failed to read template file {}", args[3]))?;
    let scheduled_at = if args.len() > 4 {
        args[4]
            .parse::<DateTime<Utc>>()
            .context("scheduled-at must be an RFC 3339 timestamp")?
    } else {
        Utc::now()
    };

    let dynamodb_table =
        env::var("DYNAMODB_TABLE").context("DYNAMODB_TABLE environment variable must be set")?;

    println!("Initializing DynamoDB client...");
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let storage = DynamoStorage::new(aws_sdk_dynamodb::Client::new(&config), dynamodb_table);

    let campaign = Campaign::scheduled(
        uuid::Uuid::new_v4().to_string(),
        subject.to_string(),
        EmailTemplate {
            title: title.to_string(),
            html_content,
        },
        scheduled_at,
    );

    storage.put_campaign(&campaign).await?;

    println!("Successfully scheduled campaign:");
    println!("  Id: {}", campaign.id);
    println!("  Subject: {}", campaign.subject);
    println!("  Scheduled at: {}", campaign.scheduled_at.to_rfc3339());

    Ok(())
}
