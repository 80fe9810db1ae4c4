use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use email_address::EmailAddress;
use newsletter_dispatch::storage::DynamoStorage;
use newsletter_dispatch::types::Subscriber;
use std::env;
use std::str::FromStr;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin add-subscriber <email>");
        eprintln!(
            "Example: DYNAMODB_TABLE=Newsletter-staging cargo run --bin add-subscriber test@example.com"
        );
        std::process::exit(1);
    }

    let email = EmailAddress::from_str(&args[1]).context("Invalid email address")?;

    let dynamodb_table =
        env::var("DYNAMODB_TABLE").context("DYNAMODB_TABLE environment variable must be set")?;

    println!("Initializing DynamoDB client...");
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let storage = DynamoStorage::new(aws_sdk_dynamodb::Client::new(&config), dynamodb_table);

    let subscriber = Subscriber::new(uuid::Uuid::new_v4().to_string(), email);
    storage.put_subscriber(&subscriber).await?;

    println!("Successfully added active subscriber:");
    println!("  Id: {}", subscriber.id);
    println!("  Email: {}", subscriber.email);

    Ok(())
}
