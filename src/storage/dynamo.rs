use super::Storage;
use crate::types::{Campaign, CampaignStatus, EmailTemplate, Subscriber};
use anyhow::{Context, Result};
use aws_sdk_dynamodb::{Client, types::AttributeValue};
use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use std::collections::HashMap;
use std::str::FromStr;

const CAMPAIGN_PARTITION_KEY: &str = "CAMPAIGN";
const SUBSCRIBER_PARTITION_KEY: &str = "SUBSCRIBER";

// ============================================================================
// DynamoStorage — DynamoDB-backed Storage implementation
// ============================================================================

/// Single-table layout: campaigns under PK="CAMPAIGN"/SK=id, subscribers
/// under PK="SUBSCRIBER"/SK=id. Every dispatcher write is one `update_item`
/// on one row.
pub struct DynamoStorage {
    client: Client,
    table_name: String,
}

impl DynamoStorage {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Insert or replace a campaign row. Used by the seeding CLI; the
    /// dispatcher itself only updates individual fields.
    pub async fn put_campaign(&self, campaign: &Campaign) -> Result<()> {
        let item = HashMap::from([
            (
                "PK".to_string(),
                AttributeValue::S(CAMPAIGN_PARTITION_KEY.to_string()),
            ),
            ("SK".to_string(), AttributeValue::S(campaign.id.clone())),
            (
                "subject".to_string(),
                AttributeValue::S(campaign.subject.clone()),
            ),
            (
                "template_title".to_string(),
                AttributeValue::S(campaign.template.title.clone()),
            ),
            (
                "template_html".to_string(),
                AttributeValue::S(campaign.template.html_content.clone()),
            ),
            (
                "status".to_string(),
                AttributeValue::S(campaign.status.to_string()),
            ),
            (
                "scheduled_at".to_string(),
                AttributeValue::S(campaign.scheduled_at.to_rfc3339()),
            ),
            (
                "total_recipients".to_string(),
                AttributeValue::N(campaign.total_recipients.to_string()),
            ),
            (
                "sent_emails".to_string(),
                AttributeValue::N(campaign.sent_emails.to_string()),
            ),
        ]);

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .context("Failed to put campaign")?;

        Ok(())
    }

    /// Insert or replace a subscriber row. Used by the seeding CLI.
    pub async fn put_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        let item = HashMap::from([
            (
                "PK".to_string(),
                AttributeValue::S(SUBSCRIBER_PARTITION_KEY.to_string()),
            ),
            ("SK".to_string(), AttributeValue::S(subscriber.id.clone())),
            (
                "email".to_string(),
                AttributeValue::S(subscriber.email.to_string().to_lowercase()),
            ),
            (
                "is_active".to_string(),
                AttributeValue::Bool(subscriber.is_active),
            ),
        ]);

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .context("Failed to put subscriber")?;

        Ok(())
    }

    async fn query_partition(
        &self,
        partition_key: &str,
    ) -> Result<Vec<HashMap<String, AttributeValue>>> {
        let mut items = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let mut req = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk")
                .expression_attribute_values(":pk", AttributeValue::S(partition_key.to_string()));

            if let Some(start_key) = exclusive_start_key {
                req = req.set_exclusive_start_key(Some(start_key));
            }

            let output = req
                .send()
                .await
                .with_context(|| format!("Failed to query partition {}", partition_key))?;

            if let Some(page) = output.items {
                items.extend(page);
            }

            exclusive_start_key = output.last_evaluated_key;
            if exclusive_start_key.is_none() {
                break;
            }
        }

        Ok(items)
    }
}

impl Storage for DynamoStorage {
    async fn find_due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let items = self.query_partition(CAMPAIGN_PARTITION_KEY).await?;

        let mut due = Vec::new();
        for item in items {
            let campaign = campaign_from_item(item)?;
            if campaign.is_due(now) {
                due.push(campaign);
            }
        }
        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));

        Ok(due)
    }

    async fn find_active_subscribers(&self) -> Result<Vec<Subscriber>> {
        let items = self.query_partition(SUBSCRIBER_PARTITION_KEY).await?;

        let mut subscribers = Vec::new();
        for item in items {
            let subscriber = subscriber_from_item(item)?;
            if subscriber.is_active {
                subscribers.push(subscriber);
            }
        }
        subscribers.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(subscribers)
    }

    async fn set_status(&self, campaign_id: &str, status: CampaignStatus) -> Result<()> {
        // "status" is a DynamoDB reserved word, hence the name placeholder.
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(
                "PK",
                AttributeValue::S(CAMPAIGN_PARTITION_KEY.to_string()),
            )
            .key("SK", AttributeValue::S(campaign_id.to_string()))
            .update_expression("SET #status = :status")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":status", AttributeValue::S(status.to_string()))
            .send()
            .await
            .with_context(|| format!("Failed to set status of campaign {}", campaign_id))?;

        Ok(())
    }

    async fn set_total_recipients(&self, campaign_id: &str, total: u32) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(
                "PK",
                AttributeValue::S(CAMPAIGN_PARTITION_KEY.to_string()),
            )
            .key("SK", AttributeValue::S(campaign_id.to_string()))
            .update_expression("SET total_recipients = :total")
            .expression_attribute_values(":total", AttributeValue::N(total.to_string()))
            .send()
            .await
            .with_context(|| {
                format!("Failed to set total recipients of campaign {}", campaign_id)
            })?;

        Ok(())
    }

    async fn set_sent_emails(&self, campaign_id: &str, sent: u32) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(
                "PK",
                AttributeValue::S(CAMPAIGN_PARTITION_KEY.to_string()),
            )
            .key("SK", AttributeValue::S(campaign_id.to_string()))
            .update_expression("SET sent_emails = :sent")
            .expression_attribute_values(":sent", AttributeValue::N(sent.to_string()))
            .send()
            .await
            .with_context(|| format!("Failed to set sent count of campaign {}", campaign_id))?;

        Ok(())
    }
}

// ============================================================================
// Item parsers
// ============================================================================

fn string_field<'a>(item: &'a HashMap<String, AttributeValue>, name: &str) -> Result<&'a str> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing {} field", name))
}

fn number_field(item: &HashMap<String, AttributeValue>, name: &str) -> Result<u32> {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing {} field", name))?
        .parse()
        .with_context(|| format!("Invalid {} value", name))
}

pub(crate) fn campaign_from_item(item: HashMap<String, AttributeValue>) -> Result<Campaign> {
    let id = string_field(&item, "SK")?.to_string();
    let subject = string_field(&item, "subject")?.to_string();
    let template = EmailTemplate {
        title: string_field(&item, "template_title")?.to_string(),
        html_content: string_field(&item, "template_html")?.to_string(),
    };
    let status =
        CampaignStatus::from_str(string_field(&item, "status")?).context("Invalid status value")?;
    let scheduled_at = string_field(&item, "scheduled_at")?
        .parse::<DateTime<Utc>>()
        .context("Invalid scheduled_at timestamp")?;
    let total_recipients = number_field(&item, "total_recipients")?;
    let sent_emails = number_field(&item, "sent_emails")?;

    Ok(Campaign {
        id,
        subject,
        template,
        status,
        scheduled_at,
        total_recipients,
        sent_emails,
    })
}

pub(crate) fn subscriber_from_item(item: HashMap<String, AttributeValue>) -> Result<Subscriber> {
    let id = string_field(&item, "SK")?.to_string();
    let email = EmailAddress::from_str(string_field(&item, "email")?)
        .context("Invalid email in database")?;
    let is_active = item
        .get("is_active")
        .and_then(|v| v.as_bool().ok())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Missing is_active field"))?;

    Ok(Subscriber {
        id,
        email,
        is_active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign_item() -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                "PK".to_string(),
                AttributeValue::S(CAMPAIGN_PARTITION_KEY.to_string()),
            ),
            ("SK".to_string(), AttributeValue::S("c1".to_string())),
            (
                "subject".to_string(),
                AttributeValue::S("Новости апреля".to_string()),
            ),
            (
                "template_title".to_string(),
                AttributeValue::S("Апрель".to_string()),
            ),
            (
                "template_html".to_string(),
                AttributeValue::S("<p>body</p>".to_string()),
            ),
            (
                "status".to_string(),
                AttributeValue::S("SENDING".to_string()),
            ),
            (
                "scheduled_at".to_string(),
                AttributeValue::S("2024-01-01T00:00:00+00:00".to_string()),
            ),
            (
                "total_recipients".to_string(),
                AttributeValue::N("7".to_string()),
            ),
            (
                "sent_emails".to_string(),
                AttributeValue::N("3".to_string()),
            ),
        ])
    }

    #[test]
    fn campaign_from_item_parses_all_fields() {
        let campaign = campaign_from_item(campaign_item()).unwrap();
        assert_eq!(campaign.id, "c1");
        assert_eq!(campaign.subject, "Новости апреля");
        assert_eq!(campaign.template.title, "Апрель");
        assert_eq!(campaign.status, CampaignStatus::Sending);
        assert_eq!(campaign.total_recipients, 7);
        assert_eq!(campaign.sent_emails, 3);
    }

    #[test]
    fn campaign_from_item_rejects_missing_status() {
        let mut item = campaign_item();
        item.remove("status");
        assert!(campaign_from_item(item).is_err());
    }

    #[test]
    fn campaign_from_item_rejects_bad_timestamp() {
        let mut item = campaign_item();
        item.insert(
            "scheduled_at".to_string(),
            AttributeValue::S("yesterday".to_string()),
        );
        assert!(campaign_from_item(item).is_err());
    }

    #[test]
    fn subscriber_from_item_parses_all_fields() {
        let item = HashMap::from([
            (
                "PK".to_string(),
                AttributeValue::S(SUBSCRIBER_PARTITION_KEY.to_string()),
            ),
            ("SK".to_string(), AttributeValue::S("sub-1".to_string())),
            (
                "email".to_string(),
                AttributeValue::S("user@example.com".to_string()),
            ),
            ("is_active".to_string(), AttributeValue::Bool(true)),
        ]);
        let subscriber = subscriber_from_item(item).unwrap();
        assert_eq!(subscriber.id, "sub-1");
        assert_eq!(subscriber.email.to_string(), "user@example.com");
        assert!(subscriber.is_active);
    }

    #[test]
    fn subscriber_from_item_rejects_invalid_email() {
        let item = HashMap::from([
            ("SK".to_string(), AttributeValue::S("sub-1".to_string())),
            (
                "email".to_string(),
                AttributeValue::S("not-an-email".to_string()),
            ),
            ("is_active".to_string(), AttributeValue::Bool(true)),
        ]);
        assert!(subscriber_from_item(item).is_err());
    }
}
