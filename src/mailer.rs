use crate::types::EmailQueueItem;
use anyhow::{Context, Result};
use aws_sdk_sesv2::Client;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message, MessageHeader};
use email_address::EmailAddress;
use tracing::info;

// ============================================================================
// Mailer trait
// ============================================================================

/// Outbound mail transport. Implementations handle transport concerns
/// (SES request construction, credentials, etc.).
///
/// Extra headers are passed as `(name, value)` string pairs so that
/// implementations are not coupled to AWS SDK types. Failures are opaque:
/// the dispatcher does not distinguish transient from permanent errors and
/// retries through its resume cursor on a later invocation.
#[allow(async_fn_in_trait)]
pub trait Mailer: Send + Sync {
    async fn send_email(
        &self,
        recipient: &EmailAddress,
        subject: &str,
        html_content: &str,
        text_content: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<()>;

    /// Send one campaign message with RFC 8058 List-Unsubscribe headers, as
    /// mailbox providers expect for bulk mail.
    async fn send_campaign_email(&self, item: &EmailQueueItem) -> Result<()> {
        let list_unsub_value = format!("<{}>", item.unsubscribe_url);
        let extra_headers: &[(&str, &str)] = &[
            ("List-Unsubscribe", &list_unsub_value),
            ("List-Unsubscribe-Post", "List-Unsubscribe=One-Click"),
        ];
        self.send_email(
            &item.recipient,
            &item.subject,
            &item.html,
            &item.text,
            extra_headers,
        )
        .await
    }
}

// ============================================================================
// SesMailer — AWS SES v2 implementation
// ============================================================================

pub struct SesMailer {
    ses_client: Client,
    from_address: String,
    reply_to_address: String,
    configuration_set_name: Option<String>,
}

impl SesMailer {
    pub fn new(
        ses_client: Client,
        from_address: String,
        reply_to_address: String,
        configuration_set_name: Option<String>,
    ) -> Self {
        Self {
            ses_client,
            from_address,
            reply_to_address,
            configuration_set_name,
        }
    }
}

impl Mailer for SesMailer {
    async fn send_email(
        &self,
        recipient: &EmailAddress,
        subject: &str,
        html_content: &str,
        text_content: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<()> {
        let subject_content = Content::builder().data(subject).charset("UTF-8").build()?;
        let html_body = Content::builder()
            .data(html_content)
            .charset("UTF-8")
            .build()?;
        let text_body = Content::builder()
            .data(text_content)
            .charset("UTF-8")
            .build()?;

        let body = Body::builder().html(html_body).text(text_body).build();

        let mut message_builder = Message::builder().subject(subject_content).body(body);
        for (name, value) in extra_headers {
            let header = MessageHeader::builder().name(*name).value(*value).build()?;
            message_builder = message_builder.headers(header);
        }
        let message = message_builder.build();

        let destination = Destination::builder()
            .to_addresses(recipient.to_string())
            .build();
        let email_content = EmailContent::builder().simple(message).build();

        let response = self
            .ses_client
            .send_email()
            .from_email_address(&self.from_address)
            .reply_to_addresses(&self.reply_to_address)
            .destination(destination)
            .content(email_content)
            .set_configuration_set_name(self.configuration_set_name.clone())
            .send()
            .await
            .context(format!("Failed to send email to {}", recipient))?;

        info!(
            message_id = ?response.message_id(),
            recipient = %recipient,
            "Email sent"
        );

        Ok(())
    }
}

// ============================================================================
// Test utilities — RecordingMailer for in-crate tests
// ============================================================================
