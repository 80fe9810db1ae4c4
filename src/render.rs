use crate::types::{Campaign, EmailQueueItem, Subscriber};
use crate::unsubscribe;
use anyhow::{Context, Result};
use askama::Template;
use chrono::{DateTime, Utc};

/// Document shell wrapping the author-supplied campaign body. The body is
/// sanitized upstream and embedded unescaped.
#[derive(Template)]
#[template(path = "campaign.html")]
struct CampaignHtmlTemplate<'a> {
    title: &'a str,
    body_html: &'a str,
    unsubscribe_url: &'a str,
}

/// Plain-text alternative. Campaign bodies are HTML-only, so this carries the
/// title and the unsubscribe link.
#[derive(Template)]
#[template(path = "campaign.txt")]
struct CampaignTextTemplate<'a> {
    title: &'a str,
    unsubscribe_url: &'a str,
}

/// Construct the ephemeral per-recipient queue for one dispatch run.
///
/// Items come out sorted by subscriber id. The integer resume cursor indexes
/// into this order, so it must be identical across invocations of the same
/// campaign; sorting here keeps that true regardless of how the store returns
/// its rows.
pub fn build_queue(
    campaign: &Campaign,
    subscribers: &[Subscriber],
    secret: &str,
    base_url: &str,
    now: DateTime<Utc>,
) -> Result<Vec<EmailQueueItem>> {
    let mut ordered: Vec<&Subscriber> = subscribers.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    ordered
        .into_iter()
        .map(|subscriber| {
            let token = unsubscribe::derive_token(&subscriber.id, secret, now);
            let unsubscribe_url = unsubscribe::unsubscribe_url(base_url, &subscriber.id, &token);
            let (html, text) = render_message(campaign, &unsubscribe_url)?;
            Ok(EmailQueueItem {
                recipient: subscriber.email.clone(),
                subject: campaign.subject.clone(),
                html,
                text,
                unsubscribe_url,
            })
        })
        .collect()
}

/// Render the HTML and plain-text bodies for one recipient.
pub fn render_message(campaign: &Campaign, unsubscribe_url: &str) -> Result<(String, String)> {
    let html = CampaignHtmlTemplate {
        title: &campaign.template.title,
        body_html: &campaign.template.html_content,
        unsubscribe_url,
    }
    .render()
    .context("Failed to render campaign HTML")?;

    let text = CampaignTextTemplate {
        title: &campaign.template.title,
        unsubscribe_url,
    }
    .render()
    .context("Failed to render campaign text")?;

    Ok((html, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CampaignStatus, EmailTemplate};
    use email_address::EmailAddress;
    use std::str::FromStr;

    fn campaign() -> Campaign {
        Campaign {
            id: "c1".to_string(),
            subject: "Акции апреля".to_string(),
            template: EmailTemplate {
                title: "Апрельская рассылка".to_string(),
                html_content: "<h1>Скидки</h1><p>до <b>30%</b></p>".to_string(),
            },
            status: CampaignStatus::Scheduled,
            scheduled_at: Utc::now(),
            total_recipients: 0,
            sent_emails: 0,
        }
    }

    fn subscriber(id: &str, email: &str) -> Subscriber {
        Subscriber::new(id.to_string(), EmailAddress::from_str(email).unwrap())
    }

    #[test]
    fn html_embeds_raw_body_and_footer_link() {
        let (html, _) = render_message(&campaign(), "https://example.com/unsubscribe?sid=s1&token=t").unwrap();
        assert!(html.contains("<h1>Скидки</h1><p>до <b>30%</b></p>"));
        assert!(html.contains("<title>Апрельская рассылка</title>"));
        // The href is attribute-escaped; `&amp;` resolves back to `&`.
        assert!(html.contains("href=\"https://example.com/unsubscribe?sid=s1&amp;token=t\""));
    }

    #[test]
    fn text_alternative_carries_the_unsubscribe_link() {
        let (_, text) = render_message(&campaign(), "https://example.com/u").unwrap();
        assert!(text.contains("Апрельская рассылка"));
        assert!(text.contains("https://example.com/u"));
    }

    #[test]
    fn queue_is_ordered_by_subscriber_id() {
        let subscribers = vec![
            subscriber("sub-3", "c@example.com"),
            subscriber("sub-1", "a@example.com"),
            subscriber("sub-2", "b@example.com"),
        ];
        let queue = build_queue(
            &campaign(),
            &subscribers,
            "secret",
            "https://example.com",
            Utc::now(),
        )
        .unwrap();
        let recipients: Vec<String> = queue.iter().map(|i| i.recipient.to_string()).collect();
        assert_eq!(recipients, ["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[test]
    fn each_recipient_gets_a_distinct_unsubscribe_link() {
        let subscribers = vec![
            subscriber("sub-1", "a@example.com"),
            subscriber("sub-2", "b@example.com"),
        ];
        let queue = build_queue(
            &campaign(),
            &subscribers,
            "secret",
            "https://example.com",
            Utc::now(),
        )
        .unwrap();
        assert_ne!(queue[0].unsubscribe_url, queue[1].unsubscribe_url);
        assert!(queue[0].unsubscribe_url.contains("sid=sub-1"));
        assert!(queue[1].unsubscribe_url.contains("sid=sub-2"));
    }

    #[test]
    fn queue_items_carry_the_campaign_subject() {
        let subscribers = vec![subscriber("sub-1", "a@example.com")];
        let queue = build_queue(
            &campaign(),
            &subscribers,
            "secret",
            "https://example.com",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(queue[0].subject, "Акции апреля");
    }
}
