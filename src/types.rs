use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Campaign lifecycle. Transitions only move forward:
/// `DRAFT → SCHEDULED → SENDING → {COMPLETED | FAILED}`.
///
/// The dispatcher is the sole mutator from `SCHEDULED` onward; `DRAFT`
/// campaigns belong to the CMS and are never picked up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Scheduled => "SCHEDULED",
            CampaignStatus::Sending => "SENDING",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CampaignStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(CampaignStatus::Draft),
            "SCHEDULED" => Ok(CampaignStatus::Scheduled),
            "SENDING" => Ok(CampaignStatus::Sending),
            "COMPLETED" => Ok(CampaignStatus::Completed),
            "FAILED" => Ok(CampaignStatus::Failed),
            other => anyhow::bail!("Unknown campaign status '{}'", other),
        }
    }
}

/// Author-supplied email body, sanitized upstream by the CMS. The dispatcher
/// embeds `html_content` as-is into the document shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub title: String,
    pub html_content: String,
}

/// One newsletter send job, bound to one template and one schedule.
///
/// `total_recipients` is snapshotted once when the campaign enters `SENDING`
/// and never recomputed. `sent_emails` is the resume cursor: the count of
/// successfully dispatched messages, monotonically non-decreasing and never
/// exceeding `total_recipients`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub subject: String,
    pub template: EmailTemplate,
    pub status: CampaignStatus,
    pub scheduled_at: DateTime<Utc>,
    pub total_recipients: u32,
    pub sent_emails: u32,
}

impl Campaign {
    /// Create a campaign ready for pickup at `scheduled_at`.
    pub fn scheduled(
        id: String,
        subject: String,
        template: EmailTemplate,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject,
            template,
            status: CampaignStatus::Scheduled,
            scheduled_at,
            total_recipients: 0,
            sent_emails: 0,
        }
    }

    /// Whether the dispatcher has outstanding work on this campaign: the
    /// scheduled time has passed and it is either fresh (`SCHEDULED`) or was
    /// interrupted mid-send (`SENDING`).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            CampaignStatus::Scheduled | CampaignStatus::Sending
        ) && self.scheduled_at <= now
    }
}

/// A newsletter subscriber. Only active subscribers are eligible recipients;
/// the audience for a campaign is fixed when it enters `SENDING`.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: String,
    pub email: EmailAddress,
    pub is_active: bool,
}

impl Subscriber {
    pub fn new(id: String, email: EmailAddress) -> Self {
        Self {
            id,
            email,
            is_active: true,
        }
    }
}

/// One fully rendered outbound message. Built fresh every dispatch run from
/// Campaign + Subscriber data and never persisted.
#[derive(Debug, Clone)]
pub struct EmailQueueItem {
    pub recipient: EmailAddress,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub unsubscribe_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn template() -> EmailTemplate {
        EmailTemplate {
            title: "Новости".to_string(),
            html_content: "<p>привет</p>".to_string(),
        }
    }

    #[test]
    fn status_display_from_str_round_trip() {
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Scheduled,
            CampaignStatus::Sending,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<CampaignStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_from_str_rejects_unknown() {
        assert!("QUEUED".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn scheduled_campaign_in_the_past_is_due() {
        let now = Utc::now();
        let campaign = Campaign::scheduled(
            "c1".to_string(),
            "Subject".to_string(),
            template(),
            now - Duration::minutes(5),
        );
        assert!(campaign.is_due(now));
    }

    #[test]
    fn future_campaign_is_not_due() {
        let now = Utc::now();
        let campaign = Campaign::scheduled(
            "c1".to_string(),
            "Subject".to_string(),
            template(),
            now + Duration::minutes(5),
        );
        assert!(!campaign.is_due(now));
    }

    #[test]
    fn interrupted_sending_campaign_is_due_again() {
        let now = Utc::now();
        let mut campaign = Campaign::scheduled(
            "c1".to_string(),
            "Subject".to_string(),
            template(),
            now - Duration::minutes(5),
        );
        campaign.status = CampaignStatus::Sending;
        campaign.total_recipients = 10;
        campaign.sent_emails = 4;
        assert!(campaign.is_due(now));
    }

    #[test]
    fn terminal_and_draft_campaigns_are_never_due() {
        let now = Utc::now();
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
        ] {
            let mut campaign = Campaign::scheduled(
                "c1".to_string(),
                "Subject".to_string(),
                template(),
                now - Duration::minutes(5),
            );
            campaign.status = status;
            assert!(!campaign.is_due(now), "{} must not be due", status);
        }
    }
}
