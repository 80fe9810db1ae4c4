use crate::configuration::DispatchConfig;
use crate::mailer::Mailer;
use crate::rate_limiter::RateLimiter;
use crate::render;
use crate::storage::Storage;
use crate::types::{Campaign, CampaignStatus, EmailQueueItem};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The campaign dispatch loop: discovers due campaigns, transitions their
/// lifecycle state, and delivers messages in rate-limited concurrent batches,
/// checkpointing the resume cursor after every batch.
///
/// Campaigns are processed strictly sequentially; the only parallelism is
/// inside a batch. The dispatcher takes no lock of its own; the external
/// scheduler must not overlap invocations.
pub struct CampaignDispatcher<S, M> {
    storage: Arc<S>,
    mailer: Arc<M>,
    config: DispatchConfig,
    unsubscribe_secret: String,
    base_url: String,
}

impl<S: Storage, M: Mailer> CampaignDispatcher<S, M> {
    pub fn new(
        storage: Arc<S>,
        mailer: Arc<M>,
        config: DispatchConfig,
        unsubscribe_secret: String,
        base_url: String,
    ) -> Self {
        Self {
            storage,
            mailer,
            config,
            unsubscribe_secret,
            base_url,
        }
    }

    /// Run one dispatch pass at `now`.
    ///
    /// Errors out only if discovery itself fails; a failure inside one
    /// campaign marks that campaign `FAILED` and the pass moves on, so one
    /// bad campaign cannot starve the others.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<()> {
        let due = self
            .storage
            .find_due_campaigns(now)
            .await
            .context("Failed to query due campaigns")?;

        if due.is_empty() {
            info!("No due campaigns");
            return Ok(());
        }
        info!(campaigns = due.len(), "Processing due campaigns");

        // Fresh limiter per run; it only constrains this invocation.
        let mut limiter = RateLimiter::new(self.config.emails_per_minute);

        for campaign in due {
            let campaign_id = campaign.id.clone();
            if let Err(e) = self.process_campaign(campaign, now, &mut limiter).await {
                error!(campaign_id = %campaign_id, error = %e, "Campaign processing failed");
                if let Err(e) = self
                    .storage
                    .set_status(&campaign_id, CampaignStatus::Failed)
                    .await
                {
                    error!(campaign_id = %campaign_id, error = %e, "Failed to record FAILED status");
                }
            }
        }

        Ok(())
    }

    async fn process_campaign(
        &self,
        campaign: Campaign,
        now: DateTime<Utc>,
        limiter: &mut RateLimiter,
    ) -> Result<()> {
        let subscribers = self
            .storage
            .find_active_subscribers()
            .await
            .context("Failed to fetch active subscribers")?;

        let (total, cursor) = match campaign.status {
            CampaignStatus::Scheduled => {
                if subscribers.is_empty() {
                    // Zero active subscribers will not resolve itself between
                    // invocations; fail instead of retrying forever.
                    warn!(campaign_id = %campaign.id, "No active subscribers, failing campaign");
                    self.storage
                        .set_status(&campaign.id, CampaignStatus::Failed)
                        .await?;
                    return Ok(());
                }
                let total = subscribers.len() as u32;
                // Snapshot first, then the SENDING transition. The status
                // write is the commit point: from here the campaign is
                // resumed via the cursor. A crash between the two writes
                // leaves it SCHEDULED, and re-admission re-derives the
                // snapshot; the reverse order could finalize a SENDING row
                // with a zero snapshot as COMPLETED without a single send.
                self.storage.set_total_recipients(&campaign.id, total).await?;
                self.storage
                    .set_status(&campaign.id, CampaignStatus::Sending)
                    .await?;
                info!(campaign_id = %campaign.id, total, "Campaign admitted for sending");
                (total, 0)
            }
            CampaignStatus::Sending => {
                info!(
                    campaign_id = %campaign.id,
                    sent = campaign.sent_emails,
                    total = campaign.total_recipients,
                    "Resuming interrupted campaign"
                );
                (campaign.total_recipients, campaign.sent_emails)
            }
            status => {
                warn!(campaign_id = %campaign.id, status = %status, "Campaign is not dispatchable");
                return Ok(());
            }
        };

        let queue = render::build_queue(
            &campaign,
            &subscribers,
            &self.unsubscribe_secret,
            &self.base_url,
            now,
        )?;

        let sent = self
            .send_batches(&campaign.id, &queue, total, cursor, limiter)
            .await?;

        if sent >= total {
            self.storage
                .set_status(&campaign.id, CampaignStatus::Completed)
                .await?;
            info!(campaign_id = %campaign.id, sent, "Campaign completed");
        } else {
            info!(campaign_id = %campaign.id, sent, total, "Campaign deferred to next invocation");
        }

        Ok(())
    }

    /// Send from position `start` towards `total`, one rate-limited batch at
    /// a time, persisting the cursor after every batch. Returns the cursor
    /// position reached.
    async fn send_batches(
        &self,
        campaign_id: &str,
        queue: &[EmailQueueItem],
        total: u32,
        start: u32,
        limiter: &mut RateLimiter,
    ) -> Result<u32> {
        let mut sent = start;

        while sent < total {
            let allowance = limiter.allowance();
            if allowance == 0 {
                info!(campaign_id = %campaign_id, sent, total, "Send budget exhausted, deferring");
                break;
            }

            let begin = sent as usize;
            if begin >= queue.len() {
                // The snapshot outruns the current audience; needs operator
                // attention rather than a fabricated COMPLETED.
                warn!(
                    campaign_id = %campaign_id,
                    audience = queue.len(),
                    total,
                    "Audience shrank below the sending snapshot"
                );
                break;
            }

            let size = self
                .config
                .batch_size
                .min((total - sent).min(allowance) as usize)
                .min(queue.len() - begin);
            let batch = &queue[begin..begin + size];

            let results = join_all(batch.iter().map(|item| self.send_one(item))).await;
            limiter.record(batch.len() as u32);

            // Advance only past the contiguous prefix of successes so a
            // failed recipient is retried from the same position next run.
            // Later successes in the batch will be re-sent then:
            // at-least-once, never skipped.
            let delivered = results.iter().take_while(|r| r.is_ok()).count();
            for (item, result) in batch.iter().zip(&results) {
                if let Err(e) = result {
                    warn!(
                        campaign_id = %campaign_id,
                        recipient = %item.recipient,
                        error = %e,
                        "Send failed, will retry on a later invocation"
                    );
                }
            }

            sent += delivered as u32;
            self.storage
                .set_sent_emails(campaign_id, sent)
                .await
                .context("Failed to checkpoint sent count")?;

            if delivered < batch.len() {
                break;
            }
            if sent < total && !self.config.pause_between_batches.is_zero() {
                tokio::time::sleep(self.config.pause_between_batches).await;
            }
        }

        Ok(sent)
    }

    async fn send_one(&self, item: &EmailQueueItem) -> Result<()> {
        match tokio::time::timeout(
            self.config.send_timeout,
            self.mailer.send_campaign_email(item),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => anyhow::bail!("Send to {} timed out", item.recipient),
        }
    }
}
