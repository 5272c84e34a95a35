//! Throttled fan-out to many recipients.

use std::sync::Arc;
use std::time::Duration;

use roomie_bot::{send_with_timeout, Content, MessagingGateway};
use roomie_types::ActorId;

/// Aggregate result of one broadcast. Individual failures never abort the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn summary(&self) -> String {
        format!(
            "Broadcast finished: {} delivered, {} failed, {} recipient(s) total.",
            self.delivered, self.failed, self.recipients
        )
    }
}

pub struct Broadcaster {
    gateway: Arc<dyn MessagingGateway>,
    interval: Duration,
    delivery_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        interval: Duration,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            interval: interval.max(Duration::from_millis(1)),
            delivery_timeout,
        }
    }

    /// Sends `content` to every recipient, at most one send per interval tick.
    #[tracing::instrument(skip(self, recipients, content), fields(recipients = recipients.len()))]
    pub async fn run(&self, recipients: &[ActorId], content: &Content) -> BroadcastReport {
        let mut report = BroadcastReport {
            recipients: recipients.len(),
            ..BroadcastReport::default()
        };
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        for recipient in recipients {
            ticker.tick().await;
            match send_with_timeout(
                self.gateway.as_ref(),
                *recipient,
                content,
                None,
                self.delivery_timeout,
            )
            .await
            {
                Ok(_) => report.delivered += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(recipient = %recipient, error = %error, "broadcast delivery failed");
                }
            }
        }
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "broadcast finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingGateway;

    #[tokio::test]
    async fn functional_broadcast_continues_past_failures_and_reports_totals() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.fail_for(ActorId(2)).await;
        gateway.fail_for(ActorId(4)).await;
        let broadcaster = Broadcaster::new(
            gateway.clone(),
            Duration::from_millis(1),
            Duration::from_secs(1),
        );
        let recipients: Vec<ActorId> = (1..=5).map(ActorId).collect();

        let report = broadcaster
            .run(&recipients, &Content::text("house meeting at 8"))
            .await;
        assert_eq!(
            report,
            BroadcastReport {
                recipients: 5,
                delivered: 3,
                failed: 2
            }
        );
        assert_eq!(gateway.sent_to(ActorId(5)).await.len(), 1);
        assert!(report.summary().contains("3 delivered, 2 failed"));
    }

    #[tokio::test]
    async fn unit_broadcast_spaces_sends_by_the_interval() {
        let gateway = Arc::new(RecordingGateway::new());
        let broadcaster = Broadcaster::new(
            gateway.clone(),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        let recipients: Vec<ActorId> = (1..=4).map(ActorId).collect();
        let started = tokio::time::Instant::now();
        broadcaster.run(&recipients, &Content::text("hi")).await;
        // First tick completes immediately; the remaining three wait one interval each.
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(gateway.calls().await.len(), 4);
    }

    #[tokio::test]
    async fn regression_empty_recipient_list_reports_zero() {
        let broadcaster = Broadcaster::new(
            Arc::new(RecordingGateway::new()),
            Duration::ZERO,
            Duration::from_secs(1),
        );
        assert_eq!(
            broadcaster.run(&[], &Content::text("x")).await,
            BroadcastReport::default()
        );
    }
}
