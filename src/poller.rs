//! Detection status polling
//!
//! Fixed-interval polling of the detection backend. Each tick spawns an
//! independent fetch so a slow request only delays its own cycle; failures
//! are logged and the cycle skipped. The poller never changes the
//! interaction mode itself, it only forwards snapshots as events.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::MissedTickBehavior;

use crate::backend::DetectionClient;
use crate::coordinator::machine::Event;
use crate::coordinator::state::DetectionSnapshot;

/// Periodic detection-status poller
pub struct StatusPoller {
    client: DetectionClient,
    interval: Duration,
    events: UnboundedSender<Event>,
}

impl StatusPoller {
    pub fn new(
        client: DetectionClient,
        interval: Duration,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            client,
            interval,
            events,
        }
    }

    /// Run until the event channel closes.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("status poller started ({}ms interval)", self.interval.as_millis());

        loop {
            ticker.tick().await;
            if self.events.is_closed() {
                tracing::debug!("event channel closed, poller exiting");
                return;
            }

            let client = self.client.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                match fetch_snapshot(&client).await {
                    Some(snapshot) => {
                        let _ = events.send(Event::Status(snapshot));
                    }
                    None => {
                        // Logged inside fetch_snapshot; skip this cycle.
                    }
                }
            });
        }
    }
}

/// Fetch and merge one poll cycle's worth of backend state.
///
/// The dedicated loop-state endpoint wins over the `looping` field in the
/// status payload; if it fails the payload's value stands.
async fn fetch_snapshot(client: &DetectionClient) -> Option<DetectionSnapshot> {
    let (status, loop_state) =
        tokio::join!(client.detection_status(), client.video_loop_state());

    let mut snapshot = match status {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::debug!("detection status fetch failed, skipping cycle: {}", e);
            return None;
        }
    };

    match loop_state {
        Ok(looping) => snapshot.loop_active = looping,
        Err(e) => {
            tracing::debug!("loop state fetch failed, using status payload: {}", e);
        }
    }

    Some(snapshot)
}
