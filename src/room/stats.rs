//! Periodic RTC statistics reporting
//!
//! Every interval the reporter snapshots the session's transports, producers
//! and consumers, asks the media engine for their stats and sends one
//! fire-and-forget `rtcStats` message per entity.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::session::RoomSession;
use crate::media::MediaTransport;

/// Point-in-time view of what to report on
pub(crate) struct StatsSnapshot {
    pub send_transport: Option<Arc<dyn MediaTransport>>,
    pub recv_transport: Option<Arc<dyn MediaTransport>>,
    pub producer_ids: Vec<String>,
    pub consumer_ids: Vec<String>,
}

pub struct StatsReporter {
    cancel: CancellationToken,
}

impl StatsReporter {
    /// Start reporting for `session` until cancelled or the session is dropped
    pub fn spawn(session: Weak<RoomSession>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(session) = session.upgrade() else {
                    break;
                };
                let sent = report_once(&session);
                trace!("Sent {} stats report(s)", sent);
            }
            debug!("Stats reporter stopped");
        });

        Self { cancel }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Collect and send one round of reports, returning how many were sent
pub fn report_once(session: &RoomSession) -> usize {
    let mut reports: Vec<Value> = Vec::new();
    let snapshot = session.stats_snapshot();

    let transports = snapshot.send_transport.iter().chain(snapshot.recv_transport.iter());
    for transport in transports {
        match transport.stats() {
            Ok(stats) => reports.push(stats),
            Err(e) => debug!("Failed to get transport {} stats: {}", transport.id(), e),
        }
    }
    if let Some(send) = &snapshot.send_transport {
        for producer_id in &snapshot.producer_ids {
            match send.producer_stats(producer_id) {
                Ok(stats) => reports.push(stats),
                Err(e) => debug!("Failed to get producer {} stats: {}", producer_id, e),
            }
        }
    }
    if let Some(recv) = &snapshot.recv_transport {
        for consumer_id in &snapshot.consumer_ids {
            match recv.consumer_stats(consumer_id) {
                Ok(stats) => reports.push(stats),
                Err(e) => debug!("Failed to get consumer {} stats: {}", consumer_id, e),
            }
        }
    }

    let mut sent = 0;
    for stats in reports {
        match session.send_stats(stats) {
            Ok(()) => sent += 1,
            Err(e) => {
                debug!("Failed to send stats report: {}", e);
                break;
            }
        }
    }
    sent
}
