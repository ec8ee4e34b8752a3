// Periodic orphan sweep running in the background until shutdown.

use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{live::LiveStore, store::CanonicalStore, sync::sweeper::sweep_orphans};

/// Handle for the background sweep task. Dropping it leaves the task running;
/// call [`SweeperHandle::shutdown`] to stop it.
pub struct SweeperHandle {
    task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(error) = self.task.await {
            warn!(error = %error, "orphan sweeper task ended abnormally");
        }
    }
}

/// Start sweeping every `interval`. The first sweep runs one interval after
/// start so a restart loop cannot hammer the stores.
pub fn start_periodic_sweeper(
    live: LiveStore,
    store: CanonicalStore,
    interval: Duration,
    concurrency: usize,
) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "periodic orphan sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match sweep_orphans(&live, &store, concurrency).await {
                        Ok(report) => debug!(
                            deleted = report.deleted,
                            failed = report.failed,
                            "periodic orphan sweep completed"
                        ),
                        Err(error) => warn!(error = %error, "periodic orphan sweep failed"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("periodic orphan sweeper shutting down");
                    break;
                }
            }
        }
    });

    SweeperHandle { task, shutdown_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_common::room::{room_key, RoomEntity};
    use tokio::time;
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn sweeps_after_each_interval_until_shutdown() {
        let (live, rooms) = LiveStore::memory();
        let (store, _) = CanonicalStore::memory();
        let first = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        rooms.open(first.as_str()).await;

        let handle =
            start_periodic_sweeper(live, store, Duration::from_secs(60), 4);

        time::sleep(Duration::from_secs(30)).await;
        assert!(rooms.contains(first.as_str()).await, "no sweep before the first interval");

        time::sleep(Duration::from_secs(31)).await;
        assert!(!rooms.contains(first.as_str()).await);

        let second = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        rooms.open(second.as_str()).await;
        time::sleep(Duration::from_secs(60)).await;
        assert!(!rooms.contains(second.as_str()).await);

        handle.shutdown().await;
        let third = room_key("acme", RoomEntity::Issue(Uuid::new_v4()), None);
        rooms.open(third.as_str()).await;
        time::sleep(Duration::from_secs(120)).await;
        assert!(rooms.contains(third.as_str()).await);
    }
}
