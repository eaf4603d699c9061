use super::notifier::{ExpiredProposal, ExpiryNotifier};
use crate::core::{Result, SyncEntity, SyncError};
use crate::store::RecordStore;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Level, event};

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Anything holding proposals with a TTL.
pub trait ExpiringStore: Send {
    /// Removes proposals whose TTL has passed and returns them.
    fn purge_expired(&mut self) -> Vec<ExpiredProposal>;
}

impl<T> ExpiringStore for RecordStore<T>
where
    T: SyncEntity + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn purge_expired(&mut self) -> Vec<ExpiredProposal> {
        RecordStore::purge_expired(self)
    }
}

/// One expiry check: purge, then notify for each purged proposal.
pub fn run_expiry_check<S: ExpiringStore + ?Sized>(
    store: &mut S,
    notifier: &dyn ExpiryNotifier,
) -> Vec<ExpiredProposal> {
    let expired = store.purge_expired();
    for proposal in &expired {
        notifier.notify_expired(proposal);
    }
    expired
}

/// Background task running [`run_expiry_check`] on a fixed interval.
pub struct ExpiryMonitor {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl ExpiryMonitor {
    /// Signals the monitor to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| SyncError::MonitorJoin(err.to_string()))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ExpiryMonitor {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the expiry monitor for `store` on the current tokio runtime.
pub fn spawn_expiry_monitor<S>(
    store: Arc<Mutex<S>>,
    check_interval: Duration,
    notifier: Arc<dyn ExpiryNotifier>,
) -> ExpiryMonitor
where
    S: ExpiringStore + 'static,
{
    let period = check_interval.max(MIN_CHECK_INTERVAL);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    let mut guard = store.lock().await;
                    let expired = run_expiry_check(&mut *guard, notifier.as_ref());
                    if !expired.is_empty() {
                        event!(Level::DEBUG, purged = expired.len(), "expiry check purged proposals");
                    }
                }
            }
        }
    });

    ExpiryMonitor {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
