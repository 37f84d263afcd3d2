//! Background polling for display surfaces that must stay live without
//! user action (kitchen, waiter, delivery boards).
//!
//! Each surface runs its own scheduler; schedulers are not coordinated
//! with each other and may race, which the cache's per-key granularity
//! makes safe. Teardown cancels the loop (a refresh in flight is dropped,
//! so nothing lands after teardown) and invalidates the surface's cache
//! entries so a later remount starts from a clean fetch.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::RemoteBackend;
use crate::engine::OrderEngine;
use crate::projection::Surface;

/// Reference refresh cadence for the live boards.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(30);

pub struct PollingScheduler {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    /// Start polling a surface: one immediate fetch, then one per period
    /// until shutdown.
    pub fn spawn<B>(engine: Arc<OrderEngine<B>>, surface: Surface, period: Duration) -> Self
    where
        B: RemoteBackend + 'static,
    {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            // A refresh that outlasts the period must not cause a burst of
            // catch-up fetches afterwards.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The mount fetch skips the debounce window so the board has
            // data right away, starting from a clean cache key.
            engine.invalidate_surface(surface);
            tokio::select! {
                _ = loop_token.cancelled() => {}
                result = engine.load(surface) => match result {
                    Ok(orders) => debug!(%surface, count = orders.len(), "mount fetch"),
                    Err(err) => warn!(%surface, error = %err, "mount fetch failed"),
                },
            }

            while !loop_token.is_cancelled() {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = loop_token.cancelled() => break,
                            result = engine.refresh(surface) => match result {
                                Ok(Some(orders)) => {
                                    debug!(%surface, count = orders.len(), "poll refresh");
                                }
                                Ok(None) => {
                                    debug!(%surface, "poll refresh superseded");
                                }
                                Err(err) => {
                                    // Polling is not retried out of band; the
                                    // next tick is the retry.
                                    warn!(%surface, error = %err, "poll refresh failed");
                                }
                            },
                        }
                    }
                }
            }

            engine.invalidate_surface(surface);
            debug!(%surface, "polling stopped, surface cache invalidated");
        });

        Self {
            token,
            task: Some(task),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop polling and wait for the loop to finish its teardown.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        // Dropping the handle tears the loop down as well; teardown
        // invalidation then runs on the runtime in the background.
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockBackend;
    use crate::cache::ResourceCache;
    use crate::routes::Routes;
    use reqwest::Method;
    use serde_json::json;

    fn polling_engine() -> Arc<OrderEngine<MockBackend>> {
        Arc::new(OrderEngine::new(
            MockBackend::new(|_, _, _| Ok(json!([]))),
            Arc::new(ResourceCache::new()),
            Routes::new("restaurant", "1"),
        ))
    }

    #[tokio::test]
    async fn mount_fetch_does_not_wait_out_the_debounce_window() {
        let engine = polling_engine();
        let scheduler = PollingScheduler::spawn(
            Arc::clone(&engine),
            Surface::Kitchen,
            Duration::from_secs(30),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            engine.coordinator().backend().call_count(),
            1,
            "the board must have data before the 300ms debounce window elapses"
        );

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn polls_immediately_and_then_on_the_interval() {
        let engine = polling_engine();
        let scheduler = PollingScheduler::spawn(
            Arc::clone(&engine),
            Surface::Kitchen,
            Duration::from_millis(20),
        );

        // Each refresh pays the 300ms debounce window before its fetch.
        tokio::time::sleep(Duration::from_millis(800)).await;
        let fetched = engine.coordinator().backend().count_for(&Method::GET);
        assert!(
            fetched >= 2,
            "expected the immediate fetch plus at least one interval fetch, got {fetched}"
        );

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_fetching_and_clears_the_surface_cache() {
        let engine = polling_engine();
        let scheduler = PollingScheduler::spawn(
            Arc::clone(&engine),
            Surface::Waiter,
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(400)).await;

        scheduler.shutdown().await;
        assert!(
            engine
                .coordinator()
                .cache()
                .get("/restaurant/1/waiter/orders/")
                .is_none(),
            "teardown must invalidate the surface's cache key"
        );

        let after_shutdown = engine.coordinator().backend().call_count();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            engine.coordinator().backend().call_count(),
            after_shutdown,
            "no fetches may land after teardown"
        );
    }

    #[tokio::test]
    async fn surfaces_poll_independently() {
        let engine = polling_engine();
        let kitchen = PollingScheduler::spawn(
            Arc::clone(&engine),
            Surface::Kitchen,
            Duration::from_millis(20),
        );
        let delivery = PollingScheduler::spawn(
            Arc::clone(&engine),
            Surface::Delivery,
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(400)).await;

        kitchen.shutdown().await;
        assert!(!delivery.is_cancelled());
        tokio::time::sleep(Duration::from_millis(400)).await;

        let calls = engine.coordinator().backend().calls.lock().expect("call log");
        assert!(
            calls
                .iter()
                .any(|(_, path)| path == "/restaurant/1/delivery/orders/"),
            "delivery board must keep polling after the kitchen board unmounts"
        );
        drop(calls);
        delivery.shutdown().await;
    }
}
