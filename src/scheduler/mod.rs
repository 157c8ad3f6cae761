//! Periodic sweeps
//!
//! Three independent loops, each running one sweep per tick in its own
//! transaction. A failed sweep is logged and retried on the next tick.

mod expiry;
mod flash_sales;
mod repricing;

pub use expiry::expire_sales;
pub use flash_sales::{activate_flash_sales, ActivationReport};
pub use repricing::{reprice_carts, RepriceReport};

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::services::Deps;

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts the activation, expiry and re-pricing loops.
    pub fn spawn(deps: Deps) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let sweeps = deps.config.sweeps;
        let mode = deps.config.activation;

        let handles = vec![
            every("flash_sale_activation", sweeps.flash_sales, rx.clone(), {
                let deps = deps.clone();
                move || {
                    let deps = deps.clone();
                    async move { activate_flash_sales(&deps, mode).await.map(|_| ()) }
                }
            }),
            every("sale_expiry", sweeps.sale_expiry, rx.clone(), {
                let deps = deps.clone();
                move || {
                    let deps = deps.clone();
                    async move { expire_sales(&deps).await.map(|_| ()) }
                }
            }),
            every("cart_repricing", sweeps.cart_reprice, rx, move || {
                let deps = deps.clone();
                async move { reprice_carts(&deps).await.map(|_| ()) }
            }),
        ];

        Self { shutdown, handles }
    }

    /// Stops the loops after any sweep in flight finishes.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sweep task ended abnormally");
            }
        }
    }
}

fn every<F, Fut>(name: &'static str, period: Duration, mut shutdown: watch::Receiver<bool>, sweep: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(sweep = name, period_secs = period.as_secs(), "sweep scheduled");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep().await {
                        tracing::error!(sweep = name, error = %e, "sweep failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!(sweep = name, "sweep stopped");
    })
}
