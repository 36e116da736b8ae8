//! Background task returning quota held by abandoned reservations.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::services::reservation::ReservationManager;

/// Sweep expired reservations every `every`, at most `batch_size` per tick.
///
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_reservation_sweeper(
    manager: Arc<ReservationManager>,
    every: Duration,
    batch_size: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match manager.sweep_expired(Utc::now(), batch_size).await {
                Ok(0) => {}
                Ok(reclaimed) => {
                    tracing::info!(reclaimed, "Expired reservations rolled back");
                }
                Err(err) => {
                    tracing::error!(error = %err, "Reservation sweep failed");
                }
            }
        }
    })
}
