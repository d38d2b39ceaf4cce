//! The periodic refresh scheduler.
//!
//! A single background task re-triggers the REST observation+forecast
//! fetch on a fixed interval. Event-driven triggers (manual refresh,
//! station switch, broadcast toggle) run the fetch themselves and then
//! reset this timer, so a manual refresh doesn't get a periodic one right
//! on its heels.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::orchestrator::WeatherHub;

/// Default refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Sender half of the timer-reset channel.
pub(crate) type ResetSender = mpsc::UnboundedSender<()>;

/// Receiver half of the timer-reset channel.
pub(crate) type ResetReceiver = mpsc::UnboundedReceiver<()>;

/// Create the timer-reset channel.
pub(crate) fn reset_channel() -> (ResetSender, ResetReceiver) {
    mpsc::unbounded_channel()
}

/// Restart the periodic timer from now.
pub(crate) fn reset(tx: &ResetSender) {
    let _ = tx.send(());
}

/// Spawn the refresh loop. Runs until the token is cancelled.
pub(crate) fn spawn(
    hub: Arc<WeatherHub>,
    period: Duration,
    mut reset_rx: ResetReceiver,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; the startup fetch is the
        // orchestrator's job, not ours.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("refresh scheduler cancelled, shutting down");
                    break;
                }
                reset = reset_rx.recv() => match reset {
                    Some(()) => {
                        debug!("refresh timer reset");
                        ticker = interval(period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        ticker.tick().await;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    debug!("periodic refresh tick");
                    hub.do_refresh().await;
                }
            }
        }
    })
}
