/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Periodic retention sweep.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::StoreHandle;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background worker that asks the store to enforce `maxSessions` once per
/// interval until cancelled.
pub struct RetentionWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RetentionWorker {
    pub fn spawn(store: StoreHandle, interval: Duration, cancel: CancellationToken) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("retention: worker cancelled");
                }
                _ = sweep_loop(store, interval) => {}
            }
        });
        log::debug!("retention: worker spawned ({interval:?} interval)");
        Self { cancel, handle }
    }

    /// Cancel the worker and wait for it to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log::warn!("retention: worker ended abnormally ({e})");
        }
    }
}

async fn sweep_loop(store: StoreHandle, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the first sweep waits a full period.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match store.sweep_retention().await {
            Ok(evicted) if !evicted.is_empty() => {
                log::info!("retention: evicted {} old sessions", evicted.len());
            },
            Ok(_) => {},
            Err(e) => log::warn!("retention: sweep failed ({e})"),
        }
    }
}
