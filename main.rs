/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! `navtrail` daemon.
//!
//! Reads JSON lines from stdin, each either `{"event": ...}` or
//! `{"command": ...}`, and answers every command with one JSON line on stdout.
//! Logs go to stderr. Exits cleanly on EOF.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use navtrail::errors::StorageError;
use navtrail::prefs::{Prefs, StorageKind, cli_args};
use navtrail::runtime::wire::handle_line;
use navtrail::runtime::{NavigationTracker, RetentionWorker, StaticTabQuery};
use navtrail::store::{MemoryStateStorage, RedbStateStorage, StateStorage, StoreConfig, StoreHandle};

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("stdio: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("navtrail=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli_args().run();
    let prefs = match Prefs::resolve(&cli) {
        Ok(prefs) => prefs,
        Err(e) => {
            eprintln!("navtrail: {e}");
            return ExitCode::FAILURE;
        },
    };
    init_tracing(&prefs.log_filter);
    tracing::info!(version = navtrail::VERSION, "navtrail starting");

    match run(prefs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        },
    }
}

async fn run(prefs: Prefs) -> Result<(), DaemonError> {
    let storage: Arc<dyn StateStorage> = match prefs.storage {
        StorageKind::Memory => Arc::new(MemoryStateStorage::new()),
        StorageKind::Redb => Arc::new(RedbStateStorage::open(&prefs.data_dir)?),
    };
    let store = StoreHandle::spawn(storage, StoreConfig::from_prefs(&prefs)).await?;
    let tabs = Arc::new(StaticTabQuery::new());
    let tracker = NavigationTracker::new(store.clone(), Arc::clone(&tabs));
    let retention = RetentionWorker::spawn(
        store.clone(),
        Duration::from_secs(prefs.sweep_interval_secs),
        CancellationToken::new(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let Some(response) = handle_line(&tracker, &tabs, &line).await else {
            continue;
        };
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }

    log::info!("daemon: input closed, shutting down");
    tracker.flush().await;
    tracker.shutdown().await;
    retention.shutdown().await;
    drop(tracker);
    store.shutdown().await;
    Ok(())
}
