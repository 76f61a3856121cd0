/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! JSON-lines input of the daemon: one `{"event": ...}` or `{"command": ...}`
//! per line.

use serde::{Deserialize, Serialize};

use super::{CommandResponse, NavigationTracker, StaticTabQuery, TabQuery, UiCommand, commands};
use crate::navigation::BrowserEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Input {
    Event(BrowserEvent),
    Command(UiCommand),
}

/// Handle one input line. Events are queued and answer nothing; commands
/// first wait for every event queued before them.
pub async fn handle_line<Q: TabQuery>(
    tracker: &NavigationTracker<Q>,
    tabs: &StaticTabQuery,
    line: &str,
) -> Option<CommandResponse> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Input>(line) {
        Ok(Input::Event(event)) => {
            tabs.observe(&event);
            tracker.dispatch(event);
            None
        },
        Ok(Input::Command(command)) => {
            tracker.flush().await;
            Some(commands::execute(tracker.store(), command).await)
        },
        Err(e) => {
            log::warn!("wire: unreadable input line ({e})");
            Some(CommandResponse {
                success: false,
                error: Some(format!("invalid input: {e}")),
                ..CommandResponse::default()
            })
        },
    }
}
