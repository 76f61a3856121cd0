/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;
use std::time::Duration;

use crate::model::TabId;

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecentNavigation {
    url: String,
    at_ms: u64,
}

/// Absorbs the duplicate "committed" + "history-state-updated" signals the
/// platform emits for one logical navigation.
///
/// Only the first sighting of a `(tab, url)` pair opens a window; duplicates
/// inside the window do not extend it.
#[derive(Debug, Clone)]
pub struct NavigationDebouncer {
    window_ms: u64,
    recent: HashMap<TabId, RecentNavigation>,
}

impl NavigationDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            recent: HashMap::new(),
        }
    }

    /// Returns `true` if this navigation repeats the tab's last one inside the
    /// window; otherwise records it and returns `false`.
    pub fn is_duplicate(&mut self, tab: TabId, url: &str, now_ms: u64) -> bool {
        if let Some(recent) = self.recent.get(&tab)
            && recent.url == url
            && now_ms.saturating_sub(recent.at_ms) < self.window_ms
        {
            return true;
        }
        self.recent.insert(
            tab,
            RecentNavigation {
                url: url.to_string(),
                at_ms: now_ms,
            },
        );
        false
    }

    pub fn forget(&mut self, tab: TabId) {
        self.recent.remove(&tab);
    }
}

impl Default for NavigationDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}
