/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab lifecycle bookkeeping.
//!
//! These operations never fail and are safe to apply twice or in any order
//! relative to each other.

use crate::model::{StoreState, TabId};

/// A tab was created with a known opener.
pub fn record_opener(state: &mut StoreState, tab: TabId, opener: Option<TabId>) -> bool {
    let Some(opener) = opener else {
        return false;
    };
    if opener == tab {
        return false;
    }
    state.pending_source_tab.insert(tab, opener);
    log::debug!("tabs: tab {tab} opened from {opener}");
    true
}

/// The platform reported a navigation target created from `source`. This is
/// more reliable than opener hints and overwrites them.
pub fn record_navigation_target(state: &mut StoreState, source: TabId, tab: TabId) -> bool {
    if source == tab {
        return false;
    }
    state.pending_source_tab.insert(tab, source);
    log::debug!("tabs: navigation target {tab} created from {source}");
    true
}

/// A tab closed; drop every key that belongs to it.
pub fn forget_tab(state: &mut StoreState, tab: TabId) -> bool {
    let had_node = state.tab_to_node.remove(&tab).is_some();
    let had_hint = state.pending_source_tab.remove(&tab).is_some();
    had_node || had_hint
}

/// Consume the pending source hint for `tab`.
pub fn take_pending_source(state: &mut StoreState, tab: TabId) -> Option<TabId> {
    state.pending_source_tab.remove(&tab)
}
