/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Transition classification.
//!
//! Maps one committed navigation plus the tab bookkeeping around it to a parent
//! decision. Pure and total: no store access, no I/O.
//!
//! Priority order:
//! 1. out-of-scope URLs are ignored
//! 2. reloads refresh the mapped node in place
//! 3. an explicit origin-tab qualifier wins over everything else
//! 4. address-bar entries start a new root unless a pending source hint or an
//!    in-page search flag says otherwise
//! 5. everything else follows same-tab history, then the pending hint, then root

use super::{TransitionQualifier, TransitionType, is_trackable_url, origin_tab};
use crate::model::{NodeId, TabId};

/// The node the navigating tab currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedNode<'a> {
    pub id: NodeId,
    pub url: &'a str,
    pub parent_id: Option<NodeId>,
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub url: &'a str,
    pub transition_type: TransitionType,
    pub qualifiers: &'a [TransitionQualifier],
    pub tab_id: TabId,
    pub mapped: Option<MappedNode<'a>>,
    pub pending_source: Option<TabId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPolicy {
    /// Remove the pending source hint once it has been used as a parent.
    pub consume_pending_hint: bool,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            consume_pending_hint: true,
        }
    }
}

/// Where the navigated page attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Out of scope, or a reload with nothing to refresh.
    Ignore,
    /// Reload of the mapped page: refresh timestamp and title only.
    RefreshInPlace(NodeId),
    /// Start a new root.
    Root,
    /// Attach under an existing node.
    ParentOf(NodeId),
    /// Attach under whatever node shows the given tab's current page,
    /// creating one for that page if the tab has none yet.
    ParentOfTab(TabId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub decision: Decision,
    /// The pending source hint for the navigating tab should be removed.
    pub consumes_hint: bool,
}

impl Classification {
    fn keep(decision: Decision) -> Self {
        Self {
            decision,
            consumes_hint: false,
        }
    }
}

pub fn classify(input: &ClassifierInput<'_>, policy: ClassifierPolicy) -> Classification {
    if !is_trackable_url(input.url) {
        return Classification::keep(Decision::Ignore);
    }

    if input.transition_type == TransitionType::Reload {
        return Classification::keep(match input.mapped {
            Some(mapped) if mapped.url == input.url => Decision::RefreshInPlace(mapped.id),
            _ => Decision::Ignore,
        });
    }

    if let Some(origin) = origin_tab(input.qualifiers) {
        return Classification::keep(Decision::ParentOfTab(origin));
    }

    let from_hint = |source: TabId| Classification {
        decision: Decision::ParentOfTab(source),
        consumes_hint: policy.consume_pending_hint,
    };

    if input.transition_type.is_address_bar_entry() {
        if let Some(source) = input.pending_source {
            return from_hint(source);
        }
        let in_page_search = input
            .qualifiers
            .contains(&TransitionQualifier::FromAddressBar);
        return Classification::keep(match input.mapped {
            Some(mapped) if in_page_search => same_tab_parent(mapped, input.url),
            _ => Decision::Root,
        });
    }

    match (input.mapped, input.pending_source) {
        (Some(mapped), _) => Classification::keep(same_tab_parent(mapped, input.url)),
        (None, Some(source)) => from_hint(source),
        (None, None) => Classification::keep(Decision::Root),
    }
}

/// In-page navigation hangs off the mapped node. Re-navigating to the page the
/// tab already shows resolves to that node's own parent so dedup finds it.
fn same_tab_parent(mapped: MappedNode<'_>, url: &str) -> Decision {
    if mapped.url != url {
        return Decision::ParentOf(mapped.id);
    }
    match mapped.parent_id {
        Some(parent) => Decision::ParentOf(parent),
        None => Decision::Root,
    }
}
