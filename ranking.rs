/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Display ordering for sibling lists. Never mutates the stored tree.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{Node, NodeId, Session};

const DAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;
const WEEK_MS: f64 = 7.0 * DAY_MS;
const MONTH_MS: f64 = 30.0 * DAY_MS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Most recently visited first.
    Time,
    /// Largest subtree first, then newest.
    Children,
    /// Most visited first, then newest.
    Visits,
    /// Weighted blend of recency, subtree size and visits.
    #[default]
    Smart,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub time: f64,
    pub descendants: f64,
    pub visits: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            time: 0.4,
            descendants: 0.35,
            visits: 0.25,
        }
    }
}

/// Recency on a 0..=100 scale: full marks for a day, half at a week, then a
/// slow slide down to 20 at five weeks.
fn time_score(age_ms: u64) -> f64 {
    let age = age_ms as f64;
    if age < DAY_MS {
        100.0
    } else if age < WEEK_MS {
        100.0 - ((age - DAY_MS) / (WEEK_MS - DAY_MS)) * 50.0
    } else {
        50.0 - ((age - WEEK_MS) / MONTH_MS).min(1.0) * 30.0
    }
}

fn descendant_score(descendants: usize) -> f64 {
    ((descendants as f64 + 1.0).log2() * 25.0).min(100.0)
}

fn visits_score(visits: u32) -> f64 {
    (f64::from(visits.max(1)).log10() * 50.0).min(100.0)
}

pub fn smart_score(node: &Node, session: &Session, now_ms: u64, weights: RankingWeights) -> f64 {
    let age = now_ms.saturating_sub(node.timestamp_ms);
    time_score(age) * weights.time
        + descendant_score(session.descendants(node.id).len()) * weights.descendants
        + visits_score(node.visit_count) * weights.visits
}

fn newest_first(a: &Node, b: &Node) -> Ordering {
    b.timestamp_ms.cmp(&a.timestamp_ms)
}

/// Order one sibling list. Stable: equal keys keep their stored order. Ids
/// missing from the session go last, in their stored order.
pub fn sort_siblings(ids: &[NodeId], session: &Session, mode: SortMode, now_ms: u64) -> Vec<NodeId> {
    let weights = RankingWeights::default();
    let (present, missing): (Vec<NodeId>, Vec<NodeId>) =
        ids.iter().copied().partition(|id| session.contains(*id));
    let mut keyed: Vec<(NodeId, &Node, f64, usize)> = present
        .iter()
        .filter_map(|id| session.node(*id))
        .map(|n| {
            let (score, descendants) = match mode {
                SortMode::Smart => (smart_score(n, session, now_ms, weights), 0),
                SortMode::Children => (0.0, session.descendants(n.id).len()),
                SortMode::Time | SortMode::Visits => (0.0, 0),
            };
            (n.id, n, score, descendants)
        })
        .collect();

    keyed.sort_by(|(_, a, a_score, a_desc), (_, b, b_score, b_desc)| {
        match mode {
            SortMode::Time => newest_first(a, b),
            SortMode::Children => b_desc.cmp(a_desc).then_with(|| newest_first(a, b)),
            SortMode::Visits => b
                .visit_count
                .cmp(&a.visit_count)
                .then_with(|| newest_first(a, b)),
            SortMode::Smart => b_score.partial_cmp(a_score).unwrap_or(Ordering::Equal),
        }
    });
    keyed.into_iter().map(|(id, ..)| id).chain(missing).collect()
}

/// A copy of `session` with every sibling list reordered for display.
pub fn sorted_session(session: &Session, mode: SortMode, now_ms: u64) -> Session {
    let mut sorted = session.clone();
    sorted.root_nodes = sort_siblings(&session.root_nodes, session, mode, now_ms);
    for (id, node) in &session.all_nodes {
        if node.children.len() < 2 {
            continue;
        }
        let children = sort_siblings(&node.children, session, mode, now_ms);
        if let Some(copy) = sorted.all_nodes.get_mut(id) {
            copy.children = children;
        }
    }
    sorted
}
