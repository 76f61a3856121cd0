/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Event routing.
//!
//! Every browser event is sequenced on a FIFO queue owned by its tab, so one
//! tab's events are handled strictly in arrival order while different tabs
//! interleave freely. The only await points in a handler are the platform tab
//! lookup and the round trip to the store actor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::errors::TrackerError;
use crate::model::TabId;
use crate::navigation::{BrowserEvent, TabInfo, origin_tab};
use crate::store::{NavigationRequest, StoreHandle};
use crate::tree::PageVisit;

pub mod commands;
pub mod retention;
pub mod wire;

pub use commands::{CommandResponse, UiCommand};
pub use retention::RetentionWorker;

/// Live tab lookups against the browser platform.
pub trait TabQuery: Send + Sync + 'static {
    /// Current page of `tab`, or `None` once the tab has gone away.
    fn tab_info(&self, tab: TabId) -> impl Future<Output = Option<TabInfo>> + Send;
}

/// Tab table fed from the event stream itself.
#[derive(Debug, Default)]
pub struct StaticTabQuery {
    tabs: RwLock<HashMap<TabId, TabInfo>>,
}

impl StaticTabQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, tab: TabId) {
        self.tabs.write().remove(&tab);
    }

    /// Track what each tab shows, the way the browser would report it.
    pub fn observe(&self, event: &BrowserEvent) {
        match event {
            BrowserEvent::NavigationCommitted {
                tab_id,
                frame_id: 0,
                url,
                title,
                fav_icon_url,
                ..
            }
            | BrowserEvent::HistoryStateUpdated {
                tab_id,
                frame_id: 0,
                url,
                title,
                fav_icon_url,
            } => {
                let mut tabs = self.tabs.write();
                let entry = tabs.entry(*tab_id).or_default();
                entry.url = url.clone();
                if title.is_some() {
                    entry.title = title.clone();
                }
                if fav_icon_url.is_some() {
                    entry.fav_icon_url = fav_icon_url.clone();
                }
            },
            BrowserEvent::TabCreated { tab_id, .. }
            | BrowserEvent::NavigationTargetCreated { tab_id, .. } => {
                self.tabs.write().entry(*tab_id).or_default();
            },
            BrowserEvent::TabRemoved { tab_id } => self.remove(*tab_id),
            _ => {},
        }
    }
}

impl TabQuery for StaticTabQuery {
    async fn tab_info(&self, tab: TabId) -> Option<TabInfo> {
        self.tabs.read().get(&tab).cloned()
    }
}

impl<Q: TabQuery> TabQuery for Arc<Q> {
    fn tab_info(&self, tab: TabId) -> impl Future<Output = Option<TabInfo>> + Send {
        (**self).tab_info(tab)
    }
}

enum Queued {
    Event(BrowserEvent),
    Flush(oneshot::Sender<()>),
}

struct TabQueue {
    generation: u64,
    tx: mpsc::UnboundedSender<Queued>,
}

struct Shared<Q> {
    store: StoreHandle,
    tabs: Q,
    queues: Mutex<HashMap<TabId, TabQueue>>,
    next_generation: AtomicU64,
}

/// Routes browser events into per-tab queues and applies them to the store.
pub struct NavigationTracker<Q> {
    shared: Arc<Shared<Q>>,
    workers: Mutex<JoinSet<()>>,
}

impl<Q: TabQuery> NavigationTracker<Q> {
    pub fn new(store: StoreHandle, tabs: Q) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                tabs,
                queues: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
            workers: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.shared.store
    }

    /// Queue `event` behind everything already queued for its tab.
    pub fn dispatch(&self, event: BrowserEvent) {
        let tab = event.tab_id();
        let mut queues = self.shared.queues.lock();
        let queue = queues.entry(tab).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
            let mut workers = self.workers.lock();
            while workers.try_join_next().is_some() {}
            workers.spawn(tab_worker(Arc::clone(&self.shared), tab, generation, rx));
            log::debug!("runtime: queue opened for tab {tab}");
            TabQueue { generation, tx }
        });
        if queue.tx.send(Queued::Event(event)).is_err() {
            log::warn!("runtime: queue for tab {tab} closed, event dropped");
        }
    }

    /// Handle one event immediately, bypassing the tab queues.
    pub async fn handle_event(&self, event: BrowserEvent) -> Result<(), TrackerError> {
        handle_event(&self.shared, event).await
    }

    /// Wait until every event queued so far has been handled.
    pub async fn flush(&self) {
        let waits: Vec<oneshot::Receiver<()>> = {
            let queues = self.shared.queues.lock();
            queues
                .values()
                .filter_map(|queue| {
                    let (done, wait) = oneshot::channel();
                    queue.tx.send(Queued::Flush(done)).ok().map(|_| wait)
                })
                .collect()
        };
        for wait in waits {
            let _ = wait.await;
        }
    }

    /// Drain every queue, then stop the workers.
    pub async fn shutdown(&self) {
        self.shared.queues.lock().clear();
        let mut workers = std::mem::take(&mut *self.workers.lock());
        log::debug!("runtime: shutdown requested, joining {} tab workers", workers.len());
        while workers.join_next().await.is_some() {}
    }

    #[cfg(test)]
    fn queue_count(&self) -> usize {
        self.shared.queues.lock().len()
    }
}

async fn tab_worker<Q: TabQuery>(
    shared: Arc<Shared<Q>>,
    tab: TabId,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<Queued>,
) {
    while let Some(queued) = rx.recv().await {
        let event = match queued {
            Queued::Event(event) => event,
            Queued::Flush(done) => {
                let _ = done.send(());
                continue;
            },
        };
        let closes_tab = matches!(event, BrowserEvent::TabRemoved { .. });
        if let Err(e) = handle_event(&shared, event).await {
            if e.is_silent() {
                log::debug!("runtime: tab {tab}: {e}");
            } else {
                log::warn!("runtime: tab {tab}: event dropped ({e})");
            }
        }
        if closes_tab {
            // Later events for a reused id get a fresh queue; anything already
            // in this one is still drained by this loop.
            let mut queues = shared.queues.lock();
            if queues.get(&tab).is_some_and(|q| q.generation == generation) {
                queues.remove(&tab);
            }
        }
    }
    log::debug!("runtime: queue closed for tab {tab}");
}

async fn handle_event<Q: TabQuery>(shared: &Shared<Q>, event: BrowserEvent) -> Result<(), TrackerError> {
    match event {
        BrowserEvent::NavigationCommitted {
            tab_id,
            frame_id,
            url,
            transition_type,
            transition_qualifiers,
            title,
            fav_icon_url,
        } => {
            if frame_id != 0 {
                return Ok(());
            }
            let Some(live) = shared.tabs.tab_info(tab_id).await else {
                log::debug!("runtime: tab {tab_id} closed before its navigation was recorded");
                return Ok(());
            };
            let title = title.or_else(|| live.title.clone().filter(|_| live.url == url));
            let fav_icon_url = fav_icon_url.or_else(|| live.fav_icon_url.clone().filter(|_| live.url == url));

            let mut sources = Vec::new();
            sources.extend(origin_tab(&transition_qualifiers));
            sources.extend(
                shared
                    .store
                    .snapshot()
                    .pending_source_tab
                    .get(&tab_id)
                    .copied(),
            );
            let mut source_pages = HashMap::new();
            for source in sources {
                if let Some(page) = shared.tabs.tab_info(source).await {
                    source_pages.insert(source, page);
                }
            }

            let request = NavigationRequest {
                tab_id,
                url,
                transition_type,
                qualifiers: transition_qualifiers,
                title,
                fav_icon_url,
                source_pages,
            };
            if let Some(node) = shared.store.navigate(request).await? {
                log::debug!("runtime: tab {tab_id} now on node {node}");
            }
            Ok(())
        },
        BrowserEvent::HistoryStateUpdated {
            tab_id,
            frame_id,
            url,
            title,
            fav_icon_url,
        } => {
            if frame_id != 0 {
                return Ok(());
            }
            let visit = PageVisit {
                url,
                title,
                fav_icon_url,
                tab_id: Some(tab_id),
            };
            shared.store.route_update(visit).await.map(|_| ())
        },
        BrowserEvent::TabCreated {
            tab_id,
            opener_tab_id,
        } => shared.store.tab_created(tab_id, opener_tab_id).await,
        BrowserEvent::NavigationTargetCreated {
            source_tab_id,
            tab_id,
        } => {
            shared
                .store
                .navigation_target_created(source_tab_id, tab_id)
                .await
        },
        BrowserEvent::TabRemoved { tab_id } => shared.store.tab_removed(tab_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::{TransitionQualifier, TransitionType};
    use crate::store::{MemoryStateStorage, StoreConfig};

    fn committed(tab: i32, url: &str, transition: &str, qualifiers: &[&str]) -> BrowserEvent {
        BrowserEvent::NavigationCommitted {
            tab_id: TabId(tab),
            frame_id: 0,
            url: url.to_string(),
            transition_type: TransitionType::from(transition),
            transition_qualifiers: qualifiers.iter().map(|q| TransitionQualifier::from(*q)).collect(),
            title: Some(format!("Title {url}")),
            fav_icon_url: None,
        }
    }

    async fn tracker() -> (NavigationTracker<Arc<StaticTabQuery>>, Arc<StaticTabQuery>) {
        let store = StoreHandle::spawn(Arc::new(MemoryStateStorage::new()), StoreConfig::default())
            .await
            .unwrap();
        let tabs = Arc::new(StaticTabQuery::new());
        (NavigationTracker::new(store, Arc::clone(&tabs)), tabs)
    }

    fn feed(tracker: &NavigationTracker<Arc<StaticTabQuery>>, tabs: &StaticTabQuery, event: BrowserEvent) {
        tabs.observe(&event);
        tracker.dispatch(event);
    }

    #[tokio::test]
    async fn per_tab_order_is_preserved() {
        let (tracker, tabs) = tracker().await;
        feed(&tracker, &tabs, committed(1, "https://a.example", "typed", &[]));
        feed(&tracker, &tabs, committed(1, "https://a.example/b", "link", &[]));
        feed(&tracker, &tabs, committed(1, "https://a.example/c", "link", &[]));
        tracker.flush().await;

        let snapshot = tracker.store().snapshot();
        let session = snapshot.current().unwrap();
        let root = session.root_nodes[0];
        let b = session.children_of(Some(root))[0];
        let c = session.children_of(Some(b))[0];
        assert_eq!(session.node(c).unwrap().url, "https://a.example/c");
        assert_eq!(snapshot.tab_to_node.get(&TabId(1)), Some(&c));
    }

    #[tokio::test]
    async fn new_tab_from_link_hangs_under_opener() {
        let (tracker, tabs) = tracker().await;
        feed(&tracker, &tabs, committed(1, "https://a.example", "typed", &[]));
        tracker.flush().await;
        feed(
            &tracker,
            &tabs,
            BrowserEvent::NavigationTargetCreated {
                source_tab_id: TabId(1),
                tab_id: TabId(2),
            },
        );
        feed(&tracker, &tabs, committed(2, "https://b.example", "link", &[]));
        tracker.flush().await;

        let snapshot = tracker.store().snapshot();
        let session = snapshot.current().unwrap();
        let a = snapshot.tab_to_node[&TabId(1)];
        let b = snapshot.tab_to_node[&TabId(2)];
        assert_eq!(session.node(b).unwrap().parent_id, Some(a));
    }

    #[tokio::test]
    async fn subframes_and_vanished_tabs_are_ignored() {
        let (tracker, tabs) = tracker().await;
        let mut subframe = committed(1, "https://a.example", "typed", &[]);
        if let BrowserEvent::NavigationCommitted { frame_id, .. } = &mut subframe {
            *frame_id = 3;
        }
        feed(&tracker, &tabs, subframe);
        tracker.dispatch(committed(9, "https://ghost.example", "typed", &[]));
        tracker.flush().await;
        assert!(tracker.store().snapshot().sessions.is_empty());
    }

    #[tokio::test]
    async fn tab_removal_clears_bookkeeping_and_retires_queue() {
        let (tracker, tabs) = tracker().await;
        feed(&tracker, &tabs, committed(1, "https://a.example", "typed", &[]));
        feed(&tracker, &tabs, BrowserEvent::TabRemoved { tab_id: TabId(1) });
        tracker.flush().await;
        tokio::task::yield_now().await;

        let snapshot = tracker.store().snapshot();
        assert!(snapshot.tab_to_node.is_empty());
        assert_eq!(snapshot.current().unwrap().node_count(), 1);
        assert_eq!(tracker.queue_count(), 0);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn handle_event_reports_errors_directly() {
        let (tracker, tabs) = tracker().await;
        let event = committed(1, "https://a.example", "typed", &[]);
        tabs.observe(&event);
        tracker.handle_event(event.clone()).await.unwrap();
        let dup = tracker.handle_event(event).await.unwrap_err();
        assert!(dup.is_silent());
    }
}
