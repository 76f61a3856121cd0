/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Session store: a single-owner actor serializing every mutation.
//!
//! Handlers never read-modify-write the state themselves. They send a
//! [`StoreRequest`] to the actor, which applies it to a working copy, persists
//! the copy on the blocking pool, and only then commits and publishes it on a
//! `watch` channel. A failed write drops the working copy, so no partial state
//! is ever committed. Reads go straight to the last published snapshot.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::errors::{StorageError, TrackerError};
use crate::model::{NodeId, SessionId, Settings, SettingsUpdate, StoreState, TabId, now_millis};
use crate::navigation::classifier::Classification;
use crate::navigation::{
    ClassifierInput, ClassifierPolicy, Decision, MappedNode, TabInfo, TransitionQualifier,
    TransitionType, classify, is_trackable_url, tabs,
};
use crate::prefs::Prefs;
use crate::sessions;
use crate::tree::{self, DedupScope, NavigationDebouncer, PageVisit};

mod storage;

pub use storage::{MemoryStateStorage, RedbStateStorage, StateStorage};

/// Capacity of the request channel; senders wait when the actor is behind.
const REQUEST_CHANNEL_CAPACITY: usize = 256;

pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

type Reply<T> = oneshot::Sender<Result<T, TrackerError>>;

/// Knobs the actor applies to every mutation.
#[derive(Clone)]
pub struct StoreConfig {
    pub dedup_scope: DedupScope,
    pub debounce_window: Duration,
    pub classifier: ClassifierPolicy,
    /// Source of `now` in ms since the epoch.
    pub clock: Clock,
}

impl StoreConfig {
    pub fn from_prefs(prefs: &Prefs) -> Self {
        Self {
            dedup_scope: prefs.dedup_scope,
            debounce_window: Duration::from_millis(prefs.debounce_ms),
            classifier: ClassifierPolicy {
                consume_pending_hint: prefs.consume_pending_hint,
            },
            ..Self::default()
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dedup_scope: DedupScope::default(),
            debounce_window: tree::DEFAULT_DEBOUNCE_WINDOW,
            classifier: ClassifierPolicy::default(),
            clock: Arc::new(now_millis),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("dedup_scope", &self.dedup_scope)
            .field("debounce_window", &self.debounce_window)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

/// A committed main-frame navigation, with the live pages of any tab the
/// classifier may name as parent fetched up front.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRequest {
    pub tab_id: TabId,
    pub url: String,
    pub transition_type: TransitionType,
    pub qualifiers: Vec<TransitionQualifier>,
    pub title: Option<String>,
    pub fav_icon_url: Option<String>,
    pub source_pages: HashMap<TabId, TabInfo>,
}

impl NavigationRequest {
    fn visit(&self) -> PageVisit {
        PageVisit {
            url: self.url.clone(),
            title: self.title.clone(),
            fav_icon_url: self.fav_icon_url.clone(),
            tab_id: Some(self.tab_id),
        }
    }
}

/// Messages accepted by the store actor.
pub enum StoreRequest {
    Navigate {
        request: NavigationRequest,
        reply: Reply<Option<NodeId>>,
    },
    RouteUpdate {
        visit: PageVisit,
        reply: Reply<Option<NodeId>>,
    },
    TabCreated {
        tab: TabId,
        opener: Option<TabId>,
        reply: Reply<()>,
    },
    NavigationTarget {
        source: TabId,
        tab: TabId,
        reply: Reply<()>,
    },
    TabRemoved {
        tab: TabId,
        reply: Reply<()>,
    },
    CreateSession {
        name: Option<String>,
        reply: Reply<SessionId>,
    },
    SwitchSession {
        session: SessionId,
        reply: Reply<()>,
    },
    RenameSession {
        session: SessionId,
        name: String,
        reply: Reply<()>,
    },
    DeleteSession {
        session: SessionId,
        reply: Reply<()>,
    },
    AddNode {
        session: SessionId,
        visit: PageVisit,
        parent: Option<NodeId>,
        reply: Reply<NodeId>,
    },
    DeleteNode {
        session: SessionId,
        node: NodeId,
        reply: Reply<Vec<NodeId>>,
    },
    MoveNode {
        session: SessionId,
        node: NodeId,
        parent: Option<NodeId>,
        reply: Reply<()>,
    },
    MoveNodeBefore {
        session: SessionId,
        node: NodeId,
        before: NodeId,
        reply: Reply<()>,
    },
    ClearAll {
        reply: Reply<()>,
    },
    UpdateSettings {
        update: SettingsUpdate,
        reply: Reply<Settings>,
    },
    SweepRetention {
        reply: Reply<Vec<SessionId>>,
    },
}

/// State a transform may touch. Committed together or not at all.
struct Working {
    state: StoreState,
    debouncer: NavigationDebouncer,
}

pub struct StoreActor {
    committed: Arc<StoreState>,
    debouncer: NavigationDebouncer,
    storage: Arc<dyn StateStorage>,
    config: StoreConfig,
    requests: mpsc::Receiver<StoreRequest>,
    published: watch::Sender<Arc<StoreState>>,
}

impl StoreActor {
    /// Process requests until every handle is dropped.
    pub async fn run(mut self) {
        log::debug!("store: actor running");
        while let Some(request) = self.requests.recv().await {
            self.handle(request).await;
        }
        log::debug!("store: all handles dropped, actor exiting");
    }

    async fn handle(&mut self, request: StoreRequest) {
        match request {
            StoreRequest::Navigate { request, reply } => {
                let result = self
                    .transact(|w, config, now| navigate(w, config, &request, now))
                    .await;
                respond(reply, result);
            },
            StoreRequest::RouteUpdate { visit, reply } => {
                let result = self
                    .transact(|w, config, now| {
                        tree::apply_route_update(
                            &mut w.state,
                            &mut w.debouncer,
                            config.dedup_scope,
                            &visit,
                            now,
                        )
                    })
                    .await;
                respond(reply, result);
            },
            StoreRequest::TabCreated { tab, opener, reply } => {
                let result = self
                    .transact(|w, _, _| {
                        tabs::record_opener(&mut w.state, tab, opener);
                        Ok(())
                    })
                    .await;
                respond(reply, result);
            },
            StoreRequest::NavigationTarget { source, tab, reply } => {
                let result = self
                    .transact(|w, _, _| {
                        tabs::record_navigation_target(&mut w.state, source, tab);
                        Ok(())
                    })
                    .await;
                respond(reply, result);
            },
            StoreRequest::TabRemoved { tab, reply } => {
                let result = self
                    .transact(|w, _, _| {
                        tabs::forget_tab(&mut w.state, tab);
                        w.debouncer.forget(tab);
                        Ok(())
                    })
                    .await;
                respond(reply, result);
            },
            StoreRequest::CreateSession { name, reply } => {
                let result = self
                    .transact(|w, _, now| Ok(sessions::create_session(&mut w.state, name, now)))
                    .await;
                respond(reply, result);
            },
            StoreRequest::SwitchSession { session, reply } => {
                let result = self
                    .transact(|w, _, _| sessions::switch_session(&mut w.state, session))
                    .await;
                respond(reply, result);
            },
            StoreRequest::RenameSession {
                session,
                name,
                reply,
            } => {
                let result = self
                    .transact(|w, _, _| sessions::rename_session(&mut w.state, session, name))
                    .await;
                respond(reply, result);
            },
            StoreRequest::DeleteSession { session, reply } => {
                let result = self
                    .transact(|w, _, _| sessions::delete_session(&mut w.state, session))
                    .await;
                respond(reply, result);
            },
            StoreRequest::AddNode {
                session,
                visit,
                parent,
                reply,
            } => {
                let result = self
                    .transact(|w, config, now| {
                        tree::add_node(&mut w.state, config.dedup_scope, session, &visit, parent, now)
                    })
                    .await;
                respond(reply, result);
            },
            StoreRequest::DeleteNode {
                session,
                node,
                reply,
            } => {
                let result = self
                    .transact(|w, _, _| tree::delete_node(&mut w.state, session, node))
                    .await;
                respond(reply, result);
            },
            StoreRequest::MoveNode {
                session,
                node,
                parent,
                reply,
            } => {
                let result = self
                    .transact(|w, _, _| tree::move_node(&mut w.state, session, node, parent))
                    .await;
                respond(reply, result);
            },
            StoreRequest::MoveNodeBefore {
                session,
                node,
                before,
                reply,
            } => {
                let result = self
                    .transact(|w, _, _| tree::move_node_before(&mut w.state, session, node, before))
                    .await;
                respond(reply, result);
            },
            StoreRequest::ClearAll { reply } => {
                let result = self
                    .transact(|w, _, _| {
                        sessions::clear_all_sessions(&mut w.state);
                        Ok(())
                    })
                    .await;
                respond(reply, result);
            },
            StoreRequest::UpdateSettings { update, reply } => {
                let result = self
                    .transact(|w, _, _| {
                        w.state.settings.apply(update);
                        Ok(w.state.settings)
                    })
                    .await;
                respond(reply, result);
            },
            StoreRequest::SweepRetention { reply } => {
                let result = self
                    .transact(|w, _, _| Ok(sessions::sweep_retention(&mut w.state)))
                    .await;
                if let Ok(evicted) = &result
                    && !evicted.is_empty()
                {
                    log::info!("store: retention evicted {} sessions", evicted.len());
                }
                respond(reply, result);
            },
        }
    }

    /// Apply `transform` to a working copy; persist and commit it on success.
    async fn transact<T>(
        &mut self,
        transform: impl FnOnce(&mut Working, &StoreConfig, u64) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut working = Working {
            state: (*self.committed).clone(),
            debouncer: self.debouncer.clone(),
        };
        let now = (self.config.clock)();
        let value = transform(&mut working, &self.config, now)?;

        if working.state != *self.committed {
            let next = Arc::new(working.state);
            let storage = Arc::clone(&self.storage);
            let to_save = Arc::clone(&next);
            let saved = tokio::task::spawn_blocking(move || storage.save(&to_save))
                .await
                .map_err(|e| TrackerError::TransientIo(format!("storage task failed: {e}")))?;
            if let Err(e) = saved {
                log::warn!("store: write failed, change abandoned ({e})");
                return Err(e.into());
            }
            self.committed = Arc::clone(&next);
            self.published.send_replace(next);
        }
        self.debouncer = working.debouncer;
        Ok(value)
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, TrackerError>) {
    if reply.send(result).is_err() {
        log::debug!("store: requester went away before the reply");
    }
}

/// Classify and apply one navigation inside the critical section.
fn navigate(
    w: &mut Working,
    config: &StoreConfig,
    request: &NavigationRequest,
    now: u64,
) -> Result<Option<NodeId>, TrackerError> {
    if !is_trackable_url(&request.url) {
        return Err(TrackerError::OutOfScopeUrl(request.url.clone()));
    }
    let tab = request.tab_id;
    let Classification {
        decision,
        consumes_hint,
    } = {
        let mapped = w.state.mapped_node(tab).map(|node| MappedNode {
            id: node.id,
            url: &node.url,
            parent_id: node.parent_id,
        });
        let input = ClassifierInput {
            url: &request.url,
            transition_type: request.transition_type,
            qualifiers: &request.qualifiers,
            tab_id: tab,
            mapped,
            pending_source: w.state.pending_source_tab.get(&tab).copied(),
        };
        classify(&input, config.classifier)
    };
    log::debug!("store: tab {tab} -> {} classified as {decision:?}", request.url);

    if consumes_hint {
        tabs::take_pending_source(&mut w.state, tab);
    }
    let parent = match decision {
        Decision::Ignore => return Ok(None),
        Decision::RefreshInPlace(node) => {
            return tree::refresh_in_place(&mut w.state, node, request.title.as_deref(), now)
                .map(Some);
        },
        Decision::Root => None,
        Decision::ParentOf(node) => Some(node),
        Decision::ParentOfTab(source) => tree::resolve_source_node(
            &mut w.state,
            &mut w.debouncer,
            config.dedup_scope,
            source,
            request.source_pages.get(&source),
            now,
        ),
    };
    tree::create_or_update(
        &mut w.state,
        &mut w.debouncer,
        config.dedup_scope,
        &request.visit(),
        parent,
        now,
    )
    .map(Some)
}

async fn load_saved(storage: Arc<dyn StateStorage>) -> Result<Option<StoreState>, StorageError> {
    tokio::task::spawn_blocking(move || match storage.load() {
        Err(StorageError::Encoding(e)) => {
            log::error!("store: saved state does not decode, setting it aside ({e})");
            storage.set_aside_unreadable()?;
            Ok(None)
        },
        other => other,
    })
    .await
    .map_err(|e| StorageError::Io(format!("load task failed: {e}")))?
}

/// Cloneable front end to the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    requests: mpsc::Sender<StoreRequest>,
    committed: watch::Receiver<Arc<StoreState>>,
}

impl StoreHandle {
    /// Load persisted state and spawn the actor on the current runtime.
    ///
    /// A failed read is returned and nothing is spawned, so the saved record is
    /// never replaced by an empty state. A record that no longer decodes is set
    /// aside first and tracking starts empty.
    pub async fn spawn(storage: Arc<dyn StateStorage>, config: StoreConfig) -> Result<Self, StorageError> {
        let mut state = load_saved(Arc::clone(&storage)).await?.unwrap_or_default();
        state.prune_dangling_tab_mappings();
        if let Err(e) = state.check_invariants() {
            log::warn!("store: loaded state is inconsistent: {e}");
        }
        log::info!("store: loaded {} sessions", state.sessions.len());

        let (handle, actor) = Self::new(state, storage, config);
        tokio::spawn(actor.run());
        Ok(handle)
    }

    /// Drop this handle and wait for the actor to exit and release its
    /// storage. Returns only once every other clone is gone as well.
    pub async fn shutdown(self) {
        let Self {
            requests,
            mut committed,
        } = self;
        drop(requests);
        while committed.changed().await.is_ok() {}
        log::debug!("store: actor stopped");
    }

    /// Build a handle and its actor without spawning it.
    pub fn new(state: StoreState, storage: Arc<dyn StateStorage>, config: StoreConfig) -> (Self, StoreActor) {
        let committed = Arc::new(state);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (published_tx, published_rx) = watch::channel(Arc::clone(&committed));
        let actor = StoreActor {
            committed,
            debouncer: NavigationDebouncer::new(config.debounce_window),
            storage,
            config,
            requests: request_rx,
            published: published_tx,
        };
        let handle = Self {
            requests: request_tx,
            committed: published_rx,
        };
        (handle, actor)
    }

    /// Latest committed state. Never waits on the actor.
    pub fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.committed.borrow())
    }

    /// Stream of committed states.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreState>> {
        self.committed.clone()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> StoreRequest) -> Result<T, TrackerError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| TrackerError::ActorClosed)?;
        response.await.map_err(|_| TrackerError::ActorClosed)?
    }

    pub async fn navigate(&self, request: NavigationRequest) -> Result<Option<NodeId>, TrackerError> {
        self.request(|reply| StoreRequest::Navigate { request, reply })
            .await
    }

    pub async fn route_update(&self, visit: PageVisit) -> Result<Option<NodeId>, TrackerError> {
        self.request(|reply| StoreRequest::RouteUpdate { visit, reply })
            .await
    }

    pub async fn tab_created(&self, tab: TabId, opener: Option<TabId>) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::TabCreated { tab, opener, reply })
            .await
    }

    pub async fn navigation_target_created(&self, source: TabId, tab: TabId) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::NavigationTarget { source, tab, reply })
            .await
    }

    pub async fn tab_removed(&self, tab: TabId) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::TabRemoved { tab, reply })
            .await
    }

    pub async fn create_session(&self, name: Option<String>) -> Result<SessionId, TrackerError> {
        self.request(|reply| StoreRequest::CreateSession { name, reply })
            .await
    }

    pub async fn switch_session(&self, session: SessionId) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::SwitchSession { session, reply })
            .await
    }

    pub async fn rename_session(&self, session: SessionId, name: String) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::RenameSession {
            session,
            name,
            reply,
        })
        .await
    }

    pub async fn delete_session(&self, session: SessionId) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::DeleteSession { session, reply })
            .await
    }

    pub async fn add_node(
        &self,
        session: SessionId,
        visit: PageVisit,
        parent: Option<NodeId>,
    ) -> Result<NodeId, TrackerError> {
        self.request(|reply| StoreRequest::AddNode {
            session,
            visit,
            parent,
            reply,
        })
        .await
    }

    pub async fn delete_node(&self, session: SessionId, node: NodeId) -> Result<Vec<NodeId>, TrackerError> {
        self.request(|reply| StoreRequest::DeleteNode {
            session,
            node,
            reply,
        })
        .await
    }

    pub async fn move_node(
        &self,
        session: SessionId,
        node: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::MoveNode {
            session,
            node,
            parent,
            reply,
        })
        .await
    }

    pub async fn move_node_before(
        &self,
        session: SessionId,
        node: NodeId,
        before: NodeId,
    ) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::MoveNodeBefore {
            session,
            node,
            before,
            reply,
        })
        .await
    }

    pub async fn clear_all_sessions(&self) -> Result<(), TrackerError> {
        self.request(|reply| StoreRequest::ClearAll { reply }).await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, TrackerError> {
        self.request(|reply| StoreRequest::UpdateSettings { update, reply })
            .await
    }

    pub async fn sweep_retention(&self) -> Result<Vec<SessionId>, TrackerError> {
        self.request(|reply| StoreRequest::SweepRetention { reply })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn manual_clock() -> (Arc<AtomicU64>, Clock) {
        let now = Arc::new(AtomicU64::new(1_000));
        let reader = Arc::clone(&now);
        (now, Arc::new(move || reader.load(Ordering::SeqCst)))
    }

    async fn spawn_with(storage: Arc<MemoryStateStorage>, config: StoreConfig) -> StoreHandle {
        StoreHandle::spawn(storage, config).await.unwrap()
    }

    fn nav(tab: i32, url: &str, transition: TransitionType) -> NavigationRequest {
        NavigationRequest {
            tab_id: TabId(tab),
            url: url.to_string(),
            transition_type: transition,
            qualifiers: Vec::new(),
            title: None,
            fav_icon_url: None,
            source_pages: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn mutations_are_persisted_and_published() {
        let storage = Arc::new(MemoryStateStorage::new());
        let store = spawn_with(Arc::clone(&storage), StoreConfig::default()).await;

        let node = store
            .navigate(nav(1, "https://a.example", TransitionType::Typed))
            .await
            .unwrap()
            .unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.current().unwrap().contains(node));
        assert_eq!(storage.saved().as_ref(), Some(snapshot.as_ref()));
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn failed_write_commits_nothing() {
        let storage = Arc::new(MemoryStateStorage::new());
        let store = spawn_with(Arc::clone(&storage), StoreConfig::default()).await;
        store
            .navigate(nav(1, "https://a.example", TransitionType::Typed))
            .await
            .unwrap();
        let before = store.snapshot();

        storage.set_fail_writes(true);
        let err = store
            .navigate(nav(1, "https://b.example", TransitionType::Link))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::TransientIo(_)));
        assert_eq!(store.snapshot(), before);

        storage.set_fail_writes(false);
        let retried = store
            .navigate(nav(1, "https://b.example", TransitionType::Link))
            .await
            .unwrap();
        assert!(retried.is_some(), "debounce state must not survive a failed write");
    }

    #[tokio::test]
    async fn drop_reasons_do_not_write() {
        let storage = Arc::new(MemoryStateStorage::new());
        let store = spawn_with(Arc::clone(&storage), StoreConfig::default()).await;

        let err = store
            .navigate(nav(1, "chrome://settings", TransitionType::Typed))
            .await
            .unwrap_err();
        assert!(err.is_silent());
        store
            .navigate(nav(1, "https://a.example", TransitionType::Typed))
            .await
            .unwrap();
        let dup = store
            .navigate(nav(1, "https://a.example", TransitionType::Link))
            .await
            .unwrap_err();
        assert_eq!(dup, TrackerError::DuplicateNavigation("https://a.example".into()));
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_navigations_lose_no_updates() {
        let storage = Arc::new(MemoryStateStorage::new());
        storage.set_write_delay(Duration::from_millis(2));
        let store = spawn_with(Arc::clone(&storage), StoreConfig::default()).await;

        let mut tasks = tokio::task::JoinSet::new();
        for tab in 0..16 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .navigate(nav(tab, &format!("https://site{tab}.example"), TransitionType::Typed))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(result.unwrap().unwrap().is_some());
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.current().unwrap().node_count(), 16);
        assert_eq!(snapshot.tab_to_node.len(), 16);
        assert_eq!(storage.saved().as_ref(), Some(snapshot.as_ref()));
    }

    #[tokio::test]
    async fn reload_refreshes_in_place_after_the_window() {
        let (now, clock) = manual_clock();
        let storage = Arc::new(MemoryStateStorage::new());
        let store = spawn_with(storage, StoreConfig::default().with_clock(clock)).await;

        let node = store
            .navigate(nav(1, "https://a.example", TransitionType::Typed))
            .await
            .unwrap()
            .unwrap();
        now.store(60_000, Ordering::SeqCst);
        let mut reload = nav(1, "https://a.example", TransitionType::Reload);
        reload.title = Some("Reloaded".into());
        assert_eq!(store.navigate(reload).await.unwrap(), Some(node));

        let snapshot = store.snapshot();
        let session = snapshot.current().unwrap();
        assert_eq!(session.node_count(), 1);
        let refreshed = session.node(node).unwrap();
        assert_eq!(refreshed.title, "Reloaded");
        assert_eq!(refreshed.timestamp_ms, 60_000);
        assert_eq!(refreshed.visit_count, 1);
    }

    #[tokio::test]
    async fn hinted_tab_attaches_under_lazily_created_opener_node() {
        let storage = Arc::new(MemoryStateStorage::new());
        let store = spawn_with(storage, StoreConfig::default()).await;

        store.navigation_target_created(TabId(1), TabId(2)).await.unwrap();
        let mut request = nav(2, "https://b.example", TransitionType::Link);
        request.source_pages.insert(
            TabId(1),
            TabInfo {
                url: "https://opener.example".into(),
                title: Some("Opener".into()),
                fav_icon_url: None,
            },
        );
        let child = store.navigate(request).await.unwrap().unwrap();

        let snapshot = store.snapshot();
        let session = snapshot.current().unwrap();
        let parent = session.node(child).unwrap().parent_id.unwrap();
        assert_eq!(session.node(parent).unwrap().url, "https://opener.example");
        assert_eq!(snapshot.tab_to_node.get(&TabId(1)), Some(&parent));
        assert!(snapshot.pending_source_tab.is_empty());
    }

    #[tokio::test]
    async fn settings_and_retention_flow_through_the_actor() {
        let (now, clock) = manual_clock();
        let storage = Arc::new(MemoryStateStorage::new());
        let store = spawn_with(storage, StoreConfig::default().with_clock(clock)).await;

        let old = store.create_session(None).await.unwrap();
        now.store(2_000, Ordering::SeqCst);
        let new = store.create_session(None).await.unwrap();
        let settings = store
            .update_settings(SettingsUpdate {
                max_sessions: Some(1),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(settings.max_sessions, 1);

        assert_eq!(store.sweep_retention().await.unwrap(), vec![old]);
        assert_eq!(store.snapshot().current_session, Some(new));
        assert!(store.sweep_retention().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saved_state_is_restored_on_spawn() {
        let mut state = StoreState::default();
        let session = sessions::create_session(&mut state, Some("Kept".into()), 5);
        state.tab_to_node.insert(TabId(9), NodeId::new());
        let storage = Arc::new(MemoryStateStorage::with_state(&state).unwrap());

        let store = spawn_with(storage, StoreConfig::default()).await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.sessions[&session].name, "Kept");
        assert!(snapshot.tab_to_node.is_empty());
    }

    fn saved_sessions(count: u64) -> StoreState {
        let mut state = StoreState::default();
        for i in 0..count {
            sessions::create_session(&mut state, Some(format!("Saved {i}")), 10 + i);
        }
        state
    }

    #[tokio::test]
    async fn failed_load_refuses_to_start_and_keeps_saved_sessions() {
        let storage = Arc::new(MemoryStateStorage::with_state(&saved_sessions(3)).unwrap());
        storage.set_fail_next_load(true);

        let err = StoreHandle::spawn(storage.clone(), StoreConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(storage.saved().unwrap().sessions.len(), 3);
        assert_eq!(storage.write_count(), 0);

        let store = spawn_with(Arc::clone(&storage), StoreConfig::default()).await;
        store
            .navigate(nav(1, "https://a.example", TransitionType::Typed))
            .await
            .unwrap();
        assert_eq!(storage.saved().unwrap().sessions.len(), 3);
    }

    #[tokio::test]
    async fn undecodable_record_is_set_aside_before_the_first_save() {
        let storage = Arc::new(MemoryStateStorage::with_bytes(b"{\"sessions\": 7".to_vec()));
        let store = spawn_with(Arc::clone(&storage), StoreConfig::default()).await;
        assert!(store.snapshot().sessions.is_empty());

        store
            .navigate(nav(1, "https://a.example", TransitionType::Typed))
            .await
            .unwrap();
        assert_eq!(storage.unreadable(), vec![b"{\"sessions\": 7".to_vec()]);
        assert_eq!(storage.saved().unwrap().sessions.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_waits_for_the_actor() {
        let storage = Arc::new(MemoryStateStorage::new());
        let store = spawn_with(Arc::clone(&storage), StoreConfig::default()).await;
        store.create_session(None).await.unwrap();
        store.shutdown().await;
        assert_eq!(Arc::strong_count(&storage), 1);
    }

    #[tokio::test]
    async fn closed_actor_reports_actor_closed() {
        let (store, actor) = StoreHandle::new(
            StoreState::default(),
            Arc::new(MemoryStateStorage::new()),
            StoreConfig::default(),
        );
        drop(actor);
        assert_eq!(store.create_session(None).await, Err(TrackerError::ActorClosed));
    }
}
