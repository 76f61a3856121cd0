/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Navigation tracking engine.
//!
//! Browser navigation events are classified into parent/child relationships
//! and grown into per-session forests of visited pages. All mutation flows
//! through a single store actor; see [`store`].

pub mod errors;
pub mod model;
pub mod navigation;
pub mod prefs;
pub mod ranking;
pub mod runtime;
pub mod sessions;
pub mod store;
pub mod tree;

pub use errors::TrackerError;
pub use model::{Node, NodeId, Session, SessionId, StoreState, TabId};
pub use navigation::BrowserEvent;
pub use runtime::{CommandResponse, NavigationTracker, UiCommand};
pub use store::StoreHandle;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
