/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Error kinds surfaced by the tracking engine.
//!
//! `OutOfScopeUrl` and `DuplicateNavigation` are drop reasons rather than
//! failures: passive handlers log them at debug level and move on. The rest are
//! reported to explicit commands as `{success: false, error}`.

use crate::model::{NodeId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("url is outside the trackable scope: {0}")]
    OutOfScopeUrl(String),

    #[error("duplicate navigation to {0} within the debounce window")]
    DuplicateNavigation(String),

    #[error("cannot move node {node} under {target}: would create a cycle")]
    InvalidMove { node: NodeId, target: NodeId },

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("session {0} reached its node capacity")]
    SessionFull(SessionId),

    #[error("transient storage failure: {0}")]
    TransientIo(String),

    #[error("session store is no longer running")]
    ActorClosed,
}

impl TrackerError {
    /// Drop reasons that should never be surfaced as failures.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            TrackerError::OutOfScopeUrl(_) | TrackerError::DuplicateNavigation(_)
        )
    }
}

/// Failure reported by a [`crate::store::StateStorage`] backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Redb error: {0}")]
    Redb(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<StorageError> for TrackerError {
    fn from(e: StorageError) -> Self {
        TrackerError::TransientIo(e.to_string())
    }
}
