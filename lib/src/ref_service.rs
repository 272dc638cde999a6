// Copyright 2024 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ref API of the remote service the branches are mirrored into.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::object_id::CommitId;

#[derive(Debug, Error)]
pub enum RefServiceError {
    /// The service answered with a status other than 200/201.
    #[error("Remote service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to reach the remote service: {0}")]
    Transport(String),
    #[error("Unexpected response from the remote service: {0}")]
    InvalidResponse(String),
}

impl RefServiceError {
    /// HTTP status, or 0 if no response was received.
    pub fn status(&self) -> u16 {
        match self {
            RefServiceError::Status { status, .. } => *status,
            RefServiceError::Transport(_) | RefServiceError::InvalidResponse(_) => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    /// Full ref name, e.g. `refs/heads/widgets/main`.
    pub name: String,
    pub object_id: CommitId,
}

/// Compare-and-swap of one ref. `old_object_id` must match the current state
/// on the server; the zero id means "absent".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdate {
    pub name: String,
    pub old_object_id: CommitId,
    pub new_object_id: CommitId,
}

impl RefUpdate {
    pub fn create(name: impl Into<String>, target: CommitId) -> Self {
        RefUpdate {
            name: name.into(),
            old_object_id: CommitId::zero(),
            new_object_id: target,
        }
    }

    pub fn delete(name: impl Into<String>, current: CommitId) -> Self {
        RefUpdate {
            name: name.into(),
            old_object_id: current,
            new_object_id: CommitId::zero(),
        }
    }
}

/// Per-ref outcome reported by the service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdateResult {
    pub name: String,
    pub success: bool,
    #[serde(default)]
    pub update_status: String,
    #[serde(default)]
    pub custom_message: Option<String>,
}

/// Access to the refs of repositories on the remote service.
pub trait RefService {
    /// Lists refs of `repository` whose name (without `refs/`) starts with
    /// `filter`.
    fn list_refs(&self, repository: &str, filter: &str) -> Result<Vec<RemoteRef>, RefServiceError>;

    /// Applies `updates` atomically per ref. The service rejects an update
    /// whose `old_object_id` does not match.
    fn update_refs(
        &self,
        repository: &str,
        updates: &[RefUpdate],
    ) -> Result<Vec<RefUpdateResult>, RefServiceError>;
}
