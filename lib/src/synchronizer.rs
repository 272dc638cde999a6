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

//! Creates and deletes mirrored branches on the remote service.
//!
//! Every write is a compare-and-swap ref update, so two executions racing on
//! the same branch end in an API failure for one of them rather than in a
//! silently clobbered ref. A failed write is checked against the remote
//! before it is reported, since the service may have applied it anyway.

#![allow(missing_docs)]

use itertools::Itertools as _;
use thiserror::Error;
use tracing::instrument;

use crate::namespace::{root_ref_name, Namespace};
use crate::object_id::CommitId;
use crate::ref_service::{RefService, RefServiceError, RefUpdate, RemoteRef};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote ref {ref_name} already exists at {object_id}")]
    AlreadyExists { ref_name: String, object_id: CommitId },
    #[error("Parent branch '{parent}' is not on the remote service (looked for {ref_name})")]
    ParentMissingRemotely {
        parent: String,
        ref_name: String,
        /// Refs the parent query returned, none of which matched exactly.
        seen: Vec<String>,
    },
    #[error("Remote service request failed with status {status}: {body}")]
    ApiFailure { status: u16, body: String },
    #[error("Remote service refused to update {ref_name}: {update_status}")]
    UpdateRejected {
        ref_name: String,
        update_status: String,
        message: Option<String>,
    },
    #[error("Remote ref {ref_name} still exists at {object_id} after it was deleted")]
    DeletionNotPersisted { ref_name: String, object_id: CommitId },
}

impl From<RefServiceError> for SyncError {
    fn from(err: RefServiceError) -> Self {
        let status = err.status();
        let body = match err {
            RefServiceError::Status { body, .. } => body,
            other => other.to_string(),
        };
        SyncError::ApiFailure { status, body }
    }
}

/// Where a new remote branch takes its commit from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentRef<'a> {
    /// The remote repository's own unprefixed root branch. Only the root
    /// branch itself is created from it.
    RemoteRoot(&'a str),
    /// A branch previously mirrored into the same namespace.
    Mirrored(&'a str),
}

impl ParentRef<'_> {
    pub fn branch(&self) -> &str {
        match self {
            ParentRef::RemoteRoot(name) | ParentRef::Mirrored(name) => name,
        }
    }

    fn ref_name(&self, namespace: &Namespace) -> String {
        match self {
            ParentRef::RemoteRoot(name) => root_ref_name(name),
            ParentRef::Mirrored(name) => namespace.full_ref_name(name),
        }
    }
}

/// A remote branch this module created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedRef {
    pub ref_name: String,
    pub object_id: CommitId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The ref was deleted; it pointed at `previous`.
    Deleted { ref_name: String, previous: CommitId },
    /// There was nothing to delete.
    NotFound { ref_name: String },
}

/// Looks up exactly `ref_name`. The service filter is a prefix match, so the
/// other refs it returned are handed back for diagnostics.
fn query_exact(
    service: &dyn RefService,
    repository: &str,
    ref_name: &str,
) -> Result<(Option<RemoteRef>, Vec<RemoteRef>), SyncError> {
    let filter = ref_name.strip_prefix("refs/").unwrap_or(ref_name);
    let refs = service.list_refs(repository, filter)?;
    let (exact, others): (Vec<_>, Vec<_>) =
        refs.into_iter().partition(|remote| remote.name == ref_name);
    Ok((exact.into_iter().next(), others))
}

fn submit(service: &dyn RefService, repository: &str, update: RefUpdate) -> Result<(), SyncError> {
    let ref_name = update.name.clone();
    let results = service.update_refs(repository, &[update])?;
    let Some(result) = results.into_iter().find(|result| result.name == ref_name) else {
        return Err(SyncError::ApiFailure {
            status: 0,
            body: format!("no update result reported for {ref_name}"),
        });
    };
    if result.success {
        Ok(())
    } else {
        Err(SyncError::UpdateRejected {
            ref_name,
            update_status: result.update_status,
            message: result.custom_message,
        })
    }
}

/// Creates `branch` in `namespace` at the commit `parent` points at on the
/// remote service.
#[instrument(skip(service, namespace), fields(repository = %namespace.repository))]
pub fn create_remote_branch(
    service: &dyn RefService,
    namespace: &Namespace,
    branch: &str,
    parent: ParentRef<'_>,
) -> Result<CreatedRef, SyncError> {
    let ref_name = namespace.full_ref_name(branch);
    let repository = &namespace.repository;

    if let (Some(existing), _) = query_exact(service, repository, &ref_name)? {
        return Err(SyncError::AlreadyExists {
            ref_name,
            object_id: existing.object_id,
        });
    }

    let parent_ref_name = parent.ref_name(namespace);
    let parent_id = match query_exact(service, repository, &parent_ref_name)? {
        (Some(found), _) => found.object_id,
        (None, others) => {
            return Err(SyncError::ParentMissingRemotely {
                parent: parent.branch().to_owned(),
                ref_name: parent_ref_name,
                seen: others.into_iter().map(|remote| remote.name).collect_vec(),
            });
        }
    };
    tracing::debug!(parent = %parent_ref_name, object_id = %parent_id, "found parent ref");

    if let Err(err) = submit(
        service,
        repository,
        RefUpdate::create(&ref_name, parent_id.clone()),
    ) {
        // The update may have been applied even though no result came back.
        match query_exact(service, repository, &ref_name) {
            Ok((Some(found), _)) if found.object_id == parent_id => {
                tracing::warn!(
                    %ref_name,
                    error = %err,
                    "update reported a failure but was applied"
                );
            }
            _ => return Err(err),
        }
    }
    tracing::info!(%ref_name, object_id = %parent_id, "created remote branch");
    Ok(CreatedRef {
        ref_name,
        object_id: parent_id,
    })
}

/// Deletes `branch` from `namespace`. Deleting an absent branch is not an
/// error.
#[instrument(skip(service, namespace), fields(repository = %namespace.repository))]
pub fn delete_remote_branch(
    service: &dyn RefService,
    namespace: &Namespace,
    branch: &str,
) -> Result<DeleteOutcome, SyncError> {
    let ref_name = namespace.full_ref_name(branch);
    let repository = &namespace.repository;

    let Some(current) = query_exact(service, repository, &ref_name)?.0 else {
        tracing::debug!(%ref_name, "remote branch already absent");
        return Ok(DeleteOutcome::NotFound { ref_name });
    };
    if let Err(err) = submit(
        service,
        repository,
        RefUpdate::delete(&ref_name, current.object_id.clone()),
    ) {
        match query_exact(service, repository, &ref_name) {
            Ok((None, _)) => {
                tracing::warn!(
                    %ref_name,
                    error = %err,
                    "update reported a failure but was applied"
                );
            }
            _ => return Err(err),
        }
    }

    // The service may accept the request and still keep the ref, e.g. when
    // the token lacks the permission to delete.
    if let Some(remaining) = query_exact(service, repository, &ref_name)?.0 {
        return Err(SyncError::DeletionNotPersisted {
            ref_name,
            object_id: remaining.object_id,
        });
    }
    tracing::info!(%ref_name, "deleted remote branch");
    Ok(DeleteOutcome::Deleted {
        ref_name,
        previous: current.object_id,
    })
}
