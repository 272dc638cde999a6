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

//! Runs one branch event through resolution, remote synchronization and the
//! mirror ledger.
//!
//! ```text
//! Start -> Classified -> Resolved -> Synced -> LedgerUpdated -> Done
//!                \__________\___________\____________\______-> Failed
//! ```
//!
//! Nothing is written to the ledger until the remote update has succeeded,
//! with one exception: a delete clears the mirror tag even when the remote
//! deletion failed, so that the branch can be created again later.

use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::instrument;

use crate::mirror_ledger::{LedgerError, MirrorLedger};
use crate::namespace::{validate_branch_name, Namespace};
use crate::object_id::CommitId;
use crate::ref_graph::{BranchHeads, RefGraphError};
use crate::ref_service::RefService;
use crate::resolver::{resolve, Resolution, ResolutionTrace, ResolveError, ResolveRequest, Resolved};
use crate::settings::MirrorSettings;
use crate::synchronizer::{
    create_remote_branch, delete_remote_branch, DeleteOutcome, ParentRef, SyncError,
};

/// Kind of branch lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A branch was created.
    Create,
    /// A branch was deleted.
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Create => "create",
            EventKind::Delete => "delete",
        })
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventKind::Create),
            "delete" => Ok(EventKind::Delete),
            _ => Err(format!("unknown event kind '{s}', expected 'create' or 'delete'")),
        }
    }
}

/// What started the execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TriggerSource {
    /// A branch event delivered by the source host.
    #[default]
    Event,
    /// An ad-hoc run started by an operator.
    Manual,
}

/// One branch event to be mirrored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorEvent {
    /// Create or delete.
    pub kind: EventKind,
    /// Branch the event is about, without `refs/heads/`.
    pub branch: String,
    /// Base supplied by the triggering context. Never `Some("")`.
    pub explicit_base: Option<String>,
    /// Owner of the source repository.
    pub source_owner: String,
    /// Name of the source repository.
    pub source_repository: String,
    /// What started the execution.
    pub trigger: TriggerSource,
}

impl MirrorEvent {
    /// Creates an event delivered by the source host.
    pub fn new(
        kind: EventKind,
        branch: impl Into<String>,
        source_owner: impl Into<String>,
        source_repository: impl Into<String>,
    ) -> Self {
        MirrorEvent {
            kind,
            branch: branch.into(),
            explicit_base: None,
            source_owner: source_owner.into(),
            source_repository: source_repository.into(),
            trigger: TriggerSource::Event,
        }
    }

    /// Sets the base branch. Blank values count as no base.
    pub fn with_base(mut self, base: Option<String>) -> Self {
        self.explicit_base = base.filter(|base| !base.trim().is_empty());
        self
    }

    /// Sets what started the execution.
    pub fn with_trigger(mut self, trigger: TriggerSource) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Why an event didn't change anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The remote branch to delete was already gone.
    RemoteBranchAbsent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::RemoteBranchAbsent => f.write_str("remote branch does not exist"),
        }
    }
}

/// Terminal status of a successful event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The remote branch was created from `parent` and the mirror tag written.
    Created {
        /// Mirrored branch.
        branch: String,
        /// Branch the remote branch was created from.
        parent: String,
        /// Commit the remote branch points at.
        object_id: CommitId,
    },
    /// The remote branch was deleted and the mirror tag cleared.
    Deleted {
        /// Deleted branch.
        branch: String,
    },
    /// Nothing needed doing on the remote service.
    Skipped {
        /// Branch the event was about.
        branch: String,
        /// Why.
        reason: SkipReason,
    },
    /// Dry run: what a real run would attempt.
    Planned {
        /// Branch the event is about.
        branch: String,
        /// Create or delete.
        kind: EventKind,
        /// Remote ref that would be written.
        ref_name: String,
        /// Parent branch a create would start from.
        parent: Option<String>,
    },
}

/// Machine-readable failure kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MirrorErrorKind {
    /// The event must not be processed, e.g. a manual run on a non-root
    /// branch.
    InvalidTrigger,
    /// The remote branch exists already.
    AlreadyExists,
    /// No parent could be determined locally.
    ParentNotFound,
    /// The chosen parent was never mirrored.
    ParentMissingRemotely,
    /// The remote service failed or refused the request.
    ApiFailure,
    /// The remote service accepted a deletion but kept the branch.
    DeletionNotPersisted,
    /// Reading the local repository failed.
    Repository,
    /// Reading or writing mirror tags failed.
    Ledger,
}

impl MirrorErrorKind {
    /// Stable kebab-case name.
    pub fn label(&self) -> &'static str {
        match self {
            MirrorErrorKind::InvalidTrigger => "invalid-trigger",
            MirrorErrorKind::AlreadyExists => "already-exists",
            MirrorErrorKind::ParentNotFound => "parent-not-found",
            MirrorErrorKind::ParentMissingRemotely => "parent-missing-remotely",
            MirrorErrorKind::ApiFailure => "api-failure",
            MirrorErrorKind::DeletionNotPersisted => "deletion-not-persisted",
            MirrorErrorKind::Repository => "repository",
            MirrorErrorKind::Ledger => "ledger",
        }
    }
}

impl fmt::Display for MirrorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error raised for an event that invalidated the trigger itself.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Manual runs are only allowed on the root branch.
    #[error("Manual runs are only allowed on '{root}', not on '{branch}'")]
    ManualOnNonRoot {
        /// Requested branch.
        branch: String,
        /// Configured root branch.
        root: String,
    },
    /// The event doesn't name a usable branch.
    #[error(transparent)]
    BranchName(#[from] crate::namespace::BranchNameError),
    /// The source repository isn't known.
    #[error("Source repository {0} is not set")]
    MissingSource(&'static str),
}

/// Failure of one event.
#[derive(Debug, Error)]
#[error("Could not {event} branch '{branch}' on the remote service")]
pub struct MirrorError {
    /// Machine-readable kind.
    pub kind: MirrorErrorKind,
    /// Event that failed.
    pub event: EventKind,
    /// Branch the event was about.
    pub branch: String,
    /// Underlying error.
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
    /// How the parent was chosen, if resolution ran.
    pub trace: Option<ResolutionTrace>,
    /// Set when a delete cleared the mirror tag even though the remote
    /// deletion failed.
    pub ledger_cleared: bool,
}

impl MirrorError {
    fn new(
        kind: MirrorErrorKind,
        event: &MirrorEvent,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        MirrorError {
            kind,
            event: event.kind,
            branch: event.branch.clone(),
            source: source.into(),
            trace: None,
            ledger_cleared: false,
        }
    }

    fn with_trace(mut self, trace: ResolutionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn from_sync(event: &MirrorEvent, err: SyncError) -> Self {
        let kind = match &err {
            SyncError::AlreadyExists { .. } => MirrorErrorKind::AlreadyExists,
            SyncError::ParentMissingRemotely { .. } => MirrorErrorKind::ParentMissingRemotely,
            SyncError::ApiFailure { .. } | SyncError::UpdateRejected { .. } => {
                MirrorErrorKind::ApiFailure
            }
            SyncError::DeletionNotPersisted { .. } => MirrorErrorKind::DeletionNotPersisted,
        };
        MirrorError::new(kind, event, err)
    }

    fn from_resolve(event: &MirrorEvent, err: ResolveError) -> Self {
        match err {
            ResolveError::ParentNotFound { ref trace, .. } => {
                let trace = trace.clone();
                MirrorError::new(MirrorErrorKind::ParentNotFound, event, err).with_trace(trace)
            }
            ResolveError::RefGraph(err) => {
                MirrorError::new(MirrorErrorKind::Repository, event, err)
            }
        }
    }

    fn from_ledger(event: &MirrorEvent, err: LedgerError) -> Self {
        MirrorError::new(MirrorErrorKind::Ledger, event, err)
    }

    fn from_graph(event: &MirrorEvent, err: RefGraphError) -> Self {
        MirrorError::new(MirrorErrorKind::Repository, event, err)
    }
}

#[derive(Debug)]
enum State {
    Classified,
    Resolved,
    Synced,
    LedgerUpdated,
}

/// Everything one execution reads and writes, apart from the remote service.
pub struct Mirror<'a> {
    settings: &'a MirrorSettings,
    graph: &'a dyn BranchHeads,
    ledger: &'a MirrorLedger,
}

impl<'a> Mirror<'a> {
    /// Bundles the local state of one execution.
    pub fn new(
        settings: &'a MirrorSettings,
        graph: &'a dyn BranchHeads,
        ledger: &'a MirrorLedger,
    ) -> Self {
        Mirror {
            settings,
            graph,
            ledger,
        }
    }

    fn root_branch(&self) -> &str {
        self.settings.root_branch()
    }

    fn enter(&self, state: State, event: &MirrorEvent) {
        tracing::debug!(?state, kind = %event.kind, branch = %event.branch, "mirror state");
    }

    /// Applies `event` to the remote service and the ledger.
    #[instrument(skip_all, fields(kind = %event.kind, branch = %event.branch))]
    pub fn run(
        &self,
        service: &dyn RefService,
        event: &MirrorEvent,
    ) -> Result<Outcome, MirrorError> {
        let result = self.classify(event).and_then(|namespace| match event.kind {
            EventKind::Create => self.create_flow(service, &namespace, event),
            EventKind::Delete => self.delete_flow(service, &namespace, event),
        });
        match &result {
            Ok(outcome) => tracing::info!(?outcome, "event mirrored"),
            Err(err) => tracing::error!(kind = %err.kind, error = %err.source, "event failed"),
        }
        result
    }

    /// Reports what [`Self::run`] would do, without contacting the remote
    /// service or changing the ledger.
    #[instrument(skip_all, fields(kind = %event.kind, branch = %event.branch))]
    pub fn plan(&self, event: &MirrorEvent) -> Result<Outcome, MirrorError> {
        let namespace = self.classify(event)?;
        let parent = match event.kind {
            EventKind::Create => {
                let resolved = self.resolve_parent(event)?;
                Some(self.parent_ref(event, &resolved).branch().to_owned())
            }
            EventKind::Delete => None,
        };
        Ok(Outcome::Planned {
            branch: event.branch.clone(),
            kind: event.kind,
            ref_name: namespace.full_ref_name(&event.branch),
            parent,
        })
    }

    fn classify(&self, event: &MirrorEvent) -> Result<Namespace, MirrorError> {
        let invalid =
            |err: TriggerError| MirrorError::new(MirrorErrorKind::InvalidTrigger, event, err);
        validate_branch_name(&event.branch).map_err(|err| invalid(err.into()))?;
        if event.source_owner.is_empty() {
            return Err(invalid(TriggerError::MissingSource("owner")));
        }
        if event.source_repository.is_empty() {
            return Err(invalid(TriggerError::MissingSource("name")));
        }
        if event.kind == EventKind::Create
            && event.trigger == TriggerSource::Manual
            && event.branch != self.root_branch()
        {
            return Err(invalid(TriggerError::ManualOnNonRoot {
                branch: event.branch.clone(),
                root: self.root_branch().to_owned(),
            }));
        }
        let namespace = Namespace::derive(
            &self.settings.mirror,
            &event.source_owner,
            &event.source_repository,
        );
        self.enter(State::Classified, event);
        Ok(namespace)
    }

    fn resolve_parent(&self, event: &MirrorEvent) -> Result<Resolved, MirrorError> {
        let tags = self
            .ledger
            .list()
            .map_err(|err| MirrorError::from_ledger(event, err))?;
        let request = ResolveRequest {
            branch: &event.branch,
            kind: event.kind,
            explicit_base: event.explicit_base.as_deref(),
        };
        let resolved = resolve(&request, self.root_branch(), self.graph, &tags)
            .map_err(|err| MirrorError::from_resolve(event, err))?;
        self.enter(State::Resolved, event);
        Ok(resolved)
    }

    fn parent_ref<'r>(&'r self, event: &MirrorEvent, resolved: &'r Resolved) -> ParentRef<'r> {
        match &resolved.resolution {
            Resolution::Parent(name) => ParentRef::Mirrored(name),
            Resolution::NoneNeeded => {
                debug_assert_eq!(event.branch, self.root_branch());
                ParentRef::RemoteRoot(self.root_branch())
            }
        }
    }

    fn create_flow(
        &self,
        service: &dyn RefService,
        namespace: &Namespace,
        event: &MirrorEvent,
    ) -> Result<Outcome, MirrorError> {
        self.ledger
            .fetch()
            .map_err(|err| MirrorError::from_ledger(event, err))?;
        // The tag records the head the decision was made for, even if the
        // branch moves while the remote update is in flight.
        let head = self
            .graph
            .head_of(&event.branch)
            .map_err(|err| MirrorError::from_graph(event, err))?;
        let resolved = self.resolve_parent(event)?;
        let parent = self.parent_ref(event, &resolved);

        let created = create_remote_branch(service, namespace, &event.branch, parent)
            .map_err(|err| MirrorError::from_sync(event, err).with_trace(resolved.trace.clone()))?;
        self.enter(State::Synced, event);

        self.ledger
            .record(&event.branch, &head)
            .and_then(|()| self.ledger.publish(&event.branch))
            .map_err(|err| MirrorError::from_ledger(event, err))?;
        self.enter(State::LedgerUpdated, event);

        Ok(Outcome::Created {
            branch: event.branch.clone(),
            parent: parent.branch().to_owned(),
            object_id: created.object_id,
        })
    }

    fn delete_flow(
        &self,
        service: &dyn RefService,
        namespace: &Namespace,
        event: &MirrorEvent,
    ) -> Result<Outcome, MirrorError> {
        if let Err(err) = self.ledger.fetch() {
            tracing::warn!(
                branch = %event.branch,
                error = %err,
                "failed to fetch the mirror ledger before deleting"
            );
        }

        let synced = delete_remote_branch(service, namespace, &event.branch);
        if synced.is_ok() {
            self.enter(State::Synced, event);
        }
        let cleared = self.clear_tag(&event.branch);

        match synced {
            Ok(outcome) => {
                cleared.map_err(|err| MirrorError::from_ledger(event, err))?;
                self.enter(State::LedgerUpdated, event);
                Ok(match outcome {
                    DeleteOutcome::Deleted { .. } => Outcome::Deleted {
                        branch: event.branch.clone(),
                    },
                    DeleteOutcome::NotFound { .. } => Outcome::Skipped {
                        branch: event.branch.clone(),
                        reason: SkipReason::RemoteBranchAbsent,
                    },
                })
            }
            Err(err) => {
                let mut err = MirrorError::from_sync(event, err);
                match cleared {
                    Ok(()) => {
                        err.ledger_cleared = true;
                        tracing::warn!(
                            branch = %event.branch,
                            "remote deletion failed but the mirror tag was cleared; the remote \
                             branch may still exist"
                        );
                    }
                    Err(ledger_err) => {
                        tracing::warn!(
                            branch = %event.branch,
                            error = %ledger_err,
                            "failed to clear the mirror tag after the remote deletion failed"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Removes the mirror tag locally and, if there was one, on the ledger
    /// remote.
    fn clear_tag(&self, branch: &str) -> Result<(), LedgerError> {
        if self.ledger.remove(branch)? {
            self.ledger.unpublish(branch)?;
        } else {
            tracing::debug!(branch, "no mirror tag to clear");
        }
        Ok(())
    }
}
