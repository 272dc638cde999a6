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

//! Durable record of which branches have been mirrored.
//!
//! Each mirrored branch `B` owns the lightweight tag
//! `refs/tags/<prefix>/B` pointing at the commit `B` was at when its remote
//! counterpart was created. The tags are shared between executions through
//! the source repository's own remote.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::path::Path;

use thiserror::Error;
use tracing::instrument;

use crate::object_id::CommitId;
use crate::settings::LedgerSettings;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Mirror tag for '{branch}' already exists at {existing}")]
    TagExists { branch: String, existing: CommitId },
    #[error("No git remote named '{0}'")]
    NoSuchRemote(String),
    #[error("Remote rejected the update of {ref_name}: {reason}")]
    RefUpdateRejected { ref_name: String, reason: String },
    #[error("Unexpected git error when updating the mirror ledger: {0}")]
    InternalGitError(#[from] git2::Error),
}

/// Ledger entry: `branch` was mirrored when it pointed at `commit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorTag {
    pub branch: String,
    pub commit: CommitId,
}

pub struct MirrorLedger {
    git_repo: git2::Repository,
    settings: LedgerSettings,
}

impl MirrorLedger {
    pub fn open(path: &Path, settings: &LedgerSettings) -> Result<Self, LedgerError> {
        let git_repo = git2::Repository::open(path)?;
        Ok(Self::new(git_repo, settings.clone()))
    }

    pub fn new(git_repo: git2::Repository, settings: LedgerSettings) -> Self {
        MirrorLedger { git_repo, settings }
    }

    fn tag_namespace(&self) -> String {
        format!("refs/tags/{}/", self.settings.tag_prefix)
    }

    pub fn tag_ref_name(&self, branch: &str) -> String {
        format!("{}{branch}", self.tag_namespace())
    }

    /// All mirror tags, ordered by branch name.
    pub fn list(&self) -> Result<Vec<MirrorTag>, LedgerError> {
        let namespace = self.tag_namespace();
        let mut tags = vec![];
        for git_ref in self.git_repo.references()? {
            let git_ref = git_ref?;
            let Some(branch) = git_ref
                .name()
                .and_then(|name| name.strip_prefix(&namespace))
            else {
                continue;
            };
            let branch = branch.to_owned();
            let commit = git_ref.peel_to_commit()?;
            tags.push(MirrorTag {
                branch,
                commit: commit.id().into(),
            });
        }
        tags.sort_by(|a, b| a.branch.cmp(&b.branch));
        Ok(tags)
    }

    pub fn get(&self, branch: &str) -> Result<Option<MirrorTag>, LedgerError> {
        match self.git_repo.find_reference(&self.tag_ref_name(branch)) {
            Ok(git_ref) => {
                let commit = git_ref.peel_to_commit()?;
                Ok(Some(MirrorTag {
                    branch: branch.to_owned(),
                    commit: commit.id().into(),
                }))
            }
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the tag for `branch`. An existing tag is never moved; writing
    /// the same commit again is a no-op.
    pub fn record(&self, branch: &str, commit: &CommitId) -> Result<(), LedgerError> {
        if let Some(existing) = self.get(branch)? {
            if existing.commit == *commit {
                return Ok(());
            }
            return Err(LedgerError::TagExists {
                branch: branch.to_owned(),
                existing: existing.commit,
            });
        }
        let oid = git2::Oid::try_from(commit)?;
        self.git_repo.reference(
            &self.tag_ref_name(branch),
            oid,
            false,
            &format!("refmirror: mirrored {branch}"),
        )?;
        tracing::debug!(branch, commit = %commit.short_hex(), "recorded mirror tag");
        Ok(())
    }

    /// Deletes the tag for `branch`. Returns false if there was none.
    pub fn remove(&self, branch: &str) -> Result<bool, LedgerError> {
        match self.git_repo.find_reference(&self.tag_ref_name(branch)) {
            Ok(mut git_ref) => {
                git_ref.delete()?;
                tracing::debug!(branch, "removed mirror tag");
                Ok(true)
            }
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn find_remote(&self) -> Result<git2::Remote<'_>, LedgerError> {
        let remote_name = &self.settings.remote;
        self.git_repo
            .find_remote(remote_name)
            .map_err(|err| match (err.class(), err.code()) {
                (git2::ErrorClass::Config, git2::ErrorCode::NotFound) => {
                    LedgerError::NoSuchRemote(remote_name.clone())
                }
                (git2::ErrorClass::Config, git2::ErrorCode::InvalidSpec) => {
                    LedgerError::NoSuchRemote(remote_name.clone())
                }
                _ => LedgerError::InternalGitError(err),
            })
    }

    /// Replaces the local ledger with the one on the ledger remote, dropping
    /// tags that were removed there.
    #[instrument(skip(self))]
    pub fn fetch(&self) -> Result<(), LedgerError> {
        if !self.settings.fetch {
            tracing::debug!("ledger fetch disabled");
            return Ok(());
        }
        let mut remote = self.find_remote()?;
        let namespace = self.tag_namespace();
        let refspec = format!("+{namespace}*:{namespace}*");
        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(self.remote_callbacks());
        fetch_options.download_tags(git2::AutotagOption::None);
        // Tags deleted remotely are removed locally as well.
        fetch_options.prune(git2::FetchPrune::On);
        remote.fetch(&[refspec.as_str()], Some(&mut fetch_options), None)?;
        tracing::debug!(%refspec, "fetched mirror tags");
        Ok(())
    }

    /// Pushes the tag for `branch` to the ledger remote.
    #[instrument(skip(self))]
    pub fn publish(&self, branch: &str) -> Result<(), LedgerError> {
        let ref_name = self.tag_ref_name(branch);
        self.push_refspec(&ref_name, &format!("{ref_name}:{ref_name}"))
    }

    /// Deletes the tag for `branch` from the ledger remote.
    #[instrument(skip(self))]
    pub fn unpublish(&self, branch: &str) -> Result<(), LedgerError> {
        let ref_name = self.tag_ref_name(branch);
        self.push_refspec(&ref_name, &format!(":{ref_name}"))
    }

    fn push_refspec(&self, ref_name: &str, refspec: &str) -> Result<(), LedgerError> {
        if !self.settings.push {
            tracing::debug!(refspec, "ledger push disabled");
            return Ok(());
        }
        let mut remote = self.find_remote()?;
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let mut callbacks = self.remote_callbacks();
        callbacks.push_update_reference(|refname, status| {
            if let Some(reason) = status {
                if refname == ref_name {
                    *rejection.borrow_mut() = Some(reason.to_owned());
                }
            }
            Ok(())
        });
        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);
        remote.push(&[refspec], Some(&mut push_options))?;
        drop(push_options);
        match rejection.into_inner() {
            Some(reason) => Err(LedgerError::RefUpdateRejected {
                ref_name: ref_name.to_owned(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn remote_callbacks(&self) -> git2::RemoteCallbacks<'_> {
        let mut callbacks = git2::RemoteCallbacks::new();
        let token = self.settings.token.clone();
        let mut tried = git2::CredentialType::empty();
        callbacks.credentials(move |_url, username_from_url, allowed_types| {
            // libgit2 keeps asking until we give up, so offer each kind once.
            if let Some(token) = &token {
                if allowed_types.contains(git2::CredentialType::USER_PASS_PLAINTEXT)
                    && !tried.contains(git2::CredentialType::USER_PASS_PLAINTEXT)
                {
                    tried |= git2::CredentialType::USER_PASS_PLAINTEXT;
                    return git2::Cred::userpass_plaintext("x-access-token", token);
                }
            }
            if allowed_types.contains(git2::CredentialType::SSH_KEY)
                && !tried.contains(git2::CredentialType::SSH_KEY)
            {
                tried |= git2::CredentialType::SSH_KEY;
                return git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
            }
            if allowed_types.contains(git2::CredentialType::DEFAULT)
                && !tried.contains(git2::CredentialType::DEFAULT)
            {
                tried |= git2::CredentialType::DEFAULT;
                return git2::Cred::default();
            }
            Err(git2::Error::from_str("no usable credentials for the ledger remote"))
        });
        callbacks
    }
}
