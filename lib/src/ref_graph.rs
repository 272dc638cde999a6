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

//! Read-only view over the source repository's branches and ancestry.

#![allow(missing_docs)]

use std::path::Path;

use thiserror::Error;

use crate::object_id::CommitId;

#[derive(Debug, Error)]
pub enum RefGraphError {
    #[error("Branch '{0}' does not exist locally or on the ledger remote")]
    BranchNotFound(String),
    #[error("Commit {0} is not in the repository")]
    CommitNotFound(CommitId),
    #[error("Unexpected git error when reading refs: {0}")]
    InternalGitError(#[from] git2::Error),
}

/// Answers "is A an ancestor of B" questions.
pub trait AncestryIndex {
    /// Returns true if `ancestor` is a strict ancestor of `descendant`. Equal
    /// commits are not ancestors of each other.
    fn is_ancestor(
        &self,
        ancestor: &CommitId,
        descendant: &CommitId,
    ) -> Result<bool, RefGraphError>;
}

/// Branch lookups plus ancestry, everything the parent resolver reads.
pub trait BranchHeads: AncestryIndex {
    /// Head commit of `branch`.
    fn head_of(&self, branch: &str) -> Result<CommitId, RefGraphError>;

    fn has_branch(&self, branch: &str) -> Result<bool, RefGraphError>;
}

/// Ref graph backed by a local Git repository.
pub struct GitRefGraph {
    git_repo: git2::Repository,
    tracking_remote: String,
}

impl GitRefGraph {
    /// Opens the repository at `path`. Branches missing locally are looked up
    /// as `refs/remotes/<tracking_remote>/<branch>`.
    pub fn open(path: &Path, tracking_remote: &str) -> Result<Self, RefGraphError> {
        let git_repo = git2::Repository::open(path)?;
        Ok(Self::new(git_repo, tracking_remote))
    }

    pub fn new(git_repo: git2::Repository, tracking_remote: &str) -> Self {
        GitRefGraph {
            git_repo,
            tracking_remote: tracking_remote.to_owned(),
        }
    }

    fn find_branch_commit(&self, branch: &str) -> Result<Option<CommitId>, RefGraphError> {
        let candidates = [
            format!("refs/heads/{branch}"),
            format!("refs/remotes/{}/{branch}", self.tracking_remote),
        ];
        for ref_name in &candidates {
            match self.git_repo.find_reference(ref_name) {
                Ok(git_ref) => {
                    let commit = git_ref.peel_to_commit()?;
                    return Ok(Some(commit.id().into()));
                }
                Err(err) if err.code() == git2::ErrorCode::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }

    fn to_oid(&self, id: &CommitId) -> Result<git2::Oid, RefGraphError> {
        let oid = git2::Oid::try_from(id)?;
        match self.git_repo.find_commit(oid) {
            Ok(_) => Ok(oid),
            Err(err) if err.code() == git2::ErrorCode::NotFound => {
                Err(RefGraphError::CommitNotFound(id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl BranchHeads for GitRefGraph {
    fn head_of(&self, branch: &str) -> Result<CommitId, RefGraphError> {
        self.find_branch_commit(branch)?
            .ok_or_else(|| RefGraphError::BranchNotFound(branch.to_owned()))
    }

    fn has_branch(&self, branch: &str) -> Result<bool, RefGraphError> {
        Ok(self.find_branch_commit(branch)?.is_some())
    }
}

impl AncestryIndex for GitRefGraph {
    fn is_ancestor(
        &self,
        ancestor: &CommitId,
        descendant: &CommitId,
    ) -> Result<bool, RefGraphError> {
        if ancestor == descendant {
            return Ok(false);
        }
        let ancestor = self.to_oid(ancestor)?;
        let descendant = self.to_oid(descendant)?;
        Ok(self.git_repo.graph_descendant_of(descendant, ancestor)?)
    }
}
