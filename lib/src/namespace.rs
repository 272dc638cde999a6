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

//! Where a source repository's branches live on the remote service.

#![allow(missing_docs)]

use thiserror::Error;

use crate::settings::NamespaceSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BranchNameError {
    #[error("Branch name is empty")]
    Empty,
    #[error("'{0}' is not a valid branch name")]
    Invalid(String),
}

/// Checks that `name` can be used as `refs/heads/<name>`.
pub fn validate_branch_name(name: &str) -> Result<(), BranchNameError> {
    if name.is_empty() {
        return Err(BranchNameError::Empty);
    }
    if git2::Reference::is_valid_name(&format!("refs/heads/{name}")) {
        Ok(())
    } else {
        Err(BranchNameError::Invalid(name.to_owned()))
    }
}

/// Remote repository plus the path prefix isolating one source repository
/// inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    /// Remote repository the branches are mirrored into.
    pub repository: String,
    /// Source repository name. Every mirrored branch lives under
    /// `refs/heads/<prefix>/`.
    pub prefix: String,
}

impl Namespace {
    /// Derives the namespace for a source repository.
    ///
    /// Repositories of the primary owner are mirrored into the primary remote
    /// repository; any other owner gets `<primary>-<owner>`. Owners are
    /// compared exactly.
    pub fn derive(settings: &NamespaceSettings, owner: &str, source_repository: &str) -> Self {
        let repository = if owner == settings.primary_owner {
            settings.primary_repository.clone()
        } else {
            format!("{}-{owner}", settings.primary_repository)
        };
        Namespace {
            repository,
            prefix: source_repository.to_owned(),
        }
    }

    pub fn full_ref_name(&self, branch: &str) -> String {
        format!("refs/heads/{}/{branch}", self.prefix)
    }
}

/// Full name of the remote repository's own (unprefixed) root branch.
pub fn root_ref_name(root_branch: &str) -> String {
    format!("refs/heads/{root_branch}")
}
