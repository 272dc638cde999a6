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

//! Typed view of the mirror configuration.

#![allow(missing_docs)]

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Name of the branch every mirrored repository is rooted at.
pub const DEFAULT_ROOT_BRANCH: &str = "main";
/// Tag namespace holding the mirror ledger.
pub const DEFAULT_TAG_PREFIX: &str = "azure-mirror";

/// Identity of the repository whose branches are mirrored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourceSettings {
    pub owner: Option<String>,
    pub repository: Option<String>,
}

/// Controls which remote repository a source repository is mirrored into.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct NamespaceSettings {
    /// Owner whose repositories go into `primary_repository` directly.
    pub primary_owner: String,
    /// Remote repository name; other owners get `<primary>-<owner>`.
    pub primary_repository: String,
    pub root_branch: String,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        NamespaceSettings {
            primary_owner: String::new(),
            primary_repository: String::new(),
            root_branch: DEFAULT_ROOT_BRANCH.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LedgerSettings {
    pub tag_prefix: String,
    /// Git remote of the source repository that shares the ledger between
    /// executions.
    pub remote: String,
    /// Fetch the ledger tags before resolving a parent.
    pub fetch: bool,
    /// Push tag creations and deletions to `remote`.
    pub push: bool,
    /// Token for HTTPS remotes. SSH remotes use the agent.
    pub token: Option<String>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            tag_prefix: DEFAULT_TAG_PREFIX.to_owned(),
            remote: "origin".to_owned(),
            fetch: true,
            push: true,
            token: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct AzureSettings {
    /// e.g. `https://dev.azure.com/contoso`
    pub organization_url: Option<String>,
    pub project: Option<String>,
    pub api_version: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AzureSettings {
    fn default() -> Self {
        AzureSettings {
            organization_url: None,
            project: None,
            api_version: "7.1".to_owned(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl AzureSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorSettings {
    pub source: SourceSettings,
    pub mirror: NamespaceSettings,
    pub ledger: LedgerSettings,
    pub azure: AzureSettings,
}

impl MirrorSettings {
    pub fn from_config(config: &config::Config) -> Result<Self, config::ConfigError> {
        Ok(MirrorSettings {
            source: get_table_or_default(config, "source")?,
            mirror: get_table_or_default(config, "mirror")?,
            ledger: get_table_or_default(config, "ledger")?,
            azure: get_table_or_default(config, "azure")?,
        })
    }

    pub fn root_branch(&self) -> &str {
        &self.mirror.root_branch
    }
}

fn get_table_or_default<T: DeserializeOwned + Default>(
    config: &config::Config,
    key: &str,
) -> Result<T, config::ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(err) => Err(err),
    }
}
