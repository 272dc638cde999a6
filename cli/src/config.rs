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

use std::env;
use std::path::{Path, PathBuf};

use itertools::Itertools as _;
use thiserror::Error;
use tracing::instrument;

/// Per-repository configuration file, read from the working tree root.
pub const REPO_CONFIG_FILE: &str = ".refmirror.toml";

const DEFAULT_CONFIG: &str = include_str!("config/defaults.toml");

/// Environment variables that override single settings, typically secrets
/// injected by the pipeline.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("REFMIRROR_AZURE_TOKEN", "azure.token"),
    ("REFMIRROR_LEDGER_TOKEN", "ledger.token"),
    ("REFMIRROR_SOURCE_OWNER", "source.owner"),
    ("REFMIRROR_SOURCE_REPOSITORY", "source.repository"),
];

#[derive(Debug, Error)]
pub enum ConfigEnvError {
    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),
    #[error("Failed to read config directory {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the user configuration lives.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ConfigPath {
    /// Existing config file or directory.
    Existing(PathBuf),
    /// Could not find any config file, but a new file can be created at the
    /// specified location.
    New(PathBuf),
    /// Could not find any config file.
    Unavailable,
}

impl ConfigPath {
    fn new(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if path.exists() => ConfigPath::Existing(path),
            Some(path) => ConfigPath::New(path),
            None => ConfigPath::Unavailable,
        }
    }
}

/// Environment the configuration is loaded from.
#[derive(Clone, Debug)]
pub struct ConfigEnv {
    user_config_path: ConfigPath,
    env_overrides: Vec<(&'static str, String)>,
}

impl ConfigEnv {
    /// Reads `REFMIRROR_CONFIG` and the platform config directory.
    pub fn from_environment() -> Self {
        let path = match env::var_os("REFMIRROR_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::config_dir().map(|dir| dir.join("refmirror").join("config.toml")),
        };
        let env_overrides = ENV_OVERRIDES
            .iter()
            .filter_map(|(var, key)| {
                let value = env::var(var).ok()?;
                (!value.is_empty()).then_some((*key, value))
            })
            .collect();
        ConfigEnv {
            user_config_path: ConfigPath::new(path),
            env_overrides,
        }
    }

    /// Returns a path to the user-specific config file or directory, if one
    /// exists.
    pub fn existing_user_config_path(&self) -> Option<&Path> {
        match &self.user_config_path {
            ConfigPath::Existing(path) => Some(path),
            _ => None,
        }
    }

    /// Where a new user config file would be created.
    pub fn new_user_config_path(&self) -> Option<&Path> {
        match &self.user_config_path {
            ConfigPath::Existing(path) | ConfigPath::New(path) => Some(path),
            ConfigPath::Unavailable => None,
        }
    }
}

/// Configuration given on the command line.
#[derive(Clone, Debug, Default)]
pub struct ConfigArgs {
    /// Files passed with `--config-file`, in order.
    pub files: Vec<PathBuf>,
    /// TOML snippets passed with `--config-toml`, in order.
    pub toml: Vec<String>,
}

/// Loads the layered configuration. Later layers win: built-in defaults,
/// user config, repository config, `--config-file`, `--config-toml`, and
/// finally the environment overrides.
#[instrument(skip(env, args))]
pub fn load_config(
    env: &ConfigEnv,
    repo_root: Option<&Path>,
    args: &ConfigArgs,
) -> Result<config::Config, ConfigEnvError> {
    let mut builder = config::Config::builder().add_source(config::File::from_str(
        DEFAULT_CONFIG,
        config::FileFormat::Toml,
    ));
    if let Some(path) = env.existing_user_config_path() {
        if path.is_dir() {
            for file in config_dir_files(path)? {
                builder = builder.add_source(read_config_path(&file, true));
            }
        } else {
            builder = builder.add_source(read_config_path(path, true));
        }
    }
    if let Some(root) = repo_root {
        builder = builder.add_source(read_config_path(&root.join(REPO_CONFIG_FILE), false));
    }
    for path in &args.files {
        builder = builder.add_source(read_config_path(path, true));
    }
    for text in &args.toml {
        builder = builder.add_source(config::File::from_str(text, config::FileFormat::Toml));
    }
    for (key, value) in &env.env_overrides {
        tracing::debug!(key, "setting overridden from the environment");
        builder = builder.set_override(*key, value.as_str())?;
    }
    Ok(builder.build()?)
}

fn read_config_path(
    path: &Path,
    required: bool,
) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(required)
        .format(config::FileFormat::Toml)
}

/// `*.toml` files in `dir`, sorted by name.
fn config_dir_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigEnvError> {
    let read_dir_error = |source| ConfigEnvError::ReadDir {
        path: dir.to_owned(),
        source,
    };
    let entries: Vec<_> = dir
        .read_dir()
        .map_err(read_dir_error)?
        .try_collect()
        .map_err(read_dir_error)?;
    Ok(entries
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .sorted()
        .collect())
}
