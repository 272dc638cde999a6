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
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory as _, FromArgMatches as _};
use refmirror_lib::mirror_ledger::MirrorLedger;
use refmirror_lib::orchestrator::MirrorErrorKind;
use refmirror_lib::ref_graph::GitRefGraph;
use refmirror_lib::settings::MirrorSettings;
use tracing::instrument;
use tracing_subscriber::prelude::*;

use crate::command_error::{
    config_error_with_message, handle_command_result, internal_error_with_message, CommandError,
    CommandErrorKind,
};
use crate::commands::{run_command, Command};
use crate::config::{load_config, ConfigArgs, ConfigEnv, ConfigEnvError};
use crate::ui::Ui;

pub struct TracingSubscription {
    reload_log_filter: tracing_subscriber::reload::Handle<
        tracing_subscriber::EnvFilter,
        tracing_subscriber::Registry,
    >,
}

impl TracingSubscription {
    /// Initializes tracing with the default configuration. This should be
    /// called as early as possible.
    pub fn init() -> Self {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing::metadata::LevelFilter::ERROR.into())
            .from_env_lossy();
        let (filter, reload_log_filter) = tracing_subscriber::reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::Layer::default()
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
        TracingSubscription { reload_log_filter }
    }

    pub fn enable_debug_logging(&self) -> Result<(), CommandError> {
        self.reload_log_filter
            .modify(|filter| {
                *filter = tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::metadata::LevelFilter::DEBUG.into())
                    .from_env_lossy();
            })
            .map_err(|err| internal_error_with_message("failed to enable debug logging", err))?;
        tracing::info!("debug logging enabled");
        Ok(())
    }
}

/// Mirrors branch creation and deletion into Azure Repos
///
/// Every mirrored branch is created from the remote counterpart of its
/// parent branch, so the mirror keeps the branch ancestry of the source
/// repository. Mirrored branches are recorded as tags under
/// `refs/tags/<ledger.tag-prefix>/`, which are shared through the
/// `ledger.remote` Git remote.
#[derive(clap::Parser, Clone, Debug)]
#[command(name = "refmirror")]
pub struct Args {
    #[command(flatten)]
    pub global_args: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Clone, Debug)]
#[command(next_help_heading = "Global Options")]
pub struct GlobalArgs {
    /// Path to the Git repository to operate on
    ///
    /// By default, the repository containing the current directory is used.
    #[arg(long, short = 'R', global = true, value_hint = clap::ValueHint::DirPath)]
    pub repository: Option<PathBuf>,
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
    /// Silence non-primary command output
    #[arg(long, global = true)]
    pub quiet: bool,
    /// Additional configuration file (can be repeated)
    #[arg(long, value_name = "PATH", global = true)]
    pub config_file: Vec<PathBuf>,
    /// Additional configuration options as TOML (can be repeated)
    ///
    /// For example `--config-toml 'ledger.push = false'`.
    #[arg(long, value_name = "TOML", global = true)]
    pub config_toml: Vec<String>,
}

impl GlobalArgs {
    fn config_args(&self) -> ConfigArgs {
        ConfigArgs {
            files: self.config_file.clone(),
            toml: self.config_toml.clone(),
        }
    }
}

/// State shared by all commands: parsed settings and the repository
/// location, which is the working tree root or the Git directory of a bare
/// repository.
pub struct CommandHelper {
    settings: MirrorSettings,
    repo_root: PathBuf,
}

impl CommandHelper {
    pub fn settings(&self) -> &MirrorSettings {
        &self.settings
    }

    #[instrument(skip_all)]
    pub fn open_ref_graph(&self) -> Result<GitRefGraph, CommandError> {
        let graph = GitRefGraph::open(&self.repo_root, &self.settings.ledger.remote)?;
        Ok(graph)
    }

    #[instrument(skip_all)]
    pub fn open_ledger(&self) -> Result<MirrorLedger, CommandError> {
        let ledger = MirrorLedger::open(&self.repo_root, &self.settings.ledger)?;
        Ok(ledger)
    }
}

fn repository_error(path: &Path, err: git2::Error) -> CommandError {
    CommandError::with_message(
        CommandErrorKind::Mirror(MirrorErrorKind::Repository),
        format!("There is no Git repository at {}", path.display()),
        err,
    )
}

/// Finds the repository `path` belongs to, returning its root.
fn discover_repo_root(path: &Path) -> Result<PathBuf, CommandError> {
    let git_repo = git2::Repository::discover(path).map_err(|err| repository_error(path, err))?;
    let root = git_repo.workdir().unwrap_or_else(|| git_repo.path());
    Ok(root.to_owned())
}

impl From<ConfigEnvError> for CommandError {
    fn from(err: ConfigEnvError) -> Self {
        config_error_with_message("Failed to load configuration", err)
    }
}

/// Runs the command line, taking care of logging setup and error reporting.
#[must_use]
pub struct CliRunner {
    tracing_subscription: TracingSubscription,
    app: clap::Command,
}

impl CliRunner {
    /// Initializes CLI environment and returns a builder. This should be
    /// called as early as possible.
    pub fn init() -> Self {
        let tracing_subscription = TracingSubscription::init();
        CliRunner {
            tracing_subscription,
            app: Args::command(),
        }
    }

    /// Set the version to be displayed by `refmirror --version`.
    pub fn version(mut self, version: &str) -> Self {
        self.app = self.app.version(version.to_owned());
        self
    }

    #[instrument(skip_all)]
    fn run_internal(&self, ui: &mut Ui, raw_args: Vec<OsString>) -> Result<(), CommandError> {
        let matches = self.app.clone().try_get_matches_from(raw_args)?;
        let args = Args::from_arg_matches(&matches)?;
        if args.global_args.debug {
            self.tracing_subscription.enable_debug_logging()?;
        }
        ui.set_quiet(args.global_args.quiet);

        let cwd = env::current_dir().map_err(|err| {
            internal_error_with_message("Could not determine current directory", err)
        })?;
        let start = match &args.global_args.repository {
            Some(path) => cwd.join(path),
            None => cwd,
        };
        let repo_root = discover_repo_root(&start)?;
        tracing::debug!(repo_root = %repo_root.display(), "found repository");

        let config_env = ConfigEnv::from_environment();
        let config = load_config(
            &config_env,
            Some(&repo_root),
            &args.global_args.config_args(),
        )?;
        let settings = MirrorSettings::from_config(&config)?;
        let command_helper = CommandHelper {
            settings,
            repo_root,
        };
        run_command(ui, &command_helper, &args.command)
    }

    #[must_use]
    #[instrument(skip(self))]
    pub fn run(self) -> ExitCode {
        let mut ui = Ui::new();
        let result = self.run_internal(&mut ui, env::args_os().collect());
        handle_command_result(&mut ui, result)
    }
}
