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

use std::error;
use std::io;
use std::io::Write as _;
use std::iter;
use std::process::ExitCode;
use std::sync::Arc;

use itertools::Itertools as _;
use refmirror_lib::azure::AzureConfigError;
use refmirror_lib::mirror_ledger::LedgerError;
use refmirror_lib::orchestrator::{MirrorError, MirrorErrorKind};
use refmirror_lib::ref_graph::RefGraphError;
use refmirror_lib::resolver::ResolveError;
use refmirror_lib::synchronizer::SyncError;
use thiserror::Error;

use crate::ui::Ui;

pub const BROKEN_PIPE_EXIT_CODE: u8 = 141;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandErrorKind {
    User,
    Config,
    /// Invalid command line. The inner error type may be `clap::Error`.
    Cli,
    /// A mirroring step failed.
    Mirror(MirrorErrorKind),
    BrokenPipe,
    Internal,
}

impl CommandErrorKind {
    /// Process exit status. Mirror failures get one code per kind so that
    /// the calling pipeline can tell them apart.
    pub fn exit_code(&self) -> u8 {
        match self {
            CommandErrorKind::User | CommandErrorKind::Config => 1,
            CommandErrorKind::Cli => 2,
            CommandErrorKind::Mirror(kind) => match kind {
                MirrorErrorKind::InvalidTrigger => 3,
                MirrorErrorKind::AlreadyExists => 4,
                MirrorErrorKind::ParentNotFound => 5,
                MirrorErrorKind::ParentMissingRemotely => 6,
                MirrorErrorKind::ApiFailure => 7,
                MirrorErrorKind::DeletionNotPersisted => 8,
                MirrorErrorKind::Repository | MirrorErrorKind::Ledger => 9,
            },
            CommandErrorKind::BrokenPipe => BROKEN_PIPE_EXIT_CODE,
            CommandErrorKind::Internal => 255,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub error: Arc<dyn error::Error + Send + Sync>,
    pub hints: Vec<String>,
}

impl CommandError {
    pub fn new(
        kind: CommandErrorKind,
        err: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        CommandError {
            kind,
            error: Arc::from(err.into()),
            hints: vec![],
        }
    }

    pub fn with_message(
        kind: CommandErrorKind,
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self::new(kind, ErrorWithMessage::new(message, source))
    }

    /// Returns error with the given plain-text `hint` attached.
    pub fn hinted(mut self, hint: impl Into<String>) -> Self {
        self.add_hint(hint);
        self
    }

    pub fn add_hint(&mut self, hint: impl Into<String>) {
        self.hints.push(hint.into());
    }

    pub fn extend_hints(&mut self, hints: impl IntoIterator<Item = String>) {
        self.hints.extend(hints);
    }
}

/// Wraps error with user-visible message.
#[derive(Debug, Error)]
#[error("{message}")]
struct ErrorWithMessage {
    message: String,
    source: Box<dyn error::Error + Send + Sync>,
}

impl ErrorWithMessage {
    fn new(
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ErrorWithMessage {
            message: message.into(),
            source: source.into(),
        }
    }
}

pub fn config_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Config, err)
}

pub fn config_error_with_message(
    message: impl Into<String>,
    source: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> CommandError {
    CommandError::with_message(CommandErrorKind::Config, message, source)
}

pub fn cli_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Cli, err)
}

pub fn internal_error_with_message(
    message: impl Into<String>,
    source: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> CommandError {
    CommandError::with_message(CommandErrorKind::Internal, message, source)
}

impl From<io::Error> for CommandError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::BrokenPipe => CommandErrorKind::BrokenPipe,
            _ => CommandErrorKind::User,
        };
        CommandError::new(kind, err)
    }
}

impl From<config::ConfigError> for CommandError {
    fn from(err: config::ConfigError) -> Self {
        config_error(err)
    }
}

impl From<clap::Error> for CommandError {
    fn from(err: clap::Error) -> Self {
        cli_error(err)
    }
}

impl From<AzureConfigError> for CommandError {
    fn from(err: AzureConfigError) -> Self {
        let hint = match &err {
            AzureConfigError::MissingSetting(key) => format!(
                "Set `azure.{key}` in the configuration file, or pass --dry-run to only print \
                 what would be done."
            ),
            AzureConfigError::InvalidUrl { .. } => {
                "The organization URL looks like https://dev.azure.com/<organization>.".to_owned()
            }
        };
        config_error(err).hinted(hint)
    }
}

impl From<RefGraphError> for CommandError {
    fn from(err: RefGraphError) -> Self {
        CommandError::new(CommandErrorKind::Mirror(MirrorErrorKind::Repository), err)
    }
}

impl From<LedgerError> for CommandError {
    fn from(err: LedgerError) -> Self {
        let hint = match &err {
            LedgerError::NoSuchRemote(_) => {
                Some("Set `ledger.remote` to the remote that shares the mirror tags.")
            }
            LedgerError::TagExists { .. } => Some(
                "Mirror tags are never moved. Forget the tag first if the branch was recreated.",
            ),
            _ => None,
        };
        let err = CommandError::new(CommandErrorKind::Mirror(MirrorErrorKind::Ledger), err);
        match hint {
            Some(hint) => err.hinted(hint),
            None => err,
        }
    }
}

impl From<ResolveError> for CommandError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::ParentNotFound { ref trace, .. } => {
                let mut hints = candidate_hints(&trace.candidate_lines());
                hints.push(parent_not_found_hint());
                let mut cmd_err = CommandError::new(
                    CommandErrorKind::Mirror(MirrorErrorKind::ParentNotFound),
                    err,
                );
                cmd_err.extend_hints(hints);
                cmd_err
            }
            ResolveError::RefGraph(err) => err.into(),
        }
    }
}

impl From<MirrorError> for CommandError {
    fn from(err: MirrorError) -> Self {
        let mut hints = vec![];
        if let Some(trace) = &err.trace {
            hints.extend(candidate_hints(&trace.candidate_lines()));
        }
        match err.kind {
            MirrorErrorKind::ParentNotFound => hints.push(parent_not_found_hint()),
            MirrorErrorKind::ParentMissingRemotely => {
                if let Some(SyncError::ParentMissingRemotely { seen, .. }) =
                    err.source.downcast_ref::<SyncError>()
                {
                    if !seen.is_empty() {
                        hints.push(format!(
                            "The remote service has these similar refs: {}",
                            seen.iter().join(", ")
                        ));
                    }
                }
                hints.push(
                    "The parent branch has a mirror tag but no remote branch. Mirror the parent \
                     again, or remove its stale tag with `refmirror ledger forget`."
                        .to_owned(),
                );
            }
            _ => {}
        }
        if err.ledger_cleared {
            hints.push(
                "The mirror tag was cleared anyway. The remote branch may still exist and has to \
                 be removed by hand."
                    .to_owned(),
            );
        }
        let mut cmd_err = CommandError::new(CommandErrorKind::Mirror(err.kind), err);
        cmd_err.extend_hints(hints);
        cmd_err
    }
}

fn candidate_hints(lines: &[String]) -> Vec<String> {
    if lines.is_empty() {
        return vec![];
    }
    let mut text = "Mirror tags considered:".to_owned();
    for line in lines {
        text.push_str("\n  ");
        text.push_str(line);
    }
    vec![text]
}

fn parent_not_found_hint() -> String {
    "Mirror an ancestor branch first, or name the parent with --base.".to_owned()
}

pub(crate) fn handle_command_result(ui: &mut Ui, result: Result<(), CommandError>) -> ExitCode {
    try_handle_command_result(ui, result).unwrap_or_else(|_| ExitCode::from(BROKEN_PIPE_EXIT_CODE))
}

fn try_handle_command_result(
    ui: &mut Ui,
    result: Result<(), CommandError>,
) -> io::Result<ExitCode> {
    let Err(cmd_err) = &result else {
        return Ok(ExitCode::SUCCESS);
    };
    let err = &cmd_err.error;
    let hints = &cmd_err.hints;
    match cmd_err.kind {
        CommandErrorKind::User | CommandErrorKind::Mirror(_) => {
            print_error(ui, "Error: ", err, hints)?;
        }
        CommandErrorKind::Config => {
            print_error(ui, "Config error: ", err, hints)?;
        }
        CommandErrorKind::Cli => {
            if let Some(err) = err.downcast_ref::<clap::Error>() {
                return handle_clap_error(ui, err, hints);
            }
            print_error(ui, "Error: ", err, hints)?;
        }
        // A broken pipe is not an error, but a signal to exit gracefully.
        CommandErrorKind::BrokenPipe => {}
        CommandErrorKind::Internal => {
            print_error(ui, "Internal error: ", err, hints)?;
        }
    }
    Ok(ExitCode::from(cmd_err.kind.exit_code()))
}

fn print_error(
    ui: &Ui,
    heading: &str,
    err: &dyn error::Error,
    hints: &[String],
) -> io::Result<()> {
    writeln!(ui.error_with_heading(heading), "{err}")?;
    print_error_sources(ui, err.source())?;
    print_error_hints(ui, hints)?;
    Ok(())
}

fn print_error_sources(ui: &Ui, source: Option<&dyn error::Error>) -> io::Result<()> {
    let Some(err) = source else {
        return Ok(());
    };
    let mut stderr = ui.stderr();
    if err.source().is_none() {
        writeln!(stderr, "Caused by: {err}")?;
    } else {
        writeln!(stderr, "Caused by:")?;
        for (i, err) in iter::successors(Some(err), |err| err.source()).enumerate() {
            writeln!(stderr, "{}: {err}", i + 1)?;
        }
    }
    Ok(())
}

fn print_error_hints(ui: &Ui, hints: &[String]) -> io::Result<()> {
    for hint in hints {
        writeln!(ui.hint_default(), "{hint}")?;
    }
    Ok(())
}

fn handle_clap_error(ui: &mut Ui, err: &clap::Error, hints: &[String]) -> io::Result<ExitCode> {
    let clap_str = err.render().to_string();
    // Definitions for exit codes and streams come from
    // https://github.com/clap-rs/clap/blob/master/src/error/mod.rs
    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
            write!(ui.stdout(), "{clap_str}")?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }
    write!(ui.stderr(), "{clap_str}")?;
    print_error_hints(ui, hints)?;
    Ok(ExitCode::from(2))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use refmirror_lib::object_id::CommitId;
    use refmirror_lib::resolver::{CandidateReport, CandidateVerdict, ResolutionTrace};

    use super::*;

    #[test]
    fn test_mirror_exit_codes_are_distinct() {
        let kinds = [
            MirrorErrorKind::InvalidTrigger,
            MirrorErrorKind::AlreadyExists,
            MirrorErrorKind::ParentNotFound,
            MirrorErrorKind::ParentMissingRemotely,
            MirrorErrorKind::ApiFailure,
            MirrorErrorKind::DeletionNotPersisted,
            MirrorErrorKind::Repository,
        ];
        let codes: HashSet<u8> = kinds
            .iter()
            .map(|kind| CommandErrorKind::Mirror(*kind).exit_code())
            .collect();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&CommandErrorKind::Config.exit_code()));
        assert!(!codes.contains(&CommandErrorKind::Cli.exit_code()));
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_parent_not_found_hints() {
        let trace = ResolutionTrace {
            head: Some(CommitId::from_hex("0101010101010101010101010101010101010101")),
            candidates: vec![CandidateReport {
                branch: "main".to_owned(),
                commit: CommitId::from_hex("0202020202020202020202020202020202020202"),
                verdict: CandidateVerdict::NotAncestor,
            }],
        };
        let err = CommandError::from(ResolveError::ParentNotFound {
            branch: "topic".to_owned(),
            trace,
        });
        assert_eq!(
            err.kind,
            CommandErrorKind::Mirror(MirrorErrorKind::ParentNotFound)
        );
        insta::assert_snapshot!(err.hints.join("\n"), @r"
        Mirror tags considered:
          main (020202020202): tag is not an ancestor of the branch head
        Mirror an ancestor branch first, or name the parent with --base.
        ");
    }
}
