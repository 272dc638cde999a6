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

use std::io::Write as _;

use refmirror_lib::namespace::validate_branch_name;
use refmirror_lib::orchestrator::{EventKind, MirrorErrorKind};
use refmirror_lib::resolver::{resolve, Resolution, ResolutionRule, ResolveRequest};
use tracing::instrument;

use crate::cli_util::CommandHelper;
use crate::command_error::{CommandError, CommandErrorKind};
use crate::ui::Ui;

/// Show which branch a new branch would be created from
///
/// Prints the parent branch on stdout, or nothing if the branch needs no
/// parent. The rule that picked it and the mirror tags that were considered
/// are printed on stderr.
#[derive(clap::Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Branch to resolve the parent of
    branch: String,
    /// Pretend the event named this base branch
    #[arg(long, value_name = "BRANCH")]
    base: Option<String>,
    /// Use the local mirror tags as they are, without fetching them first
    #[arg(long)]
    no_fetch: bool,
}

#[instrument(skip_all)]
pub fn cmd_resolve(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &ResolveArgs,
) -> Result<(), CommandError> {
    validate_branch_name(&args.branch).map_err(|err| {
        CommandError::new(CommandErrorKind::Mirror(MirrorErrorKind::InvalidTrigger), err)
    })?;
    let settings = command.settings();
    let graph = command.open_ref_graph()?;
    let ledger = command.open_ledger()?;
    if !args.no_fetch {
        ledger.fetch()?;
    }
    let tags = ledger.list()?;
    let request = ResolveRequest {
        branch: &args.branch,
        kind: EventKind::Create,
        explicit_base: args.base.as_deref().filter(|base| !base.trim().is_empty()),
    };
    let resolved = resolve(&request, settings.root_branch(), &graph, &tags)?;

    if let Resolution::Parent(parent) = &resolved.resolution {
        writeln!(ui.stdout(), "{parent}")?;
    }
    let mut status = ui.status();
    writeln!(status, "Rule: {}", rule_description(resolved.rule))?;
    let lines = resolved.trace.candidate_lines();
    if !lines.is_empty() {
        writeln!(status, "Mirror tags considered:")?;
        for line in lines {
            writeln!(status, "  {line}")?;
        }
    }
    Ok(())
}

fn rule_description(rule: ResolutionRule) -> &'static str {
    match rule {
        ResolutionRule::DeleteEvent => "deleted branches have no parent",
        ResolutionRule::RootBranch => "the root branch is created from the remote root branch",
        ResolutionRule::ExplicitBase => "the base branch was given explicitly",
        ResolutionRule::SameCommit => "a mirror tag is at the branch head",
        ResolutionRule::Ancestor => "a mirror tag is at an ancestor of the branch head",
        ResolutionRule::RootFallback => "no mirror tags exist yet, using the root branch",
    }
}
