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

use refmirror_lib::azure::AzureReposClient;
use refmirror_lib::orchestrator::{EventKind, Mirror, MirrorEvent, Outcome, TriggerSource};
use refmirror_lib::settings::MirrorSettings;
use tracing::instrument;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Mirror a branch creation or deletion into Azure Repos
///
/// A created branch is created remotely from the remote counterpart of its
/// parent branch, and a mirror tag is recorded for it. A deleted branch is
/// deleted remotely and its mirror tag is removed.
///
/// The parent is the branch whose mirror tag is closest to the new branch:
/// a tag at the branch head wins over a tag at an ancestor, and the root
/// branch wins among equals. Use `refmirror resolve` to see the decision
/// without changing anything.
#[derive(clap::Args, Clone, Debug)]
pub struct SyncArgs {
    /// Kind of event to mirror: `create` or `delete`
    #[arg(long, value_name = "KIND")]
    event: EventKind,
    /// Branch that was created or deleted
    #[arg(long)]
    branch: String,
    /// Create the remote branch from this branch instead of resolving the
    /// parent
    #[arg(long, value_name = "BRANCH")]
    base: Option<String>,
    /// Owner of the source repository [default: `source.owner`]
    #[arg(long)]
    owner: Option<String>,
    /// Name of the source repository [default: `source.repository`]
    #[arg(long)]
    source_repository: Option<String>,
    /// The run was started by hand rather than by a branch event
    ///
    /// Manual runs may only create the root branch.
    #[arg(long)]
    manual: bool,
    /// Print what would be done without contacting Azure Repos or changing
    /// mirror tags
    #[arg(long)]
    dry_run: bool,
}

impl SyncArgs {
    fn to_event(&self, settings: &MirrorSettings) -> MirrorEvent {
        let owner = self
            .owner
            .clone()
            .or_else(|| settings.source.owner.clone())
            .unwrap_or_default();
        let repository = self
            .source_repository
            .clone()
            .or_else(|| settings.source.repository.clone())
            .unwrap_or_default();
        let trigger = if self.manual {
            TriggerSource::Manual
        } else {
            TriggerSource::Event
        };
        MirrorEvent::new(self.event, &self.branch, owner, repository)
            .with_base(self.base.clone())
            .with_trigger(trigger)
    }
}

#[instrument(skip_all)]
pub fn cmd_sync(ui: &mut Ui, command: &CommandHelper, args: &SyncArgs) -> Result<(), CommandError> {
    let settings = command.settings();
    let event = args.to_event(settings);
    let graph = command.open_ref_graph()?;
    let ledger = command.open_ledger()?;
    let mirror = Mirror::new(settings, &graph, &ledger);
    let outcome = if args.dry_run {
        mirror.plan(&event)?
    } else {
        let client = AzureReposClient::from_settings(&settings.azure)?;
        mirror.run(&client, &event)?
    };
    print_outcome(ui, &outcome)?;
    Ok(())
}

fn print_outcome(ui: &Ui, outcome: &Outcome) -> std::io::Result<()> {
    let mut stdout = ui.stdout();
    match outcome {
        Outcome::Created {
            branch,
            parent,
            object_id,
        } => writeln!(
            stdout,
            "Created branch {branch} from {parent} at {}",
            object_id.short_hex()
        ),
        Outcome::Deleted { branch } => writeln!(stdout, "Deleted branch {branch}"),
        Outcome::Skipped { branch, reason } => {
            writeln!(stdout, "Nothing to do for branch {branch}: {reason}")
        }
        Outcome::Planned {
            kind: EventKind::Create,
            ref_name,
            parent,
            ..
        } => match parent {
            Some(parent) => writeln!(stdout, "Would create {ref_name} from {parent}"),
            None => writeln!(stdout, "Would create {ref_name}"),
        },
        Outcome::Planned {
            kind: EventKind::Delete,
            ref_name,
            ..
        } => writeln!(stdout, "Would delete {ref_name}"),
    }
}
