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

mod ledger;
mod resolve;
mod sync;

use tracing::instrument;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

#[derive(clap::Subcommand, Clone, Debug)]
pub enum Command {
    #[command(subcommand)]
    Ledger(ledger::LedgerCommand),
    Resolve(resolve::ResolveArgs),
    Sync(sync::SyncArgs),
}

#[instrument(skip_all)]
pub fn run_command(
    ui: &mut Ui,
    command_helper: &CommandHelper,
    command: &Command,
) -> Result<(), CommandError> {
    match command {
        Command::Ledger(sub_args) => ledger::cmd_ledger(ui, command_helper, sub_args),
        Command::Resolve(sub_args) => resolve::cmd_resolve(ui, command_helper, sub_args),
        Command::Sync(sub_args) => sync::cmd_sync(ui, command_helper, sub_args),
    }
}
