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

mod forget;
mod list;

use self::forget::{cmd_ledger_forget, LedgerForgetArgs};
use self::list::{cmd_ledger_list, LedgerListArgs};
use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Inspect and repair the mirror ledger
///
/// The ledger holds one tag per mirrored branch, pointing at the commit the
/// branch was at when it was mirrored.
#[derive(clap::Subcommand, Clone, Debug)]
pub enum LedgerCommand {
    #[command(visible_alias("f"))]
    Forget(LedgerForgetArgs),
    #[command(visible_alias("l"))]
    List(LedgerListArgs),
}

pub fn cmd_ledger(
    ui: &mut Ui,
    command: &CommandHelper,
    subcommand: &LedgerCommand,
) -> Result<(), CommandError> {
    match subcommand {
        LedgerCommand::Forget(args) => cmd_ledger_forget(ui, command, args),
        LedgerCommand::List(args) => cmd_ledger_list(ui, command, args),
    }
}
