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

use tracing::instrument;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// List mirrored branches and the commits they were mirrored at
#[derive(clap::Args, Clone, Debug)]
pub struct LedgerListArgs {
    /// List the local mirror tags without fetching them first
    #[arg(long)]
    no_fetch: bool,
}

#[instrument(skip_all)]
pub fn cmd_ledger_list(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &LedgerListArgs,
) -> Result<(), CommandError> {
    let ledger = command.open_ledger()?;
    if !args.no_fetch {
        ledger.fetch()?;
    }
    let mut stdout = ui.stdout();
    for tag in ledger.list()? {
        writeln!(stdout, "{}: {}", tag.branch, tag.commit.hex())?;
    }
    Ok(())
}
