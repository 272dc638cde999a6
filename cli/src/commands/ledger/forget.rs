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

/// Remove the mirror tags of branches
///
/// Use this when a remote branch was removed by hand, so the branch can be
/// mirrored again. The remote branches themselves are left alone.
#[derive(clap::Args, Clone, Debug)]
pub struct LedgerForgetArgs {
    /// Branches whose mirror tags to remove
    #[arg(required = true)]
    branches: Vec<String>,
    /// Only remove the local tags, leaving the ledger remote alone
    #[arg(long)]
    local: bool,
}

#[instrument(skip_all)]
pub fn cmd_ledger_forget(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &LedgerForgetArgs,
) -> Result<(), CommandError> {
    let ledger = command.open_ledger()?;
    if !args.local {
        ledger.fetch()?;
    }
    let mut forgotten = 0;
    for branch in &args.branches {
        if !ledger.remove(branch)? {
            writeln!(ui.warning_default(), "No mirror tag for branch {branch}")?;
            continue;
        }
        if !args.local {
            ledger.unpublish(branch)?;
        }
        forgotten += 1;
    }
    writeln!(ui.status(), "Forgot {forgotten} mirror tags.")?;
    Ok(())
}
