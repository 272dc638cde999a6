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

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use refmirror_lib::mirror_ledger::MirrorLedger;
use refmirror_lib::settings::LedgerSettings;
use tempfile::TempDir;
use testutils::TestGitRepo;

/// Isolated environment for running the `refmirror` binary: its own home and
/// config directory, plus a repository with an `origin` remote.
pub struct TestEnvironment {
    _temp_dir: TempDir,
    env_root: PathBuf,
    home_dir: PathBuf,
    config_path: PathBuf,
    env_vars: HashMap<String, String>,
    config_file_number: RefCell<i64>,
    test_repo: TestGitRepo,
}

impl Default for TestEnvironment {
    fn default() -> Self {
        testutils::hermetic_libgit2();

        let tmp_dir = testutils::new_temp_dir();
        let env_root = tmp_dir.path().canonicalize().unwrap();
        let home_dir = env_root.join("home");
        std::fs::create_dir(&home_dir).unwrap();
        let config_dir = env_root.join("config");
        std::fs::create_dir(&config_dir).unwrap();
        let env = Self {
            _temp_dir: tmp_dir,
            env_root,
            home_dir,
            config_path: config_dir,
            env_vars: HashMap::new(),
            config_file_number: RefCell::new(0),
            test_repo: TestGitRepo::init(),
        };
        env.add_config(
            r#"
[source]
owner = "contoso"
repository = "widgets"

[mirror]
primary-owner = "contoso"
primary-repository = "mirror"
        "#,
        );
        env
    }
}

impl TestEnvironment {
    pub fn refmirror_cmd(&self, current_dir: &Path, args: &[&str]) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("refmirror").unwrap();
        cmd.current_dir(current_dir);
        cmd.args(args);
        cmd.env_clear();
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd.env("RUST_BACKTRACE", "1");
        // Keep log lines out of the captured stderr.
        cmd.env("RUST_LOG", "off");
        cmd.env("HOME", self.home_dir.to_str().unwrap());
        cmd.env("XDG_CONFIG_HOME", self.home_dir.join(".config").to_str().unwrap());
        cmd.env("REFMIRROR_CONFIG", self.config_path.to_str().unwrap());
        cmd.env("GIT_CONFIG_SYSTEM", "/dev/null");
        cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
        cmd
    }

    /// Runs `refmirror` in the test repository, checks that it succeeded, and
    /// returns its stdout and stderr.
    pub fn refmirror_cmd_ok(&self, args: &[&str]) -> (String, String) {
        self.refmirror_cmd_ok_in(&self.repo_path(), args)
    }

    pub fn refmirror_cmd_ok_in(&self, current_dir: &Path, args: &[&str]) -> (String, String) {
        let assert = self.refmirror_cmd(current_dir, args).assert().success();
        let stdout = self.normalize_output(&get_stdout_string(&assert));
        let stderr = self.normalize_output(&get_stderr_string(&assert));
        (stdout, stderr)
    }

    /// Like [`Self::refmirror_cmd_ok`], but also checks that nothing was
    /// printed on stderr.
    #[track_caller]
    pub fn refmirror_cmd_success(&self, args: &[&str]) -> String {
        let assert = self
            .refmirror_cmd(&self.repo_path(), args)
            .assert()
            .success()
            .stderr("");
        self.normalize_output(&get_stdout_string(&assert))
    }

    /// Runs `refmirror` in the test repository, checks that it failed with
    /// `code` without printing anything on stdout, and returns its stderr.
    #[must_use]
    pub fn refmirror_cmd_failure(&self, code: i32, args: &[&str]) -> String {
        self.refmirror_cmd_failure_in(&self.repo_path(), code, args)
    }

    #[must_use]
    pub fn refmirror_cmd_failure_in(
        &self,
        current_dir: &Path,
        code: i32,
        args: &[&str],
    ) -> String {
        let assert = self
            .refmirror_cmd(current_dir, args)
            .assert()
            .code(code)
            .stdout("");
        self.normalize_output(&get_stderr_string(&assert))
    }

    /// Run a `refmirror` command and check that it failed with code 2 (for
    /// invalid usage)
    #[must_use]
    pub fn refmirror_cmd_cli_error(&self, args: &[&str]) -> String {
        self.refmirror_cmd_failure(2, args)
    }

    pub fn env_root(&self) -> &Path {
        &self.env_root
    }

    pub fn test_repo(&self) -> &TestGitRepo {
        &self.test_repo
    }

    pub fn repo_path(&self) -> PathBuf {
        self.test_repo.repo_path()
    }

    /// The ledger as the binary sees it with default settings.
    pub fn ledger(&self) -> MirrorLedger {
        self.test_repo.ledger(&LedgerSettings::default())
    }

    pub fn add_config(&self, content: &str) {
        // Concatenating two valid TOML files does not (generally) result in a valid
        // TOML file, so we create a new file every time instead.
        let mut config_file_number = self.config_file_number.borrow_mut();
        *config_file_number += 1;
        let config_file_number = *config_file_number;
        std::fs::write(
            self.config_path
                .join(format!("config{config_file_number:04}.toml")),
            content,
        )
        .unwrap();
    }

    pub fn add_env_var(&mut self, key: &str, val: &str) {
        self.env_vars.insert(key.to_string(), val.to_string());
    }

    pub fn normalize_output(&self, text: &str) -> String {
        let repo_root = self.repo_path().parent().unwrap().to_owned();
        text.replace(&repo_root.display().to_string(), "$TEST_REPO")
            .replace(&self.env_root.display().to_string(), "$TEST_ENV")
    }
}

#[track_caller]
pub fn get_stdout_string(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

#[track_caller]
pub fn get_stderr_string(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stderr.clone()).unwrap()
}
