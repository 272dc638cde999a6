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
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use itertools::Itertools as _;
use refmirror_lib::mirror_ledger::MirrorLedger;
use refmirror_lib::object_id::CommitId;
use refmirror_lib::ref_graph::GitRefGraph;
use refmirror_lib::settings::{LedgerSettings, MirrorSettings};
use tempfile::TempDir;

pub use crate::test_ref_service::TestRefService;

pub mod test_ref_service;

pub fn hermetic_libgit2() {
    // libgit2 respects init.defaultBranch (and possibly other config
    // variables) in the user's config files. Disable access to them to make
    // our tests hermetic.
    //
    // set_search_path is unsafe because it cannot guarantee thread safety (as
    // its documentation states). For the same reason, we wrap these invocations
    // in `call_once`.
    static CONFIGURE_GIT2: Once = Once::new();
    CONFIGURE_GIT2.call_once(|| unsafe {
        git2::opts::set_search_path(git2::ConfigLevel::System, "").unwrap();
        git2::opts::set_search_path(git2::ConfigLevel::Global, "").unwrap();
        git2::opts::set_search_path(git2::ConfigLevel::XDG, "").unwrap();
        git2::opts::set_search_path(git2::ConfigLevel::ProgramData, "").unwrap();
    });

    env::set_var("GIT_CONFIG_SYSTEM", "/dev/null");
    env::set_var("GIT_CONFIG_GLOBAL", "/dev/null");
}

pub fn new_temp_dir() -> TempDir {
    hermetic_libgit2();
    tempfile::Builder::new()
        .prefix("refmirror-test-")
        .tempdir()
        .unwrap()
}

pub fn base_config() -> config::ConfigBuilder<config::builder::DefaultState> {
    config::Config::builder().add_source(config::File::from_str(
        r#"
            source.owner = "contoso"
            source.repository = "widgets"
            mirror.primary-owner = "contoso"
            mirror.primary-repository = "mirror"
            ledger.remote = "origin"
        "#,
        config::FileFormat::Toml,
    ))
}

pub fn mirror_settings() -> MirrorSettings {
    let config = base_config().build().unwrap();
    MirrorSettings::from_config(&config).unwrap()
}

/// A working repository plus a bare repository registered as its `origin`,
/// both in one temporary directory.
pub struct TestGitRepo {
    temp_dir: TempDir,
    pub git_repo: git2::Repository,
}

impl TestGitRepo {
    pub fn init() -> Self {
        let temp_dir = new_temp_dir();
        let origin_path = temp_dir.path().join("origin.git");
        git2::Repository::init_bare(&origin_path).unwrap();
        let git_repo = git2::Repository::init(temp_dir.path().join("repo")).unwrap();
        git_repo
            .remote("origin", origin_path.to_str().unwrap())
            .unwrap();
        TestGitRepo { temp_dir, git_repo }
    }

    pub fn repo_path(&self) -> PathBuf {
        self.temp_dir.path().join("repo")
    }

    pub fn origin_path(&self) -> PathBuf {
        self.temp_dir.path().join("origin.git")
    }

    pub fn origin(&self) -> git2::Repository {
        git2::Repository::open_bare(self.origin_path()).unwrap()
    }

    /// Writes an empty-tree commit with a unique message.
    pub fn write_commit(&self, parents: &[&CommitId]) -> CommitId {
        let git_repo = &self.git_repo;
        let signature = git2::Signature::now("Someone", "someone@example.com").unwrap();
        let tree_id = git_repo.treebuilder(None).unwrap().write().unwrap();
        let tree = git_repo.find_tree(tree_id).unwrap();
        let parents = parents
            .iter()
            .map(|id| git_repo.find_commit(git2::Oid::try_from(*id).unwrap()).unwrap())
            .collect_vec();
        let parent_refs = parents.iter().collect_vec();
        let oid = git_repo
            .commit(
                None,
                &signature,
                &signature,
                &format!("random commit {}", rand::random::<u32>()),
                &tree,
                &parent_refs,
            )
            .unwrap();
        oid.into()
    }

    pub fn set_branch(&self, name: &str, target: &CommitId) {
        self.set_ref(&format!("refs/heads/{name}"), target);
    }

    pub fn set_ref(&self, ref_name: &str, target: &CommitId) {
        let oid = git2::Oid::try_from(target).unwrap();
        self.git_repo.reference(ref_name, oid, true, "test").unwrap();
    }

    pub fn delete_ref(&self, ref_name: &str) {
        self.git_repo.find_reference(ref_name).unwrap().delete().unwrap();
    }

    /// Pushes `refspec` from the working repository to origin.
    pub fn push_to_origin(&self, refspec: &str) {
        let mut remote = self.git_repo.find_remote("origin").unwrap();
        remote.push(&[refspec], None).unwrap();
    }

    /// Ref names in origin starting with `prefix`, sorted.
    pub fn origin_ref_names(&self, prefix: &str) -> Vec<String> {
        let origin = self.origin();
        let git_refs = origin.references().unwrap();
        git_refs
            .map(|git_ref| git_ref.unwrap().name().unwrap().to_owned())
            .filter(|name| name.starts_with(prefix))
            .sorted()
            .collect_vec()
    }

    pub fn ref_graph(&self) -> GitRefGraph {
        GitRefGraph::open(&self.repo_path(), "origin").unwrap()
    }

    pub fn ledger(&self, settings: &LedgerSettings) -> MirrorLedger {
        MirrorLedger::open(&self.repo_path(), settings).unwrap()
    }
}

pub fn assert_no_forgotten_test_files(test_dir: &Path) {
    let runner_path = test_dir.join("runner.rs");
    let runner = fs::read_to_string(&runner_path).unwrap();
    let entries = fs::read_dir(test_dir).unwrap();
    for entry in entries {
        let path = entry.unwrap().path();
        if let Some(ext) = path.extension() {
            let name = path.file_stem().unwrap();
            if ext == "rs" && name != "runner" {
                let search = format!("mod {};", name.to_str().unwrap());
                assert!(
                    runner.contains(&search),
                    "missing `{search}` declaration in {}",
                    runner_path.display()
                );
            }
        }
    }
}
