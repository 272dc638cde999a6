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

use assert_matches::assert_matches;
use refmirror_lib::object_id::CommitId;
use refmirror_lib::ref_graph::{AncestryIndex as _, BranchHeads as _, RefGraphError};
use testutils::TestGitRepo;

#[test]
fn test_head_of_local_branch() {
    let test_repo = TestGitRepo::init();
    let commit1 = test_repo.write_commit(&[]);
    test_repo.set_branch("main", &commit1);

    let graph = test_repo.ref_graph();
    assert_eq!(graph.head_of("main").unwrap(), commit1);
    assert!(graph.has_branch("main").unwrap());
    assert!(!graph.has_branch("topic").unwrap());
    assert_matches!(
        graph.head_of("topic"),
        Err(RefGraphError::BranchNotFound(name)) if name == "topic"
    );
}

#[test]
fn test_head_of_falls_back_to_remote_tracking_branch() {
    let test_repo = TestGitRepo::init();
    let commit1 = test_repo.write_commit(&[]);
    let commit2 = test_repo.write_commit(&[&commit1]);
    test_repo.set_ref("refs/remotes/origin/release/1.0", &commit1);

    let graph = test_repo.ref_graph();
    assert_eq!(graph.head_of("release/1.0").unwrap(), commit1);

    // A local branch shadows the remote-tracking one.
    test_repo.set_branch("release/1.0", &commit2);
    let graph = test_repo.ref_graph();
    assert_eq!(graph.head_of("release/1.0").unwrap(), commit2);

    // Other remotes are not consulted.
    test_repo.set_ref("refs/remotes/upstream/feature", &commit1);
    assert!(!graph.has_branch("feature").unwrap());
}

#[test]
fn test_is_ancestor() {
    let test_repo = TestGitRepo::init();
    let commit1 = test_repo.write_commit(&[]);
    let commit2 = test_repo.write_commit(&[&commit1]);
    let commit3 = test_repo.write_commit(&[&commit2]);
    let side = test_repo.write_commit(&[&commit1]);
    let merge = test_repo.write_commit(&[&commit3, &side]);

    let graph = test_repo.ref_graph();
    assert!(graph.is_ancestor(&commit1, &commit3).unwrap());
    assert!(graph.is_ancestor(&commit2, &commit3).unwrap());
    assert!(!graph.is_ancestor(&commit3, &commit1).unwrap());
    assert!(!graph.is_ancestor(&side, &commit3).unwrap());
    assert!(graph.is_ancestor(&side, &merge).unwrap());
    // Strict: a commit is not its own ancestor.
    assert!(!graph.is_ancestor(&commit2, &commit2).unwrap());
}

#[test]
fn test_is_ancestor_unknown_commit() {
    let test_repo = TestGitRepo::init();
    let commit1 = test_repo.write_commit(&[]);
    let unknown = CommitId::from_hex("1111111111111111111111111111111111111111");

    let graph = test_repo.ref_graph();
    assert_matches!(
        graph.is_ancestor(&unknown, &commit1),
        Err(RefGraphError::CommitNotFound(id)) if id == unknown
    );
}
