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

use indoc::formatdoc;

use crate::common::TestEnvironment;

#[test]
fn test_resolve_ancestor_tag() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    let c2 = test_repo.write_commit(&[&c1]);
    test_repo.set_branch("main", &c1);
    test_repo.set_branch("release/1.0", &c2);
    test_env.ledger().record("main", &c1).unwrap();

    let (stdout, stderr) = test_env.refmirror_cmd_ok(&["resolve", "release/1.0", "--no-fetch"]);
    assert_eq!(stdout, "main\n");
    assert_eq!(
        stderr,
        formatdoc! {"
            Rule: a mirror tag is at an ancestor of the branch head
            Mirror tags considered:
              main ({c1}): tag is at an ancestor of the branch head
            ",
            c1 = c1.short_hex(),
        }
    );
}

#[test]
fn test_resolve_same_commit_wins_over_ancestor() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    let c2 = test_repo.write_commit(&[&c1]);
    test_repo.set_branch("topic", &c2);
    test_env.ledger().record("main", &c1).unwrap();
    test_env.ledger().record("feature", &c2).unwrap();

    let (stdout, _stderr) = test_env.refmirror_cmd_ok(&["resolve", "topic", "--no-fetch"]);
    assert_eq!(stdout, "feature\n");
}

#[test]
fn test_resolve_root_fallback() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    test_repo.set_branch("main", &c1);
    test_repo.set_branch("topic", &c1);

    let (stdout, stderr) = test_env.refmirror_cmd_ok(&["resolve", "topic", "--no-fetch"]);
    insta::assert_snapshot!(stdout, @"main");
    insta::assert_snapshot!(stderr, @"Rule: no mirror tags exist yet, using the root branch");
}

#[test]
fn test_resolve_root_branch() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    test_repo.set_branch("main", &c1);

    let (stdout, stderr) = test_env.refmirror_cmd_ok(&["resolve", "main", "--no-fetch"]);
    assert_eq!(stdout, "");
    insta::assert_snapshot!(stderr, @"Rule: the root branch is created from the remote root branch");
}

#[test]
fn test_resolve_explicit_base() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    test_repo.set_branch("topic", &c1);
    test_env.ledger().record("main", &c1).unwrap();

    let (stdout, stderr) =
        test_env.refmirror_cmd_ok(&["resolve", "topic", "--base", "develop", "--no-fetch"]);
    insta::assert_snapshot!(stdout, @"develop");
    insta::assert_snapshot!(stderr, @"Rule: the base branch was given explicitly");

    // A blank base is ignored.
    let (stdout, _stderr) =
        test_env.refmirror_cmd_ok(&["resolve", "topic", "--base", " ", "--no-fetch"]);
    insta::assert_snapshot!(stdout, @"main");
}

#[test]
fn test_resolve_parent_not_found() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    let c2 = test_repo.write_commit(&[&c1]);
    let side = test_repo.write_commit(&[&c1]);
    test_repo.set_branch("topic", &side);
    test_env.ledger().record("main", &c2).unwrap();

    let stderr = test_env.refmirror_cmd_failure(5, &["resolve", "topic", "--no-fetch"]);
    assert_eq!(
        stderr,
        formatdoc! {"
            Error: Could not determine the parent of branch 'topic'
            Hint: Mirror tags considered:
              main ({c2}): tag is not an ancestor of the branch head
            Hint: Mirror an ancestor branch first, or name the parent with --base.
            ",
            c2 = c2.short_hex(),
        }
    );
}

#[test]
fn test_resolve_without_root_branch() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    test_repo.set_branch("topic", &c1);

    let stderr = test_env.refmirror_cmd_failure(5, &["resolve", "topic", "--no-fetch"]);
    insta::assert_snapshot!(stderr, @r"
    Error: Could not determine the parent of branch 'topic'
    Hint: Mirror an ancestor branch first, or name the parent with --base.
    ");
}

#[test]
fn test_resolve_unknown_branch() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    test_env.ledger().record("main", &c1).unwrap();

    let stderr = test_env.refmirror_cmd_failure(9, &["resolve", "ghost", "--no-fetch"]);
    insta::assert_snapshot!(stderr, @"Error: Branch 'ghost' does not exist locally or on the ledger remote");
}

#[test]
fn test_resolve_invalid_branch_name() {
    let test_env = TestEnvironment::default();
    let stderr = test_env.refmirror_cmd_failure(3, &["resolve", "bad name", "--no-fetch"]);
    insta::assert_snapshot!(stderr, @"Error: 'bad name' is not a valid branch name");
}

#[test]
fn test_resolve_fetches_shared_ledger() {
    let test_env = TestEnvironment::default();
    let test_repo = test_env.test_repo();
    let c1 = test_repo.write_commit(&[]);
    let c2 = test_repo.write_commit(&[&c1]);
    test_repo.set_branch("topic", &c2);
    // Another execution mirrored "feature"; this clone doesn't have the tag.
    let ledger = test_env.ledger();
    ledger.record("main", &c1).unwrap();
    ledger.publish("main").unwrap();
    ledger.record("feature", &c2).unwrap();
    ledger.publish("feature").unwrap();
    ledger.remove("feature").unwrap();

    let (stdout, _stderr) = test_env.refmirror_cmd_ok(&["resolve", "topic", "--no-fetch"]);
    insta::assert_snapshot!(stdout, @"main");

    let (stdout, _stderr) = test_env.refmirror_cmd_ok(&["resolve", "topic"]);
    insta::assert_snapshot!(stdout, @"feature");
}
