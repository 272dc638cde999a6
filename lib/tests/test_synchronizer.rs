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
use refmirror_lib::namespace::Namespace;
use refmirror_lib::object_id::CommitId;
use refmirror_lib::ref_service::{
    RefService, RefServiceError, RefUpdate, RefUpdateResult, RemoteRef,
};
use refmirror_lib::synchronizer::{
    create_remote_branch, delete_remote_branch, CreatedRef, DeleteOutcome, ParentRef, SyncError,
};
use testutils::TestRefService;

const REPO: &str = "mirror";

fn namespace() -> Namespace {
    Namespace {
        repository: REPO.to_owned(),
        prefix: "widgets".to_owned(),
    }
}

fn c1() -> CommitId {
    CommitId::from_hex("c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1")
}

fn c2() -> CommitId {
    CommitId::from_hex("c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2c2")
}

#[test]
fn test_create_from_mirrored_parent() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/main", &c1());

    let created = create_remote_branch(
        &service,
        &namespace(),
        "release/1.0",
        ParentRef::Mirrored("main"),
    )
    .unwrap();
    assert_eq!(
        created,
        CreatedRef {
            ref_name: "refs/heads/widgets/release/1.0".to_owned(),
            object_id: c1(),
        }
    );
    assert_eq!(
        service.updates(),
        vec![RefUpdate {
            name: "refs/heads/widgets/release/1.0".to_owned(),
            old_object_id: CommitId::zero(),
            new_object_id: c1(),
        }]
    );
    assert_eq!(
        service.get_ref(REPO, "refs/heads/widgets/release/1.0"),
        Some(c1())
    );
}

#[test]
fn test_create_twice_is_already_exists() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/main", &c1());
    let ns = namespace();

    create_remote_branch(&service, &ns, "topic", ParentRef::Mirrored("main")).unwrap();
    service.set_ref(REPO, "refs/heads/widgets/main", &c2());
    assert_matches!(
        create_remote_branch(&service, &ns, "topic", ParentRef::Mirrored("main")),
        Err(SyncError::AlreadyExists { ref_name, object_id })
            if ref_name == "refs/heads/widgets/topic" && object_id == c1()
    );
    // Nothing was overwritten.
    assert_eq!(service.updates().len(), 1);
    assert_eq!(service.get_ref(REPO, "refs/heads/widgets/topic"), Some(c1()));
}

#[test]
fn test_prefix_matches_are_not_exact_matches() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/main", &c1());
    service.set_ref(REPO, "refs/heads/widgets/topic-2", &c2());

    // "topic-2" is returned by the "heads/widgets/topic" filter but is a
    // different branch.
    let created =
        create_remote_branch(&service, &namespace(), "topic", ParentRef::Mirrored("main"))
            .unwrap();
    assert_eq!(created.object_id, c1());

    // Likewise, a parent is only found under its exact name.
    assert_matches!(
        create_remote_branch(&service, &namespace(), "other", ParentRef::Mirrored("topic-")),
        Err(SyncError::ParentMissingRemotely { parent, seen, .. }) => {
            assert_eq!(parent, "topic-");
            assert_eq!(seen, vec!["refs/heads/widgets/topic-2".to_owned()]);
        }
    );
}

#[test]
fn test_create_with_unmirrored_parent() {
    let service = TestRefService::new();
    // The remote root exists, but "develop" was never mirrored.
    service.set_ref(REPO, "refs/heads/main", &c1());
    assert_matches!(
        create_remote_branch(&service, &namespace(), "topic", ParentRef::Mirrored("develop")),
        Err(SyncError::ParentMissingRemotely { parent, ref_name, .. })
            if parent == "develop" && ref_name == "refs/heads/widgets/develop"
    );
    assert_eq!(service.updates(), vec![]);
}

#[test]
fn test_create_root_from_remote_root() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/main", &c2());

    let created =
        create_remote_branch(&service, &namespace(), "main", ParentRef::RemoteRoot("main"))
            .unwrap();
    assert_eq!(created.ref_name, "refs/heads/widgets/main");
    assert_eq!(created.object_id, c2());
    assert_eq!(service.get_ref(REPO, "refs/heads/widgets/main"), Some(c2()));
}

#[test]
fn test_create_root_without_remote_root() {
    let service = TestRefService::new();
    assert_matches!(
        create_remote_branch(&service, &namespace(), "main", ParentRef::RemoteRoot("main")),
        Err(SyncError::ParentMissingRemotely { ref_name, .. }) if ref_name == "refs/heads/main"
    );
}

#[test]
fn test_create_api_failure_keeps_body() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/main", &c1());
    service.fail_updates(
        403,
        r#"{"message":"TF401027: You need the Git 'CreateBranch' permission"}"#,
    );
    assert_matches!(
        create_remote_branch(&service, &namespace(), "topic", ParentRef::Mirrored("main")),
        Err(SyncError::ApiFailure { status: 403, body }) if body.contains("TF401027")
    );
}

#[test]
fn test_transport_failure_has_no_status() {
    let service = TestRefService::new();
    service.fail_lists(0, "connection refused");
    assert_matches!(
        delete_remote_branch(&service, &namespace(), "topic"),
        Err(SyncError::ApiFailure { status: 0, body }) if body.contains("connection refused")
    );
}

#[test]
fn test_delete() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/topic", &c2());
    service.set_ref(REPO, "refs/heads/widgets/topic-2", &c2());

    assert_eq!(
        delete_remote_branch(&service, &namespace(), "topic").unwrap(),
        DeleteOutcome::Deleted {
            ref_name: "refs/heads/widgets/topic".to_owned(),
            previous: c2(),
        }
    );
    assert_eq!(
        service.updates(),
        vec![RefUpdate {
            name: "refs/heads/widgets/topic".to_owned(),
            old_object_id: c2(),
            new_object_id: CommitId::zero(),
        }]
    );
    assert_eq!(
        service.ref_names(REPO),
        vec!["refs/heads/widgets/topic-2".to_owned()]
    );
}

#[test]
fn test_delete_twice_is_skipped() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/topic", &c2());
    let ns = namespace();

    assert_matches!(
        delete_remote_branch(&service, &ns, "topic"),
        Ok(DeleteOutcome::Deleted { .. })
    );
    assert_eq!(
        delete_remote_branch(&service, &ns, "topic").unwrap(),
        DeleteOutcome::NotFound {
            ref_name: "refs/heads/widgets/topic".to_owned()
        }
    );
    assert_eq!(service.updates().len(), 1);
}

#[test]
fn test_delete_not_persisted() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/topic", &c2());
    service.refuse_deletes();
    assert_matches!(
        delete_remote_branch(&service, &namespace(), "topic"),
        Err(SyncError::DeletionNotPersisted { ref_name, object_id })
            if ref_name == "refs/heads/widgets/topic" && object_id == c2()
    );
}

#[test]
fn test_delete_api_failure() {
    let service = TestRefService::new();
    service.set_ref(REPO, "refs/heads/widgets/topic", &c2());
    service.fail_updates(500, "internal error");
    assert_matches!(
        delete_remote_branch(&service, &namespace(), "topic"),
        Err(SyncError::ApiFailure { status: 500, .. })
    );
    assert_eq!(service.get_ref(REPO, "refs/heads/widgets/topic"), Some(c2()));
}

/// Lets another writer create the ref between the existence check and the
/// update.
struct RacingService {
    inner: TestRefService,
    winner: CommitId,
}

impl RefService for RacingService {
    fn list_refs(&self, repository: &str, filter: &str) -> Result<Vec<RemoteRef>, RefServiceError> {
        self.inner.list_refs(repository, filter)
    }

    fn update_refs(
        &self,
        repository: &str,
        updates: &[RefUpdate],
    ) -> Result<Vec<RefUpdateResult>, RefServiceError> {
        for update in updates {
            self.inner.set_ref(repository, &update.name, &self.winner);
        }
        self.inner.update_refs(repository, updates)
    }
}

#[test]
fn test_concurrent_create_is_rejected() {
    let service = RacingService {
        inner: TestRefService::new(),
        winner: c2(),
    };
    service.inner.set_ref(REPO, "refs/heads/widgets/main", &c1());
    assert_matches!(
        create_remote_branch(&service, &namespace(), "topic", ParentRef::Mirrored("main")),
        Err(SyncError::UpdateRejected { ref_name, update_status, .. })
            if ref_name == "refs/heads/widgets/topic" && update_status == "staleOldObjectId"
    );
    // The other writer's ref is untouched.
    assert_eq!(
        service.inner.get_ref(REPO, "refs/heads/widgets/topic"),
        Some(c2())
    );
}

/// Applies every update but loses the response, like a connection reset after
/// the service committed the request.
struct LostResponseService {
    inner: TestRefService,
}

impl RefService for LostResponseService {
    fn list_refs(&self, repository: &str, filter: &str) -> Result<Vec<RemoteRef>, RefServiceError> {
        self.inner.list_refs(repository, filter)
    }

    fn update_refs(
        &self,
        repository: &str,
        updates: &[RefUpdate],
    ) -> Result<Vec<RefUpdateResult>, RefServiceError> {
        self.inner.update_refs(repository, updates)?;
        Err(RefServiceError::Transport("connection reset".to_owned()))
    }
}

#[test]
fn test_create_applied_despite_lost_response() {
    let service = LostResponseService {
        inner: TestRefService::new(),
    };
    service.inner.set_ref(REPO, "refs/heads/widgets/main", &c1());
    let created =
        create_remote_branch(&service, &namespace(), "topic", ParentRef::Mirrored("main"));
    assert_eq!(
        created.unwrap(),
        CreatedRef {
            ref_name: "refs/heads/widgets/topic".to_owned(),
            object_id: c1(),
        }
    );
    assert_eq!(service.inner.updates().len(), 1);
}

#[test]
fn test_delete_applied_despite_lost_response() {
    let service = LostResponseService {
        inner: TestRefService::new(),
    };
    service.inner.set_ref(REPO, "refs/heads/widgets/topic", &c2());
    assert_eq!(
        delete_remote_branch(&service, &namespace(), "topic").unwrap(),
        DeleteOutcome::Deleted {
            ref_name: "refs/heads/widgets/topic".to_owned(),
            previous: c2(),
        }
    );
    assert_eq!(service.inner.get_ref(REPO, "refs/heads/widgets/topic"), None);
}

#[test]
fn test_lost_response_without_effect_is_reported() {
    let service = LostResponseService {
        inner: TestRefService::new(),
    };
    service.inner.set_ref(REPO, "refs/heads/widgets/topic", &c2());
    service.inner.refuse_deletes();
    assert_matches!(
        delete_remote_branch(&service, &namespace(), "topic"),
        Err(SyncError::ApiFailure { status: 0, body }) if body.contains("connection reset")
    );
    assert_eq!(service.inner.get_ref(REPO, "refs/heads/widgets/topic"), Some(c2()));
}
