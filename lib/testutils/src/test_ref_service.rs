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

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use refmirror_lib::object_id::CommitId;
use refmirror_lib::ref_service::{
    RefService, RefServiceError, RefUpdate, RefUpdateResult, RemoteRef,
};

#[derive(Default)]
struct TestRefServiceData {
    repositories: HashMap<String, BTreeMap<String, CommitId>>,
    list_failure: Option<(u16, String)>,
    update_failure: Option<(u16, String)>,
    refuse_deletes: bool,
    updates: Vec<RefUpdate>,
}

/// A ref service for use in tests. It keeps refs in memory and applies
/// updates with the same compare-and-swap rule as the real service.
#[derive(Default)]
pub struct TestRefService {
    data: Mutex<TestRefServiceData>,
}

fn failure(status: u16, body: &str) -> RefServiceError {
    if status == 0 {
        RefServiceError::Transport(body.to_owned())
    } else {
        RefServiceError::Status {
            status,
            body: body.to_owned(),
        }
    }
}

impl TestRefService {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked_data(&self) -> MutexGuard<'_, TestRefServiceData> {
        self.data.lock().unwrap()
    }

    pub fn set_ref(&self, repository: &str, name: &str, target: &CommitId) {
        self.locked_data()
            .repositories
            .entry(repository.to_owned())
            .or_default()
            .insert(name.to_owned(), target.clone());
    }

    pub fn get_ref(&self, repository: &str, name: &str) -> Option<CommitId> {
        self.locked_data()
            .repositories
            .get(repository)
            .and_then(|refs| refs.get(name).cloned())
    }

    pub fn ref_names(&self, repository: &str) -> Vec<String> {
        self.locked_data()
            .repositories
            .get(repository)
            .map(|refs| refs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes every later list request fail. Status 0 simulates a transport
    /// error.
    pub fn fail_lists(&self, status: u16, body: &str) {
        self.locked_data().list_failure = Some((status, body.to_owned()));
    }

    /// Makes every later update request fail. Status 0 simulates a transport
    /// error.
    pub fn fail_updates(&self, status: u16, body: &str) {
        self.locked_data().update_failure = Some((status, body.to_owned()));
    }

    /// Reports deletions as successful without applying them, like a service
    /// whose token lacks the delete permission.
    pub fn refuse_deletes(&self) {
        self.locked_data().refuse_deletes = true;
    }

    /// Every update submitted so far, including rejected ones.
    pub fn updates(&self) -> Vec<RefUpdate> {
        self.locked_data().updates.clone()
    }
}

impl RefService for TestRefService {
    fn list_refs(&self, repository: &str, filter: &str) -> Result<Vec<RemoteRef>, RefServiceError> {
        let data = self.locked_data();
        if let Some((status, body)) = &data.list_failure {
            return Err(failure(*status, body));
        }
        let Some(refs) = data.repositories.get(repository) else {
            return Ok(vec![]);
        };
        Ok(refs
            .iter()
            .filter(|(name, _)| {
                name.strip_prefix("refs/")
                    .is_some_and(|short| short.starts_with(filter))
            })
            .map(|(name, id)| RemoteRef {
                name: name.clone(),
                object_id: id.clone(),
            })
            .collect())
    }

    fn update_refs(
        &self,
        repository: &str,
        updates: &[RefUpdate],
    ) -> Result<Vec<RefUpdateResult>, RefServiceError> {
        let mut data = self.locked_data();
        data.updates.extend(updates.iter().cloned());
        if let Some((status, body)) = &data.update_failure {
            return Err(failure(*status, body));
        }
        let refuse_deletes = data.refuse_deletes;
        let refs = data.repositories.entry(repository.to_owned()).or_default();
        let mut results = vec![];
        for update in updates {
            let current = refs.get(&update.name).cloned().unwrap_or_else(CommitId::zero);
            let success = current == update.old_object_id;
            if success {
                if !update.new_object_id.is_zero() {
                    refs.insert(update.name.clone(), update.new_object_id.clone());
                } else if !refuse_deletes {
                    refs.remove(&update.name);
                }
            }
            results.push(RefUpdateResult {
                name: update.name.clone(),
                success,
                update_status: if success {
                    "succeeded".to_owned()
                } else {
                    "staleOldObjectId".to_owned()
                },
                custom_message: None,
            });
        }
        Ok(results)
    }
}
