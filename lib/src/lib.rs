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

//! Mirrors branch creation and deletion from a Git repository into Azure
//! Repos, preserving branch ancestry.
//!
//! The pieces, leaf first:
//!
//! - [`ref_graph`]: read-only view of local branches and commit ancestry.
//! - [`mirror_ledger`]: one tag per branch that was mirrored successfully.
//! - [`resolver`]: picks the parent branch a new remote branch starts from.
//! - [`synchronizer`]: creates and deletes remote refs with optimistic
//!   concurrency.
//! - [`orchestrator`]: runs one event through all of the above.

#![warn(missing_docs)]
#![deny(unused_must_use)]
#![forbid(unsafe_code)]

pub mod azure;
pub mod mirror_ledger;
pub mod namespace;
pub mod object_id;
pub mod orchestrator;
pub mod ref_graph;
pub mod ref_service;
pub mod resolver;
pub mod settings;
pub mod synchronizer;
