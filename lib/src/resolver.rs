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

//! Decides which remote branch a newly created branch is created from.
//!
//! Rules, first match wins:
//!
//! 1. Deletions need no parent.
//! 2. The root branch needs no parent; it is seeded from the remote
//!    service's own root.
//! 3. A non-empty explicit base (e.g. the base of a pull request) is used
//!    verbatim.
//! 4. Otherwise the mirror tags are searched. A tag at exactly the branch head
//!    beats a tag at a strict ancestor of it. Within the winning group the
//!    root branch is preferred, then the lexically first branch name.
//!
//! With no mirror tags at all the root branch is used if it exists. Anything
//! else is [`ResolveError::ParentNotFound`]; the resolver never guesses.

use std::fmt;

use itertools::Itertools as _;
use thiserror::Error;

use crate::mirror_ledger::MirrorTag;
use crate::object_id::CommitId;
use crate::orchestrator::EventKind;
use crate::ref_graph::{BranchHeads, RefGraphError};

/// What the resolver is asked about.
#[derive(Clone, Copy, Debug)]
pub struct ResolveRequest<'a> {
    /// Branch the event is about.
    pub branch: &'a str,
    /// Create or delete.
    pub kind: EventKind,
    /// Base supplied by the triggering context, if any.
    pub explicit_base: Option<&'a str>,
}

/// Outcome of a successful resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Create the remote branch from this branch's remote counterpart.
    Parent(String),
    /// No parent is required.
    NoneNeeded,
}

/// Which rule produced the resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionRule {
    /// Deletion events have no parent.
    DeleteEvent,
    /// The root branch is created from the remote root.
    RootBranch,
    /// The triggering context named the base.
    ExplicitBase,
    /// A mirror tag points at the branch head.
    SameCommit,
    /// A mirror tag points at an ancestor of the branch head.
    Ancestor,
    /// No mirror tags exist, the root branch was used.
    RootFallback,
}

/// Why a mirror tag was or was not usable as parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CandidateVerdict {
    /// Tag is at the branch head.
    SameCommit,
    /// Tag is at a strict ancestor of the branch head.
    Ancestor,
    /// Tag is unrelated to, or a descendant of, the branch head.
    NotAncestor,
    /// Tag points at a commit the local repository doesn't have.
    Missing,
}

impl CandidateVerdict {
    fn is_usable(&self) -> bool {
        matches!(self, CandidateVerdict::SameCommit | CandidateVerdict::Ancestor)
    }
}

impl fmt::Display for CandidateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CandidateVerdict::SameCommit => "tag is at the branch head",
            CandidateVerdict::Ancestor => "tag is at an ancestor of the branch head",
            CandidateVerdict::NotAncestor => "tag is not an ancestor of the branch head",
            CandidateVerdict::Missing => "tagged commit is not in the local repository",
        };
        f.write_str(text)
    }
}

/// One mirror tag the ancestry search looked at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateReport {
    /// Branch owning the mirror tag.
    pub branch: String,
    /// Commit the tag points at.
    pub commit: CommitId,
    /// Whether it qualified.
    pub verdict: CandidateVerdict,
}

/// Record of how a resolution was reached, for operator diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionTrace {
    /// Head of the branch, if the ancestry search ran.
    pub head: Option<CommitId>,
    /// Candidates in enumeration (lexical) order.
    pub candidates: Vec<CandidateReport>,
}

impl ResolutionTrace {
    /// Renders one line per candidate, e.g. `main (0123456789ab): tag is at
    /// an ancestor of the branch head`.
    pub fn candidate_lines(&self) -> Vec<String> {
        self.candidates
            .iter()
            .map(|candidate| {
                format!(
                    "{} ({}): {}",
                    candidate.branch,
                    candidate.commit.short_hex(),
                    candidate.verdict
                )
            })
            .collect()
    }
}

/// Successful resolution together with how it was reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// The decision.
    pub resolution: Resolution,
    /// The rule that made it.
    pub rule: ResolutionRule,
    /// Candidates considered, empty unless the ancestry search ran.
    pub trace: ResolutionTrace,
}

impl Resolved {
    fn without_search(resolution: Resolution, rule: ResolutionRule) -> Self {
        Resolved {
            resolution,
            rule,
            trace: ResolutionTrace::default(),
        }
    }

    /// Parent branch name, if one is needed.
    pub fn parent(&self) -> Option<&str> {
        match &self.resolution {
            Resolution::Parent(name) => Some(name),
            Resolution::NoneNeeded => None,
        }
    }
}

/// Errors from [`resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No mirror tag qualifies and no fallback applies.
    #[error("Could not determine the parent of branch '{branch}'")]
    ParentNotFound {
        /// Branch being resolved.
        branch: String,
        /// Every candidate considered and why it was rejected.
        trace: ResolutionTrace,
    },
    /// Reading the local repository failed.
    #[error(transparent)]
    RefGraph(#[from] RefGraphError),
}

/// Computes the parent branch for `request`.
///
/// `mirror_tags` may be in any order; candidates are enumerated by branch
/// name so the result only depends on the set of tags and the ref graph.
pub fn resolve(
    request: &ResolveRequest<'_>,
    root_branch: &str,
    graph: &dyn BranchHeads,
    mirror_tags: &[MirrorTag],
) -> Result<Resolved, ResolveError> {
    if request.kind == EventKind::Delete {
        return Ok(Resolved::without_search(
            Resolution::NoneNeeded,
            ResolutionRule::DeleteEvent,
        ));
    }
    if request.branch == root_branch {
        return Ok(Resolved::without_search(
            Resolution::NoneNeeded,
            ResolutionRule::RootBranch,
        ));
    }
    if let Some(base) = request.explicit_base.filter(|base| !base.trim().is_empty()) {
        return Ok(Resolved::without_search(
            Resolution::Parent(base.to_owned()),
            ResolutionRule::ExplicitBase,
        ));
    }

    let head = graph.head_of(request.branch)?;
    let candidates = mirror_tags
        .iter()
        .filter(|tag| tag.branch != request.branch)
        .sorted_by(|a, b| a.branch.cmp(&b.branch))
        .collect_vec();
    tracing::debug!(
        branch = request.branch,
        head = %head.short_hex(),
        candidates = candidates.len(),
        "searching mirror tags for parent"
    );

    if candidates.is_empty() {
        if graph.has_branch(root_branch)? {
            return Ok(Resolved {
                resolution: Resolution::Parent(root_branch.to_owned()),
                rule: ResolutionRule::RootFallback,
                trace: ResolutionTrace {
                    head: Some(head),
                    candidates: vec![],
                },
            });
        }
        return Err(ResolveError::ParentNotFound {
            branch: request.branch.to_owned(),
            trace: ResolutionTrace {
                head: Some(head),
                candidates: vec![],
            },
        });
    }

    let mut reports = Vec::with_capacity(candidates.len());
    for tag in candidates {
        let verdict = classify(graph, &tag.commit, &head)?;
        reports.push(CandidateReport {
            branch: tag.branch.clone(),
            commit: tag.commit.clone(),
            verdict,
        });
    }

    let selected = select(&reports, &CandidateVerdict::SameCommit, root_branch)
        .map(|name| (name.to_owned(), ResolutionRule::SameCommit))
        .or_else(|| {
            select(&reports, &CandidateVerdict::Ancestor, root_branch)
                .map(|name| (name.to_owned(), ResolutionRule::Ancestor))
        });
    let trace = ResolutionTrace {
        head: Some(head),
        candidates: reports,
    };
    match selected {
        Some((name, rule)) => {
            tracing::debug!(branch = request.branch, parent = %name, ?rule, "resolved parent");
            Ok(Resolved {
                resolution: Resolution::Parent(name),
                rule,
                trace,
            })
        }
        None => Err(ResolveError::ParentNotFound {
            branch: request.branch.to_owned(),
            trace,
        }),
    }
}

fn classify(
    graph: &dyn BranchHeads,
    tagged: &CommitId,
    head: &CommitId,
) -> Result<CandidateVerdict, RefGraphError> {
    if tagged == head {
        return Ok(CandidateVerdict::SameCommit);
    }
    match graph.is_ancestor(tagged, head) {
        Ok(true) => Ok(CandidateVerdict::Ancestor),
        Ok(false) => Ok(CandidateVerdict::NotAncestor),
        Err(RefGraphError::CommitNotFound(_)) => Ok(CandidateVerdict::Missing),
        Err(err) => Err(err),
    }
}

/// Picks the root branch if it is in the group, otherwise the first member.
/// `reports` must be in enumeration order.
fn select<'a>(
    reports: &'a [CandidateReport],
    group: &CandidateVerdict,
    root_branch: &str,
) -> Option<&'a str> {
    debug_assert!(group.is_usable());
    let mut members = reports.iter().filter(|report| report.verdict == *group);
    let first = members.next()?;
    if first.branch == root_branch {
        return Some(&first.branch);
    }
    let root = members.find(|report| report.branch == root_branch);
    Some(&root.unwrap_or(first).branch)
}
