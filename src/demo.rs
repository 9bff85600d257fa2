//! Fake GitHub for `--demo`: a fixed cast of pull requests that evolve one
//! stage per poll cycle, so every kind of transition shows up within a few
//! refreshes without a token.

use crate::github::{FetchError, PrSource};
use crate::model::{Group, Target};
use crate::normalize::{
    RawAuthor, RawCheck, RawCheckStatus, RawConclusion, RawLabel, RawMergeStateStatus,
    RawMergeable, RawPullRequest, RawRepository, RawReview, RawReviewDecision, RawReviewRequest,
    RawReviewState,
};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy)]
enum CiScript {
    Green,
    Red,
    /// Pending until the given stage, then failing.
    RedAt(u64),
    /// Pending until the given stage, then passing.
    GreenAt(u64),
    NoCi,
}

#[derive(Clone, Copy)]
enum MergeScript {
    Clean,
    Dirty,
    /// Conflicting until the given stage, then mergeable.
    CleanAt(u64),
    Blocked,
}

struct DemoPrSpec {
    group: Group,
    /// Index into the configured targets, modulo their count.
    slot: usize,
    number: u64,
    author: (&'static str, &'static str),
    title: &'static str,
    labels: &'static [&'static str],
    additions: u64,
    deletions: u64,
    draft: bool,
    ci: CiScript,
    merge: MergeScript,
    decision: Option<RawReviewDecision>,
    /// (stage the comment appears, reviewer login)
    comments: &'static [(u64, &'static str)],
    appears_at: u64,
    gone_at: Option<u64>,
}

const SPECS: &[DemoPrSpec] = &[
    DemoPrSpec {
        group: Group::Mine,
        slot: 0,
        number: 842,
        author: ("anika", "Anika Rao"),
        title: "Fix idempotency for retries on charge capture",
        labels: &["backend"],
        additions: 214,
        deletions: 37,
        draft: false,
        ci: CiScript::GreenAt(1),
        merge: MergeScript::CleanAt(2),
        decision: Some(RawReviewDecision::ReviewRequired),
        comments: &[(0, "chen"), (3, "mia")],
        appears_at: 0,
        gone_at: None,
    },
    DemoPrSpec {
        group: Group::Mine,
        slot: 1,
        number: 1932,
        author: ("anika", "Anika Rao"),
        title: "Add keyboard navigation to project switcher",
        labels: &["frontend", "a11y"],
        additions: 388,
        deletions: 91,
        draft: false,
        ci: CiScript::RedAt(2),
        merge: MergeScript::Clean,
        decision: Some(RawReviewDecision::Approved),
        comments: &[],
        appears_at: 0,
        gone_at: None,
    },
    DemoPrSpec {
        group: Group::Mine,
        slot: 0,
        number: 851,
        author: ("anika", "Anika Rao"),
        title: "Bump Postgres to 16.2 and tune autovacuum thresholds",
        labels: &["infra"],
        additions: 12,
        deletions: 8,
        draft: true,
        ci: CiScript::NoCi,
        merge: MergeScript::Blocked,
        decision: None,
        comments: &[],
        appears_at: 1,
        gone_at: None,
    },
    DemoPrSpec {
        group: Group::RequestingReview,
        slot: 0,
        number: 836,
        author: ("santiago", "Santiago Ruiz"),
        title: "Rate limit /v1/events and emit structured logs",
        labels: &["backend"],
        additions: 96,
        deletions: 14,
        draft: false,
        ci: CiScript::Green,
        merge: MergeScript::Clean,
        decision: Some(RawReviewDecision::ReviewRequired),
        comments: &[(2, "jules")],
        appears_at: 0,
        gone_at: Some(4),
    },
    DemoPrSpec {
        group: Group::RequestingReview,
        slot: 1,
        number: 1940,
        author: ("sofia", "Sofia Marin"),
        title: "Fix flaky onboarding test on CI runners",
        labels: &["frontend", "tests"],
        additions: 41,
        deletions: 40,
        draft: false,
        ci: CiScript::Red,
        merge: MergeScript::Dirty,
        decision: Some(RawReviewDecision::ReviewRequired),
        comments: &[],
        appears_at: 0,
        gone_at: None,
    },
    DemoPrSpec {
        group: Group::RequestingReview,
        slot: 2,
        number: 77,
        author: ("devin", "Devin Park"),
        title: "Add tail-sampling defaults for high-cardinality traces",
        labels: &["observability"],
        additions: 152,
        deletions: 3,
        draft: false,
        ci: CiScript::GreenAt(3),
        merge: MergeScript::CleanAt(3),
        decision: None,
        comments: &[],
        appears_at: 2,
        gone_at: None,
    },
    DemoPrSpec {
        group: Group::Reviewed,
        slot: 1,
        number: 1911,
        author: ("mia", "Mia Chen"),
        title: "Button: add loading state and improve focus ring",
        labels: &["frontend"],
        additions: 73,
        deletions: 22,
        draft: false,
        ci: CiScript::Green,
        merge: MergeScript::Clean,
        decision: Some(RawReviewDecision::ChangesRequested),
        comments: &[(0, "anika"), (1, "noah")],
        appears_at: 0,
        gone_at: None,
    },
    DemoPrSpec {
        group: Group::Reviewed,
        slot: 2,
        number: 64,
        author: ("noah", "Noah Okafor"),
        title: "Docs: clarify OAuth scopes and add troubleshooting",
        labels: &["docs"],
        additions: 58,
        deletions: 19,
        draft: false,
        ci: CiScript::NoCi,
        merge: MergeScript::CleanAt(1),
        decision: Some(RawReviewDecision::Approved),
        comments: &[],
        appears_at: 0,
        gone_at: None,
    },
];

fn fnv1a_64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn actions_url(target: &Target, run_id: u64) -> String {
    format!(
        "https://github.com/{}/{}/actions/runs/{run_id}",
        target.owner, target.repo
    )
}

fn check(target: &Target, name: &str, conclusion: Option<RawConclusion>, run_id: u64) -> RawCheck {
    RawCheck {
        name: Some(name.to_string()),
        status: Some(if conclusion.is_some() {
            RawCheckStatus::Completed
        } else {
            RawCheckStatus::InProgress
        }),
        conclusion,
        details_url: Some(actions_url(target, run_id)),
    }
}

fn checks_for(script: CiScript, stage: u64, target: &Target, salt: u64) -> Vec<RawCheck> {
    use RawConclusion::{Failure, Success};

    let base_run = 8_100_000u64 + (salt % 900_000);
    let pending = |names: &[&str]| {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| check(target, n, None, base_run + i as u64))
            .collect::<Vec<_>>()
    };
    let green = || {
        vec![
            check(target, "build / linux", Some(Success), base_run),
            check(target, "test / unit", Some(Success), base_run + 1),
            check(target, "lint", Some(Success), base_run + 2),
        ]
    };
    let red = || {
        vec![
            check(target, "build / linux", Some(Success), base_run),
            check(target, "test / unit", Some(Failure), base_run + 1),
            check(target, "lint", Some(Success), base_run + 2),
            check(target, "e2e / chrome", Some(Failure), base_run + 3),
        ]
    };

    match script {
        CiScript::Green => green(),
        CiScript::Red => red(),
        CiScript::RedAt(at) if stage >= at => red(),
        CiScript::GreenAt(at) if stage >= at => green(),
        CiScript::RedAt(_) | CiScript::GreenAt(_) => {
            pending(&["build / linux", "test / unit", "lint"])
        }
        CiScript::NoCi => Vec::new(),
    }
}

fn merge_for(script: MergeScript, stage: u64) -> (RawMergeable, RawMergeStateStatus) {
    match script {
        MergeScript::Clean => (RawMergeable::Mergeable, RawMergeStateStatus::Clean),
        MergeScript::CleanAt(at) if stage >= at => {
            (RawMergeable::Mergeable, RawMergeStateStatus::Clean)
        }
        MergeScript::Dirty | MergeScript::CleanAt(_) => {
            (RawMergeable::Conflicting, RawMergeStateStatus::Dirty)
        }
        MergeScript::Blocked => (RawMergeable::Mergeable, RawMergeStateStatus::Blocked),
    }
}

fn login(name: &str) -> RawAuthor {
    RawAuthor {
        login: Some(name.to_string()),
        name: None,
    }
}

fn record(entry: &DemoPrSpec, target: &Target, stage: u64) -> RawPullRequest {
    let key = format!("{target}#{}", entry.number);
    let salt = fnv1a_64(&key);
    let (mergeable, merge_state) = merge_for(entry.merge, stage);

    let mut reviews: Vec<RawReview> = entry
        .comments
        .iter()
        .filter(|(at, _)| stage >= *at)
        .enumerate()
        .map(|(i, (_, who))| RawReview {
            id: Some(format!("PRR_{:x}_{i}", salt & 0xffff_ffff)),
            author: Some(login(who)),
            state: Some(RawReviewState::Commented),
        })
        .collect();
    if entry.decision == Some(RawReviewDecision::Approved) {
        reviews.push(RawReview {
            id: Some(format!("PRR_{:x}_ok", salt & 0xffff_ffff)),
            author: Some(login("jules")),
            state: Some(RawReviewState::Approved),
        });
    }

    RawPullRequest {
        number: Some(entry.number),
        title: Some(entry.title.to_string()),
        url: Some(format!(
            "https://github.com/{}/{}/pull/{}",
            target.owner, target.repo, entry.number
        )),
        is_draft: entry.draft,
        author: Some(RawAuthor {
            login: Some(entry.author.0.to_string()),
            name: Some(entry.author.1.to_string()),
        }),
        repository: Some(RawRepository {
            id: Some(format!("R_{:012x}", fnv1a_64(&target.to_string()) >> 16)),
            name: Some(target.repo.clone()),
        }),
        head_repository: None,
        labels: entry
            .labels
            .iter()
            .map(|l| RawLabel {
                name: l.to_string(),
            })
            .collect(),
        additions: entry.additions,
        deletions: entry.deletions,
        status_check_rollup: checks_for(entry.ci, stage, target, salt),
        review_decision: entry.decision,
        reviews,
        review_requests: if entry.decision.is_none() {
            vec![RawReviewRequest {
                name: Some("anika".to_string()),
            }]
        } else {
            Vec::new()
        },
        mergeable: Some(mergeable),
        merge_state_status: Some(merge_state),
    }
}

/// Scripted source; advances one stage every `fetches_per_cycle` calls.
pub struct DemoSource {
    targets: Vec<Target>,
    fetches_per_cycle: u64,
    fetches: AtomicU64,
}

impl DemoSource {
    pub fn new(targets: Vec<Target>, groups: usize) -> Self {
        let fetches_per_cycle = (targets.len() * groups).max(1) as u64;
        Self {
            targets,
            fetches_per_cycle,
            fetches: AtomicU64::new(0),
        }
    }

    fn slot_of(&self, target: &Target) -> Option<usize> {
        self.targets.iter().position(|t| t == target)
    }

    pub fn records(&self, target: &Target, group: Group, stage: u64) -> Vec<RawPullRequest> {
        let Some(slot) = self.slot_of(target) else {
            return Vec::new();
        };
        let n = self.targets.len();
        SPECS
            .iter()
            .filter(|s| s.group == group && s.slot % n == slot)
            .filter(|s| stage >= s.appears_at && s.gone_at.is_none_or(|g| stage < g))
            .map(|s| record(s, target, stage))
            .collect()
    }
}

impl PrSource for DemoSource {
    async fn fetch(&self, target: &Target, group: Group) -> Result<Vec<RawPullRequest>, FetchError> {
        let n = self.fetches.fetch_add(1, Ordering::Relaxed);
        let stage = n / self.fetches_per_cycle;
        tracing::debug!(repo = %target, group = group.as_str(), stage, "demo fetch");
        Ok(self.records(target, group, stage))
    }
}
