//! Raw pull request records as returned upstream, and their mapping into the
//! canonical [`PullRequest`].
//!
//! The raw shape follows the field names of `gh pr list --json`. Only identity
//! and display fields are required; everything else defaults to empty.

use crate::model::{
    CheckStatus, FailingCheck, MergeStatus, PrIdentity, PullRequest, ReviewComment, ReviewDecision,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("malformed pull request record{}: missing `{field}`", at(.number))]
    MalformedRecord {
        field: &'static str,
        number: Option<u64>,
    },
}

fn at(number: &Option<u64>) -> String {
    number.map(|n| format!(" #{n}")).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawCheckStatus {
    Completed,
    InProgress,
    Queued,
    Pending,
    Waiting,
    Requested,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawConclusion {
    Success,
    Failure,
    Neutral,
    Skipped,
    Cancelled,
    TimedOut,
    ActionRequired,
    StartupFailure,
    Stale,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawMergeable {
    Mergeable,
    Conflicting,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawMergeStateStatus {
    Clean,
    Dirty,
    Blocked,
    Behind,
    Draft,
    HasHooks,
    Unstable,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawReviewDecision {
    Approved,
    ReviewRequired,
    ChangesRequested,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCheck {
    pub name: Option<String>,
    pub status: Option<RawCheckStatus>,
    pub conclusion: Option<RawConclusion>,
    pub details_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAuthor {
    pub login: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRepository {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReview {
    pub id: Option<String>,
    pub author: Option<RawAuthor>,
    pub state: Option<RawReviewState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReviewRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPullRequest {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub is_draft: bool,
    pub author: Option<RawAuthor>,
    pub repository: Option<RawRepository>,
    pub head_repository: Option<RawRepository>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub status_check_rollup: Vec<RawCheck>,
    pub review_decision: Option<RawReviewDecision>,
    #[serde(default)]
    pub reviews: Vec<RawReview>,
    #[serde(default)]
    pub review_requests: Vec<RawReviewRequest>,
    pub mergeable: Option<RawMergeable>,
    pub merge_state_status: Option<RawMergeStateStatus>,
}

pub fn check_status(checks: &[RawCheck]) -> CheckStatus {
    // No checks configured is "nothing to report", not a vacuous pass.
    if checks.is_empty() {
        return CheckStatus::None;
    }

    let all_passing = checks.iter().all(|c| {
        c.status == Some(RawCheckStatus::Completed)
            && matches!(
                c.conclusion,
                Some(RawConclusion::Success) | Some(RawConclusion::Neutral)
            )
    });
    if all_passing {
        return CheckStatus::Successful;
    }

    // Pending wins over failure.
    if checks
        .iter()
        .any(|c| c.status == Some(RawCheckStatus::InProgress))
    {
        return CheckStatus::Pending;
    }

    if checks
        .iter()
        .any(|c| c.conclusion == Some(RawConclusion::Failure))
    {
        return CheckStatus::Failure;
    }

    CheckStatus::None
}

pub fn merge_status(
    mergeable: Option<RawMergeable>,
    state: Option<RawMergeStateStatus>,
) -> MergeStatus {
    match (mergeable, state) {
        (Some(RawMergeable::Mergeable), Some(RawMergeStateStatus::Clean)) => MergeStatus::Mergeable,
        (Some(RawMergeable::Conflicting), Some(RawMergeStateStatus::Dirty)) => {
            MergeStatus::Conflicting
        }
        _ => MergeStatus::Unknown,
    }
}

fn review_decision(raw: Option<RawReviewDecision>) -> ReviewDecision {
    match raw {
        Some(RawReviewDecision::Approved) => ReviewDecision::Approved,
        Some(RawReviewDecision::ReviewRequired) => ReviewDecision::ReviewRequired,
        Some(RawReviewDecision::ChangesRequested) => ReviewDecision::ChangesRequested,
        Some(RawReviewDecision::Other) | None => ReviewDecision::None,
    }
}

fn review_comments(number: u64, reviews: &[RawReview]) -> Vec<ReviewComment> {
    let mut out: Vec<ReviewComment> = Vec::new();
    for r in reviews {
        if r.state != Some(RawReviewState::Commented) {
            continue;
        }
        // Reviews without an upstream id cannot be tracked across cycles.
        let Some(id) = r.id.as_deref() else {
            tracing::debug!(number, "skipping comment review without id");
            continue;
        };
        if out.iter().any(|c| c.id == id) {
            continue;
        }
        let author = r
            .author
            .as_ref()
            .and_then(|a| a.login.clone())
            .unwrap_or_else(|| "ghost".to_string());
        out.push(ReviewComment {
            id: id.to_string(),
            author,
        });
    }
    out
}

fn count_reviews(reviews: &[RawReview], state: RawReviewState) -> usize {
    reviews.iter().filter(|r| r.state == Some(state)).count()
}

fn failing_checks(checks: &[RawCheck]) -> Vec<FailingCheck> {
    checks
        .iter()
        .filter(|c| c.conclusion == Some(RawConclusion::Failure))
        .map(|c| FailingCheck {
            name: c.name.clone().unwrap_or_else(|| "check".to_string()),
            url: c.details_url.clone(),
        })
        .collect()
}

/// Map a raw record into the canonical entity.
///
/// The repository identity comes from the base repository, falling back to the
/// head repository for shapes that only carry the latter.
pub fn normalize(raw: &RawPullRequest) -> Result<PullRequest, NormalizeError> {
    let malformed = |field: &'static str| NormalizeError::MalformedRecord {
        field,
        number: raw.number,
    };

    let number = raw.number.ok_or_else(|| malformed("number"))?;
    let title = raw.title.clone().ok_or_else(|| malformed("title"))?;
    let url = raw.url.clone().ok_or_else(|| malformed("url"))?;

    let repo = raw
        .repository
        .as_ref()
        .filter(|r| r.id.is_some())
        .or(raw.head_repository.as_ref().filter(|r| r.id.is_some()))
        .ok_or_else(|| malformed("repository"))?;
    let repository_id = repo.id.clone().ok_or_else(|| malformed("repository.id"))?;
    let repository = repo.name.clone().unwrap_or_else(|| repository_id.clone());

    let author = raw
        .author
        .as_ref()
        .and_then(|a| {
            a.name
                .clone()
                .filter(|n| !n.is_empty())
                .or_else(|| a.login.clone())
        })
        .ok_or_else(|| malformed("author"))?;

    let decision = review_decision(raw.review_decision);

    Ok(PullRequest {
        identity: PrIdentity {
            number,
            repository_id,
        },
        repository,
        title,
        url,
        author,
        is_draft: raw.is_draft,
        labels: raw.labels.iter().map(|l| l.name.clone()).collect(),
        additions: raw.additions,
        deletions: raw.deletions,
        check_status: check_status(&raw.status_check_rollup),
        failing_checks: failing_checks(&raw.status_check_rollup),
        total_checks: raw.status_check_rollup.len(),
        merge_status: merge_status(raw.mergeable, raw.merge_state_status),
        review_decision: decision,
        requested_reviewers: raw
            .review_requests
            .iter()
            .map(|r| r.name.clone().unwrap_or_else(|| "ghost".to_string()))
            .collect(),
        approved_count: count_reviews(&raw.reviews, RawReviewState::Approved),
        requested_changes_count: count_reviews(&raw.reviews, RawReviewState::ChangesRequested),
        review_comments: review_comments(number, &raw.reviews),
    })
}

/// Optional label allow-list for the review-requested group.
#[derive(Debug, Clone, Default)]
pub struct LabelFilter {
    labels: Vec<String>, // lowercased
}

impl LabelFilter {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        Self { labels }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn admits(&self, pr: &PullRequest) -> bool {
        if self.labels.is_empty() {
            return true;
        }
        pr.labels
            .iter()
            .any(|l| self.labels.contains(&l.to_lowercase()))
    }
}
