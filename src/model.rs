use std::fmt;

/// Cross-snapshot identity of a pull request: its number within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrIdentity {
    pub number: u64,
    pub repository_id: String,
}

impl fmt::Display for PrIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repository_id, self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Successful,
    Pending,
    Failure,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    Mergeable,
    Conflicting,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approved,
    ReviewRequired,
    ChangesRequested,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub id: String,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailingCheck {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub identity: PrIdentity,
    pub repository: String, // short repo name, display only
    pub title: String,
    pub url: String,
    pub author: String,
    pub is_draft: bool,
    pub labels: Vec<String>,
    pub additions: u64,
    pub deletions: u64,

    pub check_status: CheckStatus,
    pub failing_checks: Vec<FailingCheck>,
    pub total_checks: usize,
    pub merge_status: MergeStatus,

    pub review_decision: ReviewDecision,
    /// Users or teams with a pending review request.
    pub requested_reviewers: Vec<String>,
    pub approved_count: usize,
    pub requested_changes_count: usize,
    /// Unique by id, in upstream order.
    pub review_comments: Vec<ReviewComment>,
}

impl PullRequest {
    pub fn number(&self) -> u64 {
        self.identity.number
    }
}

/// Logical sections of the dashboard. Each has its own snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    Mine,
    RequestingReview,
    Reviewed,
}

impl Group {
    pub fn label(&self) -> &'static str {
        match self {
            Group::Mine => "Created by you",
            Group::RequestingReview => "Requesting a code review from you",
            Group::Reviewed => "Reviewed by you",
        }
    }

    pub fn empty_text(&self) -> &'static str {
        match self {
            Group::Mine => "No PRs created by you",
            Group::RequestingReview => "No PRs requesting review from you",
            Group::Reviewed => "No PRs reviewed by you",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Mine => "mine",
            Group::RequestingReview => "review-requested",
            Group::Reviewed => "reviewed",
        }
    }
}

/// A repository to poll, `OWNER/REPO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub owner: String,
    pub repo: String,
}

impl Target {
    pub fn parse(s: &str) -> Option<Target> {
        let (owner, repo) = s.trim().split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Target {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parse_accepts_owner_repo() {
        let t = Target::parse(" acme/api ").unwrap();
        assert_eq!(t.owner, "acme");
        assert_eq!(t.repo, "api");
        assert_eq!(t.to_string(), "acme/api");
    }

    #[test]
    fn target_parse_rejects_malformed() {
        assert!(Target::parse("acme").is_none());
        assert!(Target::parse("/api").is_none());
        assert!(Target::parse("acme/").is_none());
        assert!(Target::parse("acme/api/extra").is_none());
    }
}
