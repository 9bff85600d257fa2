//! Edge-triggered change detection between two snapshots of the same group.
//!
//! Only entities present in `current` can produce transitions. A pull request
//! that disappears (merged or closed) is dropped silently, and state changes in
//! the "bad" direction (mergeable to conflicting, failing to passing) are not
//! reported.

use crate::model::{CheckStatus, MergeStatus, PullRequest, ReviewComment};
use crate::snapshot::Snapshot;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    New,
    NewlyMergeable,
    NewlyFailing,
    NewComments,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentTransition {
    pub pr: PullRequest,
    /// `current.review_comments \ previous.review_comments`, by id.
    pub comments: Vec<ReviewComment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    pub new: Vec<PullRequest>,
    pub newly_mergeable: Vec<PullRequest>,
    pub newly_failing: Vec<PullRequest>,
    pub new_comments: Vec<CommentTransition>,
}

impl Transitions {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
            && self.newly_mergeable.is_empty()
            && self.newly_failing.is_empty()
            && self.new_comments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.newly_mergeable.len() + self.newly_failing.len() + self.new_comments.len()
    }
}

fn added_comments(previous: &PullRequest, current: &PullRequest) -> Vec<ReviewComment> {
    let seen: HashSet<&str> = previous
        .review_comments
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    current
        .review_comments
        .iter()
        .filter(|c| !seen.contains(c.id.as_str()))
        .cloned()
        .collect()
}

/// Compare two snapshots by identity. Pure; results follow `current` order.
pub fn detect(previous: &Snapshot, current: &Snapshot) -> Transitions {
    let by_identity = previous.index();
    let mut out = Transitions::default();

    for pr in current.prs() {
        let Some(old) = by_identity.get(&pr.identity) else {
            out.new.push(pr.clone());
            continue;
        };

        if old.merge_status != MergeStatus::Mergeable && pr.merge_status == MergeStatus::Mergeable {
            out.newly_mergeable.push(pr.clone());
        }

        if old.check_status != CheckStatus::Failure && pr.check_status == CheckStatus::Failure {
            out.newly_failing.push(pr.clone());
        }

        let comments = added_comments(old, pr);
        if !comments.is_empty() {
            out.new_comments.push(CommentTransition {
                pr: pr.clone(),
                comments,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::mk_pr;

    fn comment(id: &str, author: &str) -> ReviewComment {
        ReviewComment {
            id: id.to_string(),
            author: author.to_string(),
        }
    }

    fn numbers(prs: &[PullRequest]) -> Vec<u64> {
        prs.iter().map(|p| p.number()).collect()
    }

    fn sample() -> Snapshot {
        let mut a = mk_pr(1, "R_api");
        a.merge_status = MergeStatus::Mergeable;
        a.review_comments = vec![comment("c1", "chen")];
        let mut b = mk_pr(2, "R_api");
        b.check_status = CheckStatus::Failure;
        let c = mk_pr(1, "R_web");
        Snapshot::new(vec![a, b, c])
    }

    #[test]
    fn self_diff_is_empty() {
        let s = sample();
        assert!(detect(&s, &s).is_empty());
        assert!(detect(&Snapshot::empty(), &Snapshot::empty()).is_empty());
    }

    #[test]
    fn everything_is_new_against_empty_previous() {
        let s = sample();
        let t = detect(&Snapshot::empty(), &s);
        assert_eq!(numbers(&t.new), vec![1, 2, 1]);
        assert!(t.newly_mergeable.is_empty());
        assert!(t.newly_failing.is_empty());
        assert!(t.new_comments.is_empty());
    }

    #[test]
    fn matching_is_order_independent() {
        let prev = Snapshot::new(vec![mk_pr(1, "R_api"), mk_pr(2, "R_api"), mk_pr(3, "R_api")]);
        let mut failing = mk_pr(2, "R_api");
        failing.check_status = CheckStatus::Failure;
        let forward = Snapshot::new(vec![mk_pr(1, "R_api"), failing.clone(), mk_pr(4, "R_api")]);
        let reversed = Snapshot::new(vec![mk_pr(4, "R_api"), failing, mk_pr(1, "R_api")]);
        let prev_reversed = Snapshot::new(prev.prs().iter().rev().cloned().collect());

        let a = detect(&prev, &forward);
        let b = detect(&prev_reversed, &reversed);
        assert_eq!(numbers(&a.new), numbers(&b.new));
        assert_eq!(numbers(&a.newly_failing), numbers(&b.newly_failing));
        assert_eq!(numbers(&a.new), vec![4]);
        assert_eq!(numbers(&a.newly_failing), vec![2]);
    }

    #[test]
    fn identity_ignores_other_fields() {
        let prev = Snapshot::new(vec![mk_pr(7, "R_api")]);
        let mut renamed = mk_pr(7, "R_api");
        renamed.title = "Completely different".to_string();
        renamed.author = "someone-else".to_string();
        renamed.url = "https://example.com/other".to_string();
        assert!(detect(&prev, &Snapshot::new(vec![renamed])).is_empty());
    }

    #[test]
    fn same_number_other_repo_is_new() {
        let prev = Snapshot::new(vec![mk_pr(7, "R_api")]);
        let t = detect(&prev, &Snapshot::new(vec![mk_pr(7, "R_web")]));
        assert_eq!(t.new.len(), 1);
        assert_eq!(t.new[0].identity.repository_id, "R_web");
    }

    #[test]
    fn newly_mergeable_fires_only_on_the_edge() {
        let with = |status: MergeStatus| {
            let mut pr = mk_pr(5, "R_api");
            pr.merge_status = status;
            Snapshot::new(vec![pr])
        };
        let cycles = [
            with(MergeStatus::Mergeable),
            with(MergeStatus::Conflicting),
            with(MergeStatus::Mergeable),
            with(MergeStatus::Mergeable),
        ];

        let fired: usize = cycles
            .windows(2)
            .map(|w| detect(&w[0], &w[1]).newly_mergeable.len())
            .sum();
        assert_eq!(fired, 1);
    }

    #[test]
    fn no_transition_for_regressions_or_recoveries() {
        let mut prev_pr = mk_pr(3, "R_api");
        prev_pr.merge_status = MergeStatus::Mergeable;
        prev_pr.check_status = CheckStatus::Failure;
        let mut cur_pr = mk_pr(3, "R_api");
        cur_pr.merge_status = MergeStatus::Conflicting;
        cur_pr.check_status = CheckStatus::Successful;

        let t = detect(&Snapshot::new(vec![prev_pr]), &Snapshot::new(vec![cur_pr]));
        assert!(t.is_empty());
    }

    #[test]
    fn pending_to_failure_is_newly_failing() {
        let mut prev_pr = mk_pr(42, "R_api");
        prev_pr.check_status = CheckStatus::Pending;
        let mut cur_pr = mk_pr(42, "R_api");
        cur_pr.check_status = CheckStatus::Failure;

        let t = detect(&Snapshot::new(vec![prev_pr]), &Snapshot::new(vec![cur_pr]));
        assert_eq!(numbers(&t.newly_failing), vec![42]);
        assert!(t.new.is_empty());
        assert!(t.newly_mergeable.is_empty());
        assert!(t.new_comments.is_empty());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn new_comments_are_the_exact_set_difference() {
        let mut prev_pr = mk_pr(9, "R_api");
        prev_pr.review_comments = vec![comment("c1", "chen"), comment("c2", "mia")];
        let mut cur_pr = mk_pr(9, "R_api");
        cur_pr.review_comments = vec![
            comment("c2", "mia"),
            comment("c3", "noah"),
            comment("c1", "chen"),
            comment("c4", "jules"),
            comment("c5", "noah"),
        ];

        let t = detect(&Snapshot::new(vec![prev_pr]), &Snapshot::new(vec![cur_pr]));
        assert_eq!(t.new_comments.len(), 1);
        let ids: Vec<&str> = t.new_comments[0]
            .comments
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c3", "c4", "c5"]);
    }

    #[test]
    fn comments_on_unmatched_prs_are_not_reported() {
        let mut cur_pr = mk_pr(9, "R_api");
        cur_pr.review_comments = vec![comment("c1", "chen")];
        let t = detect(&Snapshot::empty(), &Snapshot::new(vec![cur_pr]));
        assert_eq!(t.new.len(), 1);
        assert!(t.new_comments.is_empty());
    }

    #[test]
    fn removed_comments_are_not_reported() {
        let mut prev_pr = mk_pr(9, "R_api");
        prev_pr.review_comments = vec![comment("c1", "chen")];
        let t = detect(&Snapshot::new(vec![prev_pr]), &Snapshot::new(vec![mk_pr(9, "R_api")]));
        assert!(t.is_empty());
    }

    #[test]
    fn disappeared_prs_produce_nothing() {
        let prev = Snapshot::new(vec![mk_pr(1, "R_api"), mk_pr(2, "R_api")]);
        let cur = Snapshot::new(vec![mk_pr(1, "R_api")]);
        assert!(detect(&prev, &cur).is_empty());
    }

    #[test]
    fn failing_at_introduction_is_only_new() {
        let mut pr = mk_pr(11, "R_api");
        pr.check_status = CheckStatus::Failure;
        pr.merge_status = MergeStatus::Mergeable;
        let t = detect(&Snapshot::new(vec![mk_pr(1, "R_api")]), &Snapshot::new(vec![pr]));
        assert_eq!(numbers(&t.new), vec![11]);
        assert!(t.newly_failing.is_empty());
        assert!(t.newly_mergeable.is_empty());
    }
}
