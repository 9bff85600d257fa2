use crate::model::{Group, Target};
use crate::normalize::{
    RawAuthor, RawCheck, RawCheckStatus, RawConclusion, RawLabel, RawMergeStateStatus,
    RawMergeable, RawPullRequest, RawRepository, RawReview, RawReviewDecision, RawReviewRequest,
};
use octocrab::Octocrab;
use thiserror::Error;

const PAGE_SIZE: i32 = 50;
const MAX_PAGES: usize = 4;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GitHub GraphQL query for {target} ({group}) failed: {source}")]
    Transport {
        target: String,
        group: &'static str,
        #[source]
        source: octocrab::Error,
    },

    #[error("GitHub returned errors for {target} ({group}): {message}")]
    Api {
        target: String,
        group: &'static str,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Where raw pull request records come from.
pub trait PrSource {
    async fn fetch(&self, target: &Target, group: Group) -> Result<Vec<RawPullRequest>, FetchError>;
}

impl<T: PrSource> PrSource for &T {
    async fn fetch(&self, target: &Target, group: Group) -> Result<Vec<RawPullRequest>, FetchError> {
        (**self).fetch(target, group).await
    }
}

#[derive(Debug, serde::Serialize)]
struct SearchVars {
    page_size: i32,
    cursor: Option<String>,
    search_query: String,
}

#[derive(Debug, serde::Serialize)]
struct GraphQlPayload<V> {
    query: &'static str,
    variables: V,
}

#[derive(Debug, serde::Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, serde::Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, serde::Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct SearchData {
    search: SearchResult,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResult {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    nodes: Option<Vec<SearchNode>>,
}

#[derive(Debug, serde::Deserialize)]
struct Nodes<T> {
    nodes: Option<Vec<Option<T>>>,
}

impl<T> Nodes<T> {
    fn into_vec(self) -> Vec<T> {
        self.nodes.unwrap_or_default().into_iter().flatten().collect()
    }
}

#[derive(Debug, serde::Deserialize)]
struct RequestedReviewerNode {
    #[serde(rename = "requestedReviewer")]
    requested_reviewer: Option<RequestedReviewer>,
}

#[derive(Debug, serde::Deserialize)]
struct RequestedReviewer {
    login: Option<String>, // User
    name: Option<String>,  // Team
}

#[derive(Debug, serde::Deserialize)]
struct CommitNode {
    commit: Option<CommitInner>,
}

#[derive(Debug, serde::Deserialize)]
struct CommitInner {
    #[serde(rename = "statusCheckRollup")]
    status_check_rollup: Option<StatusCheckRollup>,
}

#[derive(Debug, serde::Deserialize)]
struct StatusCheckRollup {
    contexts: Option<Nodes<StatusContextNode>>,
}

#[derive(Debug, serde::Deserialize)]
struct StatusContextNode {
    #[serde(rename = "__typename")]
    typename: Option<String>,
    // CheckRun
    name: Option<String>,
    status: Option<RawCheckStatus>,
    conclusion: Option<RawConclusion>,
    #[serde(rename = "detailsUrl")]
    details_url: Option<String>,
    // StatusContext
    context: Option<String>,
    state: Option<String>,
    #[serde(rename = "targetUrl")]
    target_url: Option<String>,
}

impl StatusContextNode {
    fn into_raw_check(self) -> Option<RawCheck> {
        match self.typename.as_deref() {
            Some("CheckRun") => Some(RawCheck {
                name: self.name,
                status: self.status,
                conclusion: self.conclusion,
                details_url: self.details_url,
            }),
            // Commit statuses only carry a combined state; split it into the
            // check-run status/conclusion pair.
            Some("StatusContext") => {
                let (status, conclusion) = match self.state.as_deref() {
                    Some("SUCCESS") => (RawCheckStatus::Completed, Some(RawConclusion::Success)),
                    Some("FAILURE") | Some("ERROR") => {
                        (RawCheckStatus::Completed, Some(RawConclusion::Failure))
                    }
                    Some("PENDING") | Some("EXPECTED") => (RawCheckStatus::InProgress, None),
                    _ => (RawCheckStatus::Other, None),
                };
                Some(RawCheck {
                    name: self.context,
                    status: Some(status),
                    conclusion,
                    details_url: self.target_url,
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNode {
    #[serde(rename = "__typename")]
    typename: Option<String>,
    number: Option<u64>,
    title: Option<String>,
    url: Option<String>,
    is_draft: Option<bool>,
    additions: Option<u64>,
    deletions: Option<u64>,
    author: Option<RawAuthor>,
    repository: Option<RawRepository>,
    head_repository: Option<RawRepository>,
    labels: Option<Nodes<RawLabel>>,
    reviews: Option<Nodes<RawReview>>,
    review_requests: Option<Nodes<RequestedReviewerNode>>,
    review_decision: Option<RawReviewDecision>,
    mergeable: Option<RawMergeable>,
    merge_state_status: Option<RawMergeStateStatus>,
    commits: Option<Nodes<CommitNode>>,
}

impl SearchNode {
    fn into_raw(self) -> Option<RawPullRequest> {
        if self.typename.as_deref()? != "PullRequest" {
            return None;
        }

        let status_check_rollup = self
            .commits
            .map(Nodes::into_vec)
            .unwrap_or_default()
            .into_iter()
            .last()
            .and_then(|c| c.commit)
            .and_then(|c| c.status_check_rollup)
            .and_then(|r| r.contexts)
            .map(Nodes::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter_map(StatusContextNode::into_raw_check)
            .collect();

        let review_requests = self
            .review_requests
            .map(Nodes::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(|n| RawReviewRequest {
                name: n.requested_reviewer.and_then(|r| r.login.or(r.name)),
            })
            .collect();

        Some(RawPullRequest {
            number: self.number,
            title: self.title,
            url: self.url,
            is_draft: self.is_draft.unwrap_or(false),
            author: self.author,
            repository: self.repository,
            head_repository: self.head_repository,
            labels: self.labels.map(Nodes::into_vec).unwrap_or_default(),
            additions: self.additions.unwrap_or(0),
            deletions: self.deletions.unwrap_or(0),
            status_check_rollup,
            review_decision: self.review_decision,
            reviews: self.reviews.map(Nodes::into_vec).unwrap_or_default(),
            review_requests,
            mergeable: self.mergeable,
            merge_state_status: self.merge_state_status,
        })
    }
}

const SEARCH_QUERY: &str = r#"
query($page_size: Int!, $cursor: String, $search_query: String!) {
  search(query: $search_query, type: ISSUE, first: $page_size, after: $cursor) {
    pageInfo { hasNextPage endCursor }
    nodes {
      __typename
      ... on PullRequest {
        number
        title
        url
        isDraft
        additions
        deletions
        reviewDecision
        mergeable
        mergeStateStatus
        author { login ... on User { name } }
        repository { id name }
        headRepository { id name }
        labels(first: 20) { nodes { name } }
        reviews(last: 100) {
          nodes { id state author { login } }
        }
        reviewRequests(first: 20) {
          nodes {
            requestedReviewer {
              __typename
              ... on User { login }
              ... on Team { name }
            }
          }
        }
        commits(last: 1) {
          nodes {
            commit {
              statusCheckRollup {
                contexts(first: 100) {
                  nodes {
                    __typename
                    ... on CheckRun {
                      name
                      status
                      conclusion
                      detailsUrl
                    }
                    ... on StatusContext {
                      context
                      state
                      targetUrl
                    }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

pub fn search_query(target: &Target, group: Group) -> String {
    let qualifiers = match group {
        Group::Mine => "author:@me",
        Group::RequestingReview => "review-requested:@me",
        Group::Reviewed => "reviewed-by:@me -author:@me",
    };
    format!("repo:{target} is:pr is:open {qualifiers} sort:created-desc")
}

/// GitHub GraphQL search, one query (plus pagination) per target and group.
#[derive(Clone)]
pub struct GitHubSource {
    octo: Octocrab,
}

impl GitHubSource {
    pub fn new(octo: Octocrab) -> Self {
        Self { octo }
    }
}

impl PrSource for GitHubSource {
    async fn fetch(&self, target: &Target, group: Group) -> Result<Vec<RawPullRequest>, FetchError> {
        let search_query = search_query(target, group);
        let mut out: Vec<RawPullRequest> = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let payload = GraphQlPayload {
                query: SEARCH_QUERY,
                variables: SearchVars {
                    page_size: PAGE_SIZE,
                    cursor: cursor.clone(),
                    search_query: search_query.clone(),
                },
            };
            let resp: GraphQlResponse<SearchData> =
                self.octo
                    .graphql(&payload)
                    .await
                    .map_err(|source| FetchError::Transport {
                        target: target.to_string(),
                        group: group.as_str(),
                        source,
                    })?;

            let data = match (resp.data, resp.errors) {
                (Some(data), None) => data,
                (_, Some(errors)) if !errors.is_empty() => {
                    let message = errors
                        .into_iter()
                        .map(|e| e.message)
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(FetchError::Api {
                        target: target.to_string(),
                        group: group.as_str(),
                        message,
                    });
                }
                (Some(data), Some(_)) => data,
                (None, _) => {
                    return Err(FetchError::Other(format!(
                        "GitHub returned no data for {target} ({})",
                        group.as_str()
                    )));
                }
            };

            if let Some(nodes) = data.search.nodes {
                out.extend(nodes.into_iter().filter_map(SearchNode::into_raw));
            }

            let pi = data.search.page_info;
            if !pi.has_next_page {
                break;
            }
            cursor = pi.end_cursor;
            if cursor.is_none() {
                break;
            }
        }

        tracing::debug!(repo = %target, group = group.as_str(), count = out.len(), "fetched");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CheckStatus;
    use crate::normalize::normalize;
    use serde_json::json;

    fn target() -> Target {
        Target::parse("acme/api").unwrap()
    }

    #[test]
    fn search_query_per_group() {
        assert_eq!(
            search_query(&target(), Group::Mine),
            "repo:acme/api is:pr is:open author:@me sort:created-desc"
        );
        assert!(search_query(&target(), Group::RequestingReview).contains("review-requested:@me"));
        assert!(search_query(&target(), Group::Reviewed).contains("reviewed-by:@me -author:@me"));
    }

    #[test]
    fn search_node_maps_to_raw_record() {
        let node: SearchNode = serde_json::from_value(json!({
            "__typename": "PullRequest",
            "number": 17,
            "title": "Retry on 503",
            "url": "https://github.com/acme/api/pull/17",
            "isDraft": true,
            "additions": 12,
            "deletions": 4,
            "reviewDecision": "REVIEW_REQUIRED",
            "mergeable": "MERGEABLE",
            "mergeStateStatus": "CLEAN",
            "author": { "login": "chen", "name": "Chen Li" },
            "repository": { "id": "R_api", "name": "api" },
            "headRepository": null,
            "labels": { "nodes": [{ "name": "backend" }] },
            "reviews": { "nodes": [
                { "id": "PRR_1", "state": "COMMENTED", "author": { "login": "mia" } }
            ] },
            "reviewRequests": { "nodes": [
                { "requestedReviewer": { "__typename": "Team", "name": "platform" } }
            ] },
            "commits": { "nodes": [{ "commit": { "statusCheckRollup": { "contexts": { "nodes": [
                { "__typename": "CheckRun", "name": "build", "status": "COMPLETED", "conclusion": "SUCCESS", "detailsUrl": "https://ci/1" },
                { "__typename": "StatusContext", "context": "ci/legacy", "state": "ERROR", "targetUrl": "https://ci/2" }
            ] } } } }] }
        }))
        .unwrap();

        let raw = node.into_raw().unwrap();
        assert_eq!(raw.review_requests.len(), 1);
        assert_eq!(raw.review_requests[0].name.as_deref(), Some("platform"));
        assert_eq!(raw.status_check_rollup.len(), 2);
        assert_eq!(
            raw.status_check_rollup[1].conclusion,
            Some(RawConclusion::Failure)
        );

        let pr = normalize(&raw).unwrap();
        assert_eq!(pr.check_status, CheckStatus::Failure);
        assert_eq!(pr.failing_checks[0].name, "ci/legacy");
        assert_eq!(pr.review_comments.len(), 1);
        assert!(pr.is_draft);
    }

    #[test]
    fn pending_status_context_is_in_progress() {
        let node: StatusContextNode = serde_json::from_value(json!({
            "__typename": "StatusContext", "context": "deploy", "state": "PENDING"
        }))
        .unwrap();
        let check = node.into_raw_check().unwrap();
        assert_eq!(check.status, Some(RawCheckStatus::InProgress));
        assert_eq!(check.conclusion, None);
    }

    #[test]
    fn non_pull_request_nodes_are_skipped() {
        let node: SearchNode = serde_json::from_value(json!({ "__typename": "Issue" })).unwrap();
        assert!(node.into_raw().is_none());
    }

    #[test]
    fn graphql_errors_deserialize_without_data() {
        let resp: GraphQlResponse<SearchData> = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "API rate limit exceeded" }]
        }))
        .unwrap();
        assert!(resp.data.is_none());
        assert_eq!(resp.errors.unwrap()[0].message, "API rate limit exceeded");
    }
}
