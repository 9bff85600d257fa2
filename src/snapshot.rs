use crate::model::{Group, PrIdentity, PullRequest};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One fetch cycle's pull requests for one group, in fetch order.
///
/// Identities are unique. Cloning is cheap and a snapshot is never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    prs: Arc<[PullRequest]>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            prs: Arc::from(Vec::new()),
        }
    }
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot, keeping the first occurrence of any repeated identity.
    pub fn new(prs: Vec<PullRequest>) -> Self {
        let mut seen: HashSet<PrIdentity> = HashSet::with_capacity(prs.len());
        let mut out = Vec::with_capacity(prs.len());
        for pr in prs {
            if !seen.insert(pr.identity.clone()) {
                tracing::debug!(identity = %pr.identity, "dropping duplicate pull request");
                continue;
            }
            out.push(pr);
        }
        Self { prs: out.into() }
    }

    pub fn prs(&self) -> &[PullRequest] {
        &self.prs
    }

    pub fn len(&self) -> usize {
        self.prs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prs.is_empty()
    }

    pub fn index(&self) -> HashMap<&PrIdentity, &PullRequest> {
        self.prs.iter().map(|p| (&p.identity, p)).collect()
    }

    /// True when both snapshots share the same allocation.
    #[cfg(test)]
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.prs, &other.prs)
    }
}

/// Last known-good snapshot per group. The scheduler is the only writer.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    groups: HashMap<Group, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last stored snapshot for `group`, or the empty snapshot.
    pub fn previous(&self, group: Group) -> Snapshot {
        self.groups.get(&group).cloned().unwrap_or_else(Snapshot::empty)
    }

    /// Whether `group` has been filled by at least one successful cycle.
    pub fn is_primed(&self, group: Group) -> bool {
        self.groups.contains_key(&group)
    }

    pub fn replace(&mut self, group: Group, snapshot: Snapshot) {
        self.groups.insert(group, snapshot);
    }

    /// Swap in every group of a completed cycle at once.
    pub fn replace_all<I>(&mut self, snapshots: I)
    where
        I: IntoIterator<Item = (Group, Snapshot)>,
    {
        let next: HashMap<Group, Snapshot> = snapshots.into_iter().collect();
        for (group, snapshot) in next {
            self.replace(group, snapshot);
        }
    }
}
