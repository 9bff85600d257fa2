//! The poll loop: fetch → normalize → detect → notify → render → wait.
//!
//! The loop is an explicit state machine driven by [`Phase`]. Every await point
//! also listens on the [`Control`] channel, so shutdown is reachable from every
//! phase, including while fetches are in flight. Resize and scroll requests are
//! only serviced in `Waiting`; ones that arrive mid-fetch are replayed once the
//! cycle has finished.

use crate::format::{Dashboard, Section};
use crate::github::{FetchError, PrSource};
use crate::model::{Group, PrIdentity, PullRequest, Target};
use crate::normalize::{LabelFilter, NormalizeError, normalize};
use crate::notify::{Dispatcher, NotificationSink};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::transitions::{Transitions, detect};
use crate::tui::Renderer;
use chrono::Local;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Rendering,
    Waiting,
    Shutdown,
}

/// Requests from the terminal and the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Resize,
    Scroll(i32),
    Refresh,
    Quit,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("fetching {target} ({group}) timed out after {}s", .after.as_secs_f64())]
    Timeout {
        target: String,
        group: &'static str,
        after: Duration,
    },

    #[error(transparent)]
    Malformed(#[from] NormalizeError),
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub targets: Vec<Target>,
    pub groups: Vec<Group>,
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub labels: LabelFilter,
}

impl PollSettings {
    /// Short repo names joined for the box title.
    pub fn title(&self) -> String {
        self.targets
            .iter()
            .map(|t| t.repo.as_str())
            .collect::<Vec<_>>()
            .join(" • ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub prs: usize,
    pub transitions: usize,
    pub notified: usize,
}

/// Fetch every (group, target) pair concurrently and normalize the results.
///
/// Resolves only once every fetch has finished. Any failure discards the whole
/// cycle so a snapshot never mixes fresh and missing targets.
async fn fetch_snapshots<S: PrSource>(
    source: &S,
    settings: &PollSettings,
) -> Result<Vec<(Group, Snapshot)>, CycleError> {
    let jobs = settings
        .groups
        .iter()
        .flat_map(|&group| settings.targets.iter().map(move |target| (group, target)));

    let results = join_all(jobs.map(|(group, target)| async move {
        match tokio::time::timeout(settings.fetch_timeout, source.fetch(target, group)).await {
            Ok(Ok(raw)) => Ok((group, raw)),
            Ok(Err(e)) => Err(CycleError::from(e)),
            Err(_) => Err(CycleError::Timeout {
                target: target.to_string(),
                group: group.as_str(),
                after: settings.fetch_timeout,
            }),
        }
    }))
    .await;

    let mut by_group: Vec<(Group, Vec<PullRequest>)> =
        settings.groups.iter().map(|&g| (g, Vec::new())).collect();
    let mut first_error: Option<CycleError> = None;

    for result in results {
        let (group, raws) = match result {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(error = %e, "fetch failed");
                first_error.get_or_insert(e);
                continue;
            }
        };
        let prs = raws.iter().map(normalize).collect::<Result<Vec<_>, _>>()?;
        let Some((_, slot)) = by_group.iter_mut().find(|(g, _)| *g == group) else {
            continue;
        };
        slot.extend(prs.into_iter().filter(|pr| {
            group != Group::RequestingReview || settings.labels.admits(pr)
        }));
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    // "Reviewed by you" only lists what the other groups do not already show.
    let shown: HashSet<PrIdentity> = by_group
        .iter()
        .filter(|(g, _)| *g != Group::Reviewed)
        .flat_map(|(_, prs)| prs.iter().map(|pr| pr.identity.clone()))
        .collect();
    if let Some((_, reviewed)) = by_group.iter_mut().find(|(g, _)| *g == Group::Reviewed) {
        reviewed.retain(|pr| !shown.contains(&pr.identity));
    }

    Ok(by_group
        .into_iter()
        .map(|(g, prs)| (g, Snapshot::new(prs)))
        .collect())
}

pub struct Scheduler<S, N, R> {
    settings: PollSettings,
    source: S,
    dispatcher: Dispatcher<N>,
    renderer: R,
    store: SnapshotStore,
    phase: Phase,
    updated_at: Option<chrono::DateTime<Local>>,
    notice: Option<String>,
    cycles: u64,
}

impl<S, N, R> Scheduler<S, N, R>
where
    S: PrSource,
    N: NotificationSink,
    R: Renderer,
{
    pub fn new(settings: PollSettings, source: S, dispatcher: Dispatcher<N>, renderer: R) -> Self {
        Self {
            settings,
            source,
            dispatcher,
            renderer,
            store: SnapshotStore::new(),
            phase: Phase::Idle,
            updated_at: None,
            notice: None,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Drive the loop until a quit request arrives or the control channel closes.
    pub async fn run(&mut self, controls: &mut mpsc::UnboundedReceiver<Control>) {
        let mut fetched: Option<Vec<(Group, Snapshot)>> = None;
        let mut deferred: Vec<Control> = Vec::new();

        loop {
            self.phase = match self.phase {
                Phase::Idle => {
                    if let Err(e) = self.renderer.show_notice("Loading pull requests…") {
                        tracing::debug!(error = %e, "initial draw failed");
                    }
                    Phase::Fetching
                }
                Phase::Fetching => match self.fetch(controls, &mut deferred).await {
                    None => Phase::Shutdown,
                    Some(Ok(snapshots)) => {
                        fetched = Some(snapshots);
                        Phase::Rendering
                    }
                    Some(Err(e)) => {
                        self.fail_cycle(&e);
                        Phase::Waiting
                    }
                },
                Phase::Rendering => {
                    if let Some(snapshots) = fetched.take() {
                        self.apply_cycle(snapshots);
                        deferred.retain(|c| !matches!(c, Control::Resize));
                    }
                    Phase::Waiting
                }
                Phase::Waiting => {
                    for control in std::mem::take(&mut deferred) {
                        self.on_view_control(control);
                    }
                    self.wait(controls).await
                }
                Phase::Shutdown => break,
            };
        }

        tracing::info!(cycles = self.cycles, "poller stopped");
    }

    /// `None` means shutdown was requested before the fetch finished.
    async fn fetch(
        &self,
        controls: &mut mpsc::UnboundedReceiver<Control>,
        deferred: &mut Vec<Control>,
    ) -> Option<Result<Vec<(Group, Snapshot)>, CycleError>> {
        let fetch = fetch_snapshots(&self.source, &self.settings);
        tokio::pin!(fetch);

        loop {
            tokio::select! {
                biased;
                result = &mut fetch => return Some(result),
                control = controls.recv() => match control {
                    Some(Control::Quit) | None => return None,
                    Some(Control::Refresh) => {}
                    Some(c @ (Control::Resize | Control::Scroll(_))) => deferred.push(c),
                },
            }
        }
    }

    async fn wait(&mut self, controls: &mut mpsc::UnboundedReceiver<Control>) -> Phase {
        let sleep = tokio::time::sleep(self.settings.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = &mut sleep => return Phase::Fetching,
                control = controls.recv() => match control {
                    Some(Control::Quit) | None => return Phase::Shutdown,
                    Some(Control::Refresh) => return Phase::Fetching,
                    Some(c) => self.on_view_control(c),
                },
            }
        }
    }

    fn on_view_control(&mut self, control: Control) {
        match control {
            Control::Resize => self.render_only(),
            Control::Scroll(delta) => {
                self.renderer.scroll(delta);
                self.render_only();
            }
            Control::Refresh | Control::Quit => {}
        }
    }

    fn apply_cycle(&mut self, snapshots: Vec<(Group, Snapshot)>) -> CycleReport {
        self.cycles += 1;

        let mut to_notify: Vec<Transitions> = Vec::new();
        let mut report = CycleReport::default();
        for (group, current) in &snapshots {
            report.prs += current.len();
            let transitions = detect(&self.store.previous(*group), current);
            report.transitions += transitions.len();
            // The first snapshot of a group is a baseline, not news.
            if self.store.is_primed(*group) {
                to_notify.push(transitions);
            }
        }
        report.notified = self.dispatcher.dispatch(&to_notify);

        self.store.replace_all(snapshots);
        self.updated_at = Some(Local::now());
        self.notice = None;
        self.render_only();

        tracing::info!(
            cycle = self.cycles,
            prs = report.prs,
            transitions = report.transitions,
            notified = report.notified,
            "cycle complete"
        );
        report
    }

    fn fail_cycle(&mut self, error: &CycleError) {
        tracing::warn!(error = %error, "refresh failed; keeping last known-good snapshot");
        let notice = format!("Refresh failed: {error}");
        if let Err(e) = self.renderer.show_notice(&notice) {
            tracing::debug!(error = %e, "failed to surface refresh error");
        }
        self.notice = Some(notice);
    }

    /// Redraw from the stored snapshots. No fetch, no detection.
    fn render_only(&mut self) {
        let dashboard = Dashboard {
            title: self.settings.title(),
            sections: self
                .settings
                .groups
                .iter()
                .map(|&group| Section {
                    group,
                    snapshot: self.store.previous(group),
                })
                .collect(),
            updated_at: self.updated_at,
            notice: self.notice.clone(),
        };
        if let Err(e) = self.renderer.render(&dashboard) {
            tracing::warn!(error = %e, "render failed");
        }
    }
}
