//! Desktop notifications for pull request transitions.
//!
//! Uses notify-rust which supports:
//! - macOS: Native Notification Center
//! - Linux: D-Bus (freedesktop.org standard)
//! - Windows: Toast Notifications
//!
//! Delivery is best-effort. Sink failures are logged at debug level and never
//! reach the polling loop.

use crate::model::{PrIdentity, PullRequest};
use crate::transitions::{TransitionKind, Transitions};
use notify_rust::Notification as DesktopNotification;
use std::collections::HashSet;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("desktop notification failed: {0}")]
    Desktop(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub subtitle: String,
    pub body: String,
    pub link: String,
}

pub trait NotificationSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

impl<T: NotificationSink + ?Sized> NotificationSink for &T {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).notify(notification)
    }
}

/// OS notification center.
///
/// `show()` blocks on D-Bus or the platform notification API, so inside a
/// tokio runtime each notification is handed to the blocking pool and the
/// cycle moves on. Failures there are only logged.
pub struct DesktopSink;

fn desktop_notification(n: &Notification) -> DesktopNotification {
    let mut out = DesktopNotification::new();
    out.summary(&n.title)
        .body(&format!("{}\n{}\n{}", n.subtitle, truncate(&n.body, 120), n.link))
        .icon("dialog-information")
        .timeout(10_000);
    out
}

impl NotificationSink for DesktopSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        let notification = desktop_notification(n);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    if let Err(e) = notification.show() {
                        tracing::debug!(error = %e, "notification dropped");
                    }
                });
                Ok(())
            }
            Err(_) => notification
                .show()
                .map(|_| ())
                .map_err(|e| NotifyError::Desktop(e.to_string())),
        }
    }
}

/// Truncate a string to a maximum number of chars, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

fn pr_notification(prefix: &str, pr: &PullRequest) -> Notification {
    Notification {
        title: format!("{prefix}: #{}", pr.number()),
        subtitle: pr.author.clone(),
        body: pr.title.clone(),
        link: pr.url.clone(),
    }
}

/// Notifications for one group's transitions, one per transition instance.
pub fn notifications_for(
    transitions: &Transitions,
) -> Vec<(TransitionKind, &PrIdentity, Notification)> {
    let mut out = Vec::with_capacity(transitions.len());
    for pr in &transitions.new {
        out.push((TransitionKind::New, &pr.identity, pr_notification("🆕 New", pr)));
    }
    for pr in &transitions.newly_mergeable {
        out.push((
            TransitionKind::NewlyMergeable,
            &pr.identity,
            pr_notification("✅ Mergeable", pr),
        ));
    }
    for pr in &transitions.newly_failing {
        out.push((
            TransitionKind::NewlyFailing,
            &pr.identity,
            pr_notification("🚨 Failed", pr),
        ));
    }
    for t in &transitions.new_comments {
        let authors: Vec<&str> = t.comments.iter().map(|c| c.author.as_str()).collect();
        out.push((
            TransitionKind::NewComments,
            &t.pr.identity,
            Notification {
                title: format!("💬 New comment: #{}", t.pr.number()),
                subtitle: t.pr.repository.clone(),
                body: format!("{}\n{}", authors.join(", "), t.pr.title),
                link: t.pr.url.clone(),
            },
        ));
    }
    out
}

pub struct Dispatcher<N> {
    sink: N,
    enabled: bool,
    bell: bool,
}

impl<N: NotificationSink> Dispatcher<N> {
    pub fn new(sink: N, enabled: bool, bell: bool) -> Self {
        Self { sink, enabled, bell }
    }

    /// Fire every notification for one cycle. Returns how many were attempted.
    ///
    /// A PR that shows up with the same transition in more than one group is
    /// notified once.
    pub fn dispatch<'a, I>(&self, cycle: I) -> usize
    where
        I: IntoIterator<Item = &'a Transitions>,
    {
        if !self.enabled {
            return 0;
        }

        let mut sent: HashSet<(TransitionKind, PrIdentity)> = HashSet::new();
        let mut count = 0usize;
        for transitions in cycle {
            for (kind, identity, notification) in notifications_for(transitions) {
                if !sent.insert((kind, identity.clone())) {
                    continue;
                }
                count += 1;
                tracing::info!(kind = ?kind, pr = %identity, title = %notification.title, "notify");
                if let Err(e) = self.sink.notify(&notification) {
                    tracing::debug!(error = %e, "notification dropped");
                }
            }
        }

        if count > 0 && self.bell {
            ring_bell();
        }
        count
    }
}

fn ring_bell() {
    let mut out = std::io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}
