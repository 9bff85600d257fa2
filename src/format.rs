//! Turns a [`Dashboard`] into styled ratatui lines. No terminal access here.

use crate::model::{CheckStatus, Group, MergeStatus, PullRequest, ReviewDecision};
use crate::snapshot::Snapshot;
use chrono::{DateTime, Local};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const INDENT: &str = "  ";

/// Everything one frame shows.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub title: String,
    pub sections: Vec<Section>,
    pub updated_at: Option<DateTime<Local>>,
    pub notice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub group: Group,
    pub snapshot: Snapshot,
}

pub fn truncate_ellipsis(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }

    let mut out = String::new();
    let mut w = 0usize;
    for ch in s.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        // Leave one column for the ellipsis.
        if w + cw + 1 > max_width {
            break;
        }
        out.push(ch);
        w += cw;
    }
    out.push('…');
    out
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn fg(color: Color) -> Style {
    Style::default().fg(color)
}

fn check_span(pr: &PullRequest) -> Option<Span<'static>> {
    match pr.check_status {
        CheckStatus::Successful => Some(Span::styled("✓ Checks passing", fg(Color::Green))),
        CheckStatus::Pending => Some(Span::styled("- Checks pending", fg(Color::Yellow))),
        CheckStatus::Failure => Some(Span::styled(
            format!(
                "× {}/{} checks failing",
                pr.failing_checks.len(),
                pr.total_checks
            ),
            fg(Color::Red),
        )),
        CheckStatus::None => None,
    }
}

fn review_span(pr: &PullRequest) -> Option<Span<'static>> {
    match pr.review_decision {
        ReviewDecision::Approved => Some(Span::styled(
            format!("Approved ({})", pr.approved_count.max(1)),
            fg(Color::Green),
        )),
        ReviewDecision::ChangesRequested => Some(Span::styled(
            "Changes requested",
            fg(Color::Red),
        )),
        ReviewDecision::ReviewRequired => {
            Some(Span::styled("Review required", fg(Color::Yellow)))
        }
        ReviewDecision::None => match pr.requested_reviewers.as_slice() {
            [] => None,
            [one] => Some(Span::styled(
                format!("Review requested ({one})"),
                fg(Color::Yellow),
            )),
            many => Some(Span::styled(
                format!("Review requested ({})", many.len()),
                fg(Color::Yellow),
            )),
        },
    }
}

fn comments_span(pr: &PullRequest) -> Option<Span<'static>> {
    match pr.review_comments.len() {
        0 => None,
        1 => Some(Span::styled("1 Comment", fg(Color::Cyan))),
        n => Some(Span::styled(format!("{n} Comments"), fg(Color::Cyan))),
    }
}

fn merge_span(pr: &PullRequest) -> Option<Span<'static>> {
    match pr.merge_status {
        MergeStatus::Mergeable => Some(Span::styled("↢ Mergeable", fg(Color::Green))),
        MergeStatus::Conflicting => Some(Span::styled("× Conflicts", fg(Color::Red))),
        MergeStatus::Unknown => None,
    }
}

/// Lines for one pull request: title row, meta row, status row, failing checks.
pub fn pr_lines(pr: &PullRequest, width: usize) -> Vec<Line<'static>> {
    let number = format!("#{}", pr.number());
    let number_style = if pr.is_draft { dim() } else { fg(Color::Green) };
    let diff = format!("[+{} -{}]", pr.additions, pr.deletions);

    // "  #N title [+a -d]"
    let fixed = INDENT.len() + UnicodeWidthStr::width(number.as_str()) + 1 + 1 + diff.len();
    let title = truncate_ellipsis(&pr.title, width.saturating_sub(fixed).max(8));

    let mut lines = vec![Line::from(vec![
        Span::raw(INDENT),
        Span::styled(number, number_style),
        Span::raw(" "),
        Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(format!("[+{}", pr.additions), fg(Color::Green)),
        Span::raw(" "),
        Span::styled(format!("-{}]", pr.deletions), fg(Color::Red)),
    ])];

    let mut meta = vec![
        Span::raw(INDENT.repeat(2)),
        Span::styled(pr.author.clone(), fg(Color::Blue)),
        Span::raw(" "),
        Span::styled(format!("[{}]", pr.repository), dim()),
    ];
    if pr.is_draft {
        meta.push(Span::styled(" draft", dim()));
    }
    for label in &pr.labels {
        meta.push(Span::raw(" "));
        meta.push(Span::styled(label.clone(), fg(Color::Magenta)));
    }
    lines.push(Line::from(meta));

    let parts: Vec<Span<'static>> = [
        check_span(pr),
        comments_span(pr),
        review_span(pr),
        merge_span(pr),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !parts.is_empty() {
        let mut status = vec![Span::raw(INDENT.repeat(2))];
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                status.push(Span::styled(" - ", dim()));
            }
            status.push(part);
        }
        lines.push(Line::from(status));
    }

    // "      name url"; the url only appears when at least 8 columns remain.
    for check in &pr.failing_checks {
        let room = width.saturating_sub(6).max(8);
        let name = truncate_ellipsis(&check.name, room);
        let left = room.saturating_sub(UnicodeWidthStr::width(name.as_str()) + 1);
        let mut row = vec![
            Span::raw(INDENT.repeat(3)),
            Span::styled(name, fg(Color::LightRed)),
        ];
        if let Some(url) = check.url.as_deref().filter(|_| left >= 8) {
            row.push(Span::raw(" "));
            row.push(Span::styled(truncate_ellipsis(url, left), dim()));
        }
        lines.push(Line::from(row));
    }

    lines
}

pub fn section_lines(section: &Section, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        format!("{}:", section.group.label()),
        Style::default().add_modifier(Modifier::BOLD),
    ))];

    if section.snapshot.is_empty() {
        lines.push(Line::from(vec![
            Span::raw(INDENT),
            Span::styled(section.group.empty_text(), dim()),
        ]));
        return lines;
    }

    for pr in section.snapshot.prs() {
        lines.extend(pr_lines(pr, width));
    }
    lines
}

pub fn footer_lines(updated_at: Option<DateTime<Local>>, notice: Option<&str>) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if let Some(at) = updated_at {
        lines.push(Line::from(Span::styled(
            format!("Last updated: {}", at.format("%Y-%m-%d %H:%M:%S")),
            dim(),
        )));
    }
    if let Some(notice) = notice {
        lines.push(notice_line(notice));
    }
    lines
}

pub fn notice_line(notice: &str) -> Line<'static> {
    Line::from(Span::styled(
        notice.to_string(),
        fg(Color::Red).add_modifier(Modifier::BOLD),
    ))
}

/// The full body of the box: every section, blank-line separated, then the footer.
pub fn dashboard_lines(dashboard: &Dashboard, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for section in &dashboard.sections {
        lines.extend(section_lines(section, width));
        lines.push(Line::default());
    }
    lines.extend(footer_lines(dashboard.updated_at, dashboard.notice.as_deref()));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FailingCheck;
    use crate::snapshot::tests::mk_pr;
    use chrono::TimeZone;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn texts(lines: &[Line]) -> Vec<String> {
        lines.iter().map(text).collect()
    }

    #[test]
    fn test_truncate_ellipsis() {
        assert_eq!(truncate_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_ellipsis("hello world", 6), "hello…");
        assert_eq!(truncate_ellipsis("hello", 0), "");
        assert_eq!(truncate_ellipsis("日本語テキスト", 5), "日本…");
    }

    #[test]
    fn empty_group_shows_placeholder() {
        let section = Section {
            group: Group::Mine,
            snapshot: Snapshot::empty(),
        };
        assert_eq!(
            texts(&section_lines(&section, 80)),
            vec!["Created by you:", "  No PRs created by you"]
        );
    }

    #[test]
    fn plain_pr_has_title_and_meta_rows() {
        let mut pr = mk_pr(12, "R_api");
        pr.additions = 30;
        pr.deletions = 4;
        let lines = texts(&pr_lines(&pr, 80));
        assert_eq!(lines, vec!["  #12 PR 12 [+30 -4]", "    anika [api]"]);
    }

    #[test]
    fn failing_pr_lists_checks() {
        let mut pr = mk_pr(7, "R_api");
        pr.check_status = CheckStatus::Failure;
        pr.total_checks = 3;
        pr.failing_checks = vec![FailingCheck {
            name: "lint".to_string(),
            url: None,
        }];
        pr.merge_status = MergeStatus::Conflicting;
        pr.review_decision = ReviewDecision::ReviewRequired;

        let lines = texts(&pr_lines(&pr, 80));
        assert_eq!(
            lines[2],
            "    × 1/3 checks failing - Review required - × Conflicts"
        );
        assert_eq!(lines[3], "      lint");
    }

    #[test]
    fn failing_check_row_shows_details_url_when_it_fits() {
        let mut pr = mk_pr(7, "R_api");
        pr.check_status = CheckStatus::Failure;
        pr.total_checks = 1;
        pr.failing_checks = vec![FailingCheck {
            name: "lint".to_string(),
            url: Some("https://ci.example/runs/42".to_string()),
        }];

        let wide = texts(&pr_lines(&pr, 80));
        assert_eq!(wide[3], "      lint https://ci.example/runs/42");

        let narrow = texts(&pr_lines(&pr, 24));
        assert_eq!(narrow[3], "      lint https://ci.e…");

        let cramped = texts(&pr_lines(&pr, 16));
        assert_eq!(cramped[3], "      lint");
    }

    #[test]
    fn pending_review_request_names_a_single_reviewer() {
        let mut pr = mk_pr(7, "R_api");
        pr.requested_reviewers = vec!["chen".to_string()];
        assert_eq!(texts(&pr_lines(&pr, 80))[2], "    Review requested (chen)");

        pr.requested_reviewers.push("platform".to_string());
        assert_eq!(texts(&pr_lines(&pr, 80))[2], "    Review requested (2)");

        pr.review_decision = ReviewDecision::Approved;
        pr.approved_count = 1;
        assert_eq!(texts(&pr_lines(&pr, 80))[2], "    Approved (1)");
    }

    #[test]
    fn comment_count_pluralizes() {
        let mut pr = mk_pr(7, "R_api");
        pr.check_status = CheckStatus::Successful;
        pr.merge_status = MergeStatus::Mergeable;
        pr.review_comments = vec![crate::model::ReviewComment {
            id: "c1".to_string(),
            author: "chen".to_string(),
        }];
        let one = texts(&pr_lines(&pr, 80));
        assert_eq!(one[2], "    ✓ Checks passing - 1 Comment - ↢ Mergeable");

        pr.review_comments.push(crate::model::ReviewComment {
            id: "c2".to_string(),
            author: "mia".to_string(),
        });
        let two = texts(&pr_lines(&pr, 80));
        assert!(two[2].contains("2 Comments"));
    }

    #[test]
    fn long_titles_are_truncated_to_width() {
        let mut pr = mk_pr(1, "R_api");
        pr.title = "x".repeat(200);
        let first = text(&pr_lines(&pr, 40)[0]);
        assert!(UnicodeWidthStr::width(first.as_str()) <= 40);
        assert!(first.contains('…'));
    }

    #[test]
    fn footer_shows_timestamp_and_notice() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let lines = texts(&footer_lines(Some(at), Some("Refresh failed: boom")));
        assert_eq!(
            lines,
            vec!["Last updated: 2024-03-09 14:05:07", "Refresh failed: boom"]
        );
        assert!(footer_lines(None, None).is_empty());
    }

    #[test]
    fn dashboard_separates_sections() {
        let d = Dashboard {
            title: "api".to_string(),
            sections: vec![
                Section {
                    group: Group::Mine,
                    snapshot: Snapshot::new(vec![mk_pr(1, "R_api")]),
                },
                Section {
                    group: Group::RequestingReview,
                    snapshot: Snapshot::empty(),
                },
            ],
            updated_at: None,
            notice: None,
        };
        let lines = texts(&dashboard_lines(&d, 80));
        assert_eq!(lines[0], "Created by you:");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "Requesting a code review from you:");
    }
}
