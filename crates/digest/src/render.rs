//! Deterministic digest rendering.
//!
//! Section order is fixed: events, tasks, risks, ideas, quotes.  A section
//! whose list is empty is omitted entirely; an all-empty result collapses
//! to a single "no new notes" line instead of bare headers.

use crate::model::{AnalysisResult, TaskItem};

fn push_section(lines: &mut Vec<String>, header: &str, items: &[String], prefix: &str) {
    if items.is_empty() {
        return;
    }
    lines.push(header.to_string());
    for item in items {
        lines.push(format!("{prefix}{item}"));
    }
}

fn task_line(task: &TaskItem) -> String {
    let title = if task.title.trim().is_empty() {
        "(untitled)"
    } else {
        task.title.trim()
    };
    let mut line = format!("- {title}");
    if let Some(due) = task.due.as_deref().filter(|due| !due.trim().is_empty()) {
        line.push_str(&format!(" — due: {due}"));
    }
    if let Some(owner) = task.owner.as_deref().filter(|owner| !owner.trim().is_empty()) {
        line.push_str(&format!(" (owner: {owner})"));
    }
    line.push_str(&format!(" [{}]", task.priority.as_str()));
    line
}

/// Render a structured analysis result.  Pure; identical input always
/// yields byte-identical output.
pub fn render(date_label: &str, author_label: &str, analysis: &AnalysisResult) -> String {
    if analysis.is_empty() {
        return format!("no new notes for {date_label}");
    }

    let mut lines = vec![format!("Daily digest for {date_label} ({author_label})")];
    push_section(&mut lines, "Events:", &analysis.events, "- ");
    if !analysis.tasks.is_empty() {
        lines.push("Tasks (next actions):".to_string());
        for task in &analysis.tasks {
            lines.push(task_line(task));
        }
    }
    push_section(&mut lines, "Risks/blockers:", &analysis.risks, "- ");
    push_section(&mut lines, "Ideas:", &analysis.ideas, "- ");
    push_section(&mut lines, "Quotes:", &analysis.quotes, "> ");
    lines.join("\n")
}

/// Raw rendering used whenever the analysis collaborator is unavailable:
/// the original note texts, bullet-joined, with no structured sections.
pub fn render_raw_fallback(date_label: &str, author_label: &str, texts: &[String]) -> String {
    let mut lines = vec![
        format!("Daily digest for {date_label} ({author_label})"),
        "Analysis is temporarily unavailable; raw notes below.".to_string(),
    ];
    for text in texts {
        lines.push(format!("- {text}"));
    }
    lines.join("\n")
}
