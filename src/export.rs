use chrono::{DateTime, SecondsFormat, Utc};

use crate::summarizer::DetailedSummary;
use crate::utils::format::with_thousands_separator;

const WIDE_RULE_WIDTH: usize = 60;
const SECTION_RULE_WIDTH: usize = 40;

pub fn export_file_name(document_name: &str) -> String {
    format!("{document_name}_summary.txt")
}

/// Renders a stored summary as the plain-text report offered for download.
pub fn render_summary_report(
    summary: &DetailedSummary,
    file_name: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let wide_rule = "=".repeat(WIDE_RULE_WIDTH);
    let mut lines: Vec<String> = Vec::new();

    lines.push(wide_rule.clone());
    lines.push(format!("AI Summary Report: {file_name}"));
    lines.push(format!(
        "Generated at: {}",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    lines.push(wide_rule.clone());
    lines.push(String::new());

    push_heading(&mut lines, "Overview");
    lines.push(summary.overview.clone());
    lines.push(String::new());

    if !summary.key_points.is_empty() {
        push_heading(&mut lines, "Key Points");
        for (index, point) in summary.key_points.iter().enumerate() {
            lines.push(format!("{}. {point}", index + 1));
        }
        lines.push(String::new());
    }

    if !summary.sections.is_empty() {
        push_heading(&mut lines, "Sections");
        for (index, section) in summary.sections.iter().enumerate() {
            lines.push(format!("[{}] {}", index + 1, section.title));
            lines.push(format!("Importance: {}", section.importance.label()));
            if let Some(page) = section.page.filter(|page| *page > 0) {
                lines.push(format!("Page: {page}"));
            }
            lines.push(String::new());
            lines.push(section.content.clone());
            lines.push(String::new());
        }
    }

    if !summary.topics.is_empty() {
        push_heading(&mut lines, "Topics");
        lines.push(summary.topics.join(", "));
        lines.push(String::new());
    }

    push_heading(&mut lines, "Statistics");
    lines.push(format!(
        "Characters: approx. {}",
        with_thousands_separator(summary.word_count)
    ));
    if let Some(pages) = summary.page_count.filter(|pages| *pages > 0) {
        lines.push(format!("Pages: {pages}"));
    }
    lines.push(format!("Difficulty: {}", summary.difficulty.label()));
    lines.push(String::new());

    lines.push(wide_rule.clone());
    lines.push("This report was generated automatically by AI".to_string());
    lines.push(wide_rule);

    lines.join("\n")
}

fn push_heading(lines: &mut Vec<String>, title: &str) {
    lines.push(format!("■ {title}"));
    lines.push("-".repeat(SECTION_RULE_WIDTH));
}
