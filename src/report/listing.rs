use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::cache::CacheEntry;
use crate::constants::{
    DEFAULT_STATUS, LISTING_NAME_WIDTH, LISTING_TYPE_WIDTH, LISTING_USER_WIDTH, RULE_WIDTH,
};

/// Entries grouped by course, sorted by assignment name then username
pub fn render_entry_listing(entries: &[CacheEntry]) -> String {
    if entries.is_empty() {
        return "No submissions in the cache.\n".to_string();
    }

    let mut by_course: BTreeMap<i64, Vec<&CacheEntry>> = BTreeMap::new();
    for entry in entries {
        by_course.entry(entry.course_id).or_default().push(entry);
    }

    let mut out = String::new();
    let _ = writeln!(out, "{} ({} total)", "Cached submissions".bold(), entries.len());

    for (course_id, mut course_entries) in by_course {
        course_entries.sort_by(|a, b| {
            (&a.assignment_name, &a.student_username).cmp(&(&b.assignment_name, &b.student_username))
        });

        let _ = writeln!(out, "\nCourse {}", course_id);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        for entry in course_entries {
            let _ = writeln!(out, "{}", listing_line(entry));
        }
    }

    out
}

fn listing_line(entry: &CacheEntry) -> String {
    let marker = if entry.status == DEFAULT_STATUS { "✓" } else { "⚠" };
    let name: String = entry.assignment_name.chars().take(LISTING_NAME_WIDTH).collect();

    format!(
        "  {} [{:type_w$}] {:name_w$} | {:user_w$} | {}",
        marker,
        entry.assignment_type.as_str(),
        name,
        entry.display_username(),
        entry.last_updated_at.format("%Y-%m-%dT%H:%M:%S"),
        type_w = LISTING_TYPE_WIDTH,
        name_w = LISTING_NAME_WIDTH,
        user_w = LISTING_USER_WIDTH,
    )
}
