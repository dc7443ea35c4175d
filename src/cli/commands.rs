use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::{
    app::{init_config, Config},
    cache::{canonical_form, fingerprint, EntryFilter, SubmissionCache, SubmissionKey},
    report::{render_entry_listing, QuizReport},
};

use super::Commands;

/// Handle CLI subcommands
pub fn handle_command(command: &Commands, cache: &SubmissionCache, config: &Config) -> Result<()> {
    match command {
        Commands::Init => {
            let path = init_config()?;
            println!("Configuration available at: {}", path.display());
            Ok(())
        }
        Commands::Stats { json } => show_stats(cache, *json),
        Commands::List { course, assignment } => {
            let filter = EntryFilter {
                course_id: *course,
                assignment_id: *assignment,
            };
            print!("{}", render_entry_listing(&cache.get_all_entries(&filter)));
            Ok(())
        }
        Commands::Clear { yes } => clear_cache(cache, *yes),
        Commands::Remove {
            course_id,
            assignment_id,
            student_id,
            assignment_type,
        } => {
            let key = SubmissionKey::new(*course_id, *assignment_id, *student_id, assignment_type.as_str());
            if cache.remove_entry(&key)? {
                println!("{} Removed {}", "✓".green(), key);
            } else {
                println!("{} No cached submission for {}", "✗".red(), key);
            }
            Ok(())
        }
        Commands::Export { output } => export_cache(cache, output),
        Commands::QuizReport { course, csv } => {
            quiz_report(cache, *course, csv.as_deref(), config.report.pass_threshold)
        }
        Commands::Fingerprint { file, canonical } => show_fingerprint(file, *canonical),
    }
}

fn show_stats(cache: &SubmissionCache, json: bool) -> Result<()> {
    let stats = cache.get_stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Cache file: {}", cache.path().display());
        print!("{}", stats.format());
    }
    Ok(())
}

fn clear_cache(cache: &SubmissionCache, yes: bool) -> Result<()> {
    let confirmed = yes
        || Confirm::new()
            .with_prompt(format!("Remove all {} cached submissions?", cache.len()))
            .default(false)
            .interact()
            .unwrap_or(false);

    if !confirmed {
        println!("Cancelled.");
        return Ok(());
    }

    cache.clear()?;
    println!("{} Cache cleared.", "✓".green());
    Ok(())
}

/// Write every entry as a pretty JSON array, ordered by identity
pub fn export_cache(cache: &SubmissionCache, output: &Path) -> Result<()> {
    let mut entries = cache.get_all_entries(&EntryFilter::all());
    entries.sort_by_key(|entry| entry.key());

    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(output, json).with_context(|| format!("Failed to write export to {}", output.display()))?;

    println!("{} Exported {} submissions to {}", "✓".green(), entries.len(), output.display());
    Ok(())
}

fn quiz_report(cache: &SubmissionCache, course: Option<i64>, csv: Option<&Path>, pass_threshold: f64) -> Result<()> {
    let filter = EntryFilter {
        course_id: course,
        assignment_id: None,
    };
    let report = QuizReport::build(&cache.get_all_entries(&filter), pass_threshold);

    if report.is_empty() {
        println!("No quiz grades found in the cache.");
        return Ok(());
    }

    match csv {
        Some(path) => {
            fs::write(path, report.to_csv())
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("{} Report written to {} ({} rows)", "✓".green(), path.display(), report.row_count());
        }
        None => print!("{}", report.render_console()),
    }
    Ok(())
}

/// Non-JSON files are fingerprinted as a plain string
fn show_fingerprint(file: &Path, canonical: bool) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let payload = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));

    println!("{}", fingerprint(&payload)?);
    if canonical {
        println!("{}", canonical_form(&payload)?);
    }
    Ok(())
}
