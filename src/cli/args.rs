use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::DEFAULT_EXPORT_FILE;

#[derive(Parser, Debug)]
#[command(name = "subcache")]
#[command(version)]
#[command(about = "Inspect and maintain the submission change-detection cache", long_about = None)]
pub struct Cli {
    /// Cache snapshot file (overrides configuration)
    #[arg(short = 'f', long, env = "SUBCACHE_FILE")]
    pub cache_file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Write a default configuration file
    Init,
    /// Show cache statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cached submissions
    #[command(alias = "ls")]
    List {
        /// Only this course
        #[arg(long)]
        course: Option<i64>,
        /// Only this assignment
        #[arg(long)]
        assignment: Option<i64>,
    },
    /// Remove every cached submission
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove a single cached submission
    #[command(alias = "rm")]
    Remove {
        course_id: i64,
        assignment_id: i64,
        student_id: i64,
        /// Assignment type tag (assign, vpl, quiz, forum_task, ...)
        assignment_type: String,
    },
    /// Export all cached submissions as a JSON array
    Export {
        #[arg(default_value = DEFAULT_EXPORT_FILE)]
        output: PathBuf,
    },
    /// Report quiz grades recorded in the cache
    QuizReport {
        /// Only this course
        #[arg(long)]
        course: Option<i64>,
        /// Write CSV to this file instead of printing
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print the fingerprint of a JSON payload file
    Fingerprint {
        file: PathBuf,
        /// Also print the canonical text that gets hashed
        #[arg(long)]
        canonical: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_remove_arguments() {
        let cli = Cli::try_parse_from(["subcache", "rm", "10", "123", "456", "vpl"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Remove {
                course_id: 10,
                assignment_id: 123,
                student_id: 456,
                assignment_type: "vpl".to_string(),
            }
        );
    }

    #[test]
    fn test_export_default_output() {
        let cli = Cli::try_parse_from(["subcache", "export"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Export {
                output: PathBuf::from("cache_export.json")
            }
        );
    }

    #[test]
    fn test_list_filters() {
        let cli = Cli::try_parse_from(["subcache", "-f", "x.json", "list", "--course", "10"]).unwrap();
        assert_eq!(cli.cache_file, Some(PathBuf::from("x.json")));
        assert_eq!(
            cli.command,
            Commands::List {
                course: Some(10),
                assignment: None
            }
        );
    }
}
