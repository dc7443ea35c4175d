use chrono::{DateTime, Local};
use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::cache::{AssignmentType, CacheEntry};
use crate::constants::DEFAULT_QUIZ_MAX_GRADE;

/// One student's quiz outcome, read from the entry's extension fields
#[derive(Debug, Clone, PartialEq)]
pub struct QuizResult {
    pub student_id: i64,
    pub username: String,
    pub grade: Option<f64>,
    pub max_grade: f64,
    pub percentage: f64,
    pub attempts: u64,
    pub last_updated: DateTime<Local>,
}

impl QuizResult {
    fn from_entry(entry: &CacheEntry) -> Self {
        let grade = entry.extra_f64("grade");
        let max_grade = entry.extra_f64("max_grade").unwrap_or(DEFAULT_QUIZ_MAX_GRADE);
        let percentage = match grade {
            Some(grade) if max_grade > 0.0 => grade * 100.0 / max_grade,
            _ => 0.0,
        };

        Self {
            student_id: entry.student_id,
            username: entry.display_username(),
            grade,
            max_grade,
            percentage,
            attempts: entry.extra.get("attempts").and_then(|v| v.as_u64()).unwrap_or(0),
            last_updated: entry.last_updated_at,
        }
    }

    pub fn passed(&self, threshold: f64) -> bool {
        self.percentage >= threshold
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizSummary {
    pub quiz_id: i64,
    pub name: String,
    /// Sorted by username
    pub results: Vec<QuizResult>,
}

/// Aggregates over the students that actually have a grade
#[derive(Debug, Clone, PartialEq)]
pub struct QuizStats {
    pub graded: usize,
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub passed: usize,
}

impl QuizSummary {
    pub fn stats(&self, threshold: f64) -> Option<QuizStats> {
        let percentages: Vec<f64> = self
            .results
            .iter()
            .filter(|r| r.grade.is_some() && r.max_grade != 0.0)
            .map(|r| r.percentage)
            .collect();

        if percentages.is_empty() {
            return None;
        }

        let graded = percentages.len();
        Some(QuizStats {
            graded,
            average: percentages.iter().sum::<f64>() / graded as f64,
            max: percentages.iter().copied().fold(f64::MIN, f64::max),
            min: percentages.iter().copied().fold(f64::MAX, f64::min),
            passed: percentages.iter().filter(|p| **p >= threshold).count(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseQuizzes {
    pub course_id: i64,
    pub quizzes: Vec<QuizSummary>,
}

/// Quiz grades per course, built from cached quiz entries
#[derive(Debug, Clone, PartialEq)]
pub struct QuizReport {
    pub courses: Vec<CourseQuizzes>,
    pub pass_threshold: f64,
}

impl QuizReport {
    /// Keeps only quiz entries; courses and quizzes ordered by id
    pub fn build(entries: &[CacheEntry], pass_threshold: f64) -> Self {
        let mut grouped: BTreeMap<i64, BTreeMap<i64, QuizSummary>> = BTreeMap::new();

        for entry in entries.iter().filter(|e| e.assignment_type == AssignmentType::Quiz) {
            grouped
                .entry(entry.course_id)
                .or_default()
                .entry(entry.assignment_id)
                .or_insert_with(|| QuizSummary {
                    quiz_id: entry.assignment_id,
                    name: if entry.assignment_name.is_empty() {
                        "Unknown quiz".to_string()
                    } else {
                        entry.assignment_name.clone()
                    },
                    results: Vec::new(),
                })
                .results
                .push(QuizResult::from_entry(entry));
        }

        let courses = grouped
            .into_iter()
            .map(|(course_id, quizzes)| CourseQuizzes {
                course_id,
                quizzes: quizzes
                    .into_values()
                    .map(|mut quiz| {
                        quiz.results.sort_by(|a, b| a.username.cmp(&b.username));
                        quiz
                    })
                    .collect(),
            })
            .collect();

        Self {
            courses,
            pass_threshold,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Number of student rows across all quizzes
    pub fn row_count(&self) -> usize {
        self.courses
            .iter()
            .flat_map(|c| &c.quizzes)
            .map(|q| q.results.len())
            .sum()
    }

    pub fn render_console(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "Quiz Grade Report".bold());

        for course in &self.courses {
            let _ = writeln!(out, "\nCourse {}", course.course_id);

            for quiz in &course.quizzes {
                let _ = writeln!(out, "\n  {} (ID: {})", quiz.name.bold(), quiz.quiz_id);

                for result in quiz.results.iter() {
                    let Some(grade) = result.grade else { continue };
                    let marker = if result.passed(self.pass_threshold) {
                        "✓".green()
                    } else {
                        "✗".red()
                    };
                    let _ = writeln!(
                        out,
                        "    {} {:20} | {:5.1}/{:5.1} ({:5.1}%) | {} attempt(s)",
                        marker, result.username, grade, result.max_grade, result.percentage, result.attempts
                    );
                }

                if let Some(stats) = quiz.stats(self.pass_threshold) {
                    let _ = writeln!(out, "\n    Average: {:.1}%", stats.average);
                    let _ = writeln!(out, "    Highest: {:.1}%", stats.max);
                    let _ = writeln!(out, "    Lowest:  {:.1}%", stats.min);
                    let _ = writeln!(
                        out,
                        "    Passed:  {}/{} ({:.1}%)",
                        stats.passed,
                        stats.graded,
                        stats.passed as f64 / stats.graded as f64 * 100.0
                    );
                }
            }
        }

        out
    }

    /// Header plus one row per student
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_row(
            &mut out,
            &[
                "course_id",
                "quiz_id",
                "quiz_name",
                "student_id",
                "student_username",
                "grade",
                "max_grade",
                "percentage",
                "attempts",
                "result",
                "last_updated",
            ]
            .map(String::from),
        );

        for course in &self.courses {
            for quiz in &course.quizzes {
                for result in &quiz.results {
                    let outcome = if result.passed(self.pass_threshold) { "passed" } else { "failed" };
                    push_row(
                        &mut out,
                        &[
                            course.course_id.to_string(),
                            quiz.quiz_id.to_string(),
                            quiz.name.clone(),
                            result.student_id.to_string(),
                            result.username.clone(),
                            result.grade.map(|g| g.to_string()).unwrap_or_default(),
                            result.max_grade.to_string(),
                            format!("{:.2}", result.percentage),
                            result.attempts.to_string(),
                            outcome.to_string(),
                            result.last_updated.to_rfc3339(),
                        ],
                    );
                }
            }
        }

        out
    }
}

fn push_row(out: &mut String, fields: &[String]) {
    let row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    out.push_str(&row);
    out.push('\n');
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
