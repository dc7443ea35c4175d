// Gateway module for report - read-only views over cache entries

mod listing;
mod quiz;

pub use listing::render_entry_listing;
pub use quiz::{CourseQuizzes, QuizReport, QuizResult, QuizStats, QuizSummary};
