pub mod app;
pub mod cache;
pub mod cli;
pub mod constants;
pub mod report;
pub mod utils;

pub use app::{load_config, Config};
pub use cache::{
    fingerprint, fingerprint_of, AssignmentType, CacheEntry, CacheStats, EntryFilter,
    StoreOptions, SubmissionCache, SubmissionKey, SubmissionUpdate,
};
pub use utils::{CacheError, Result};
