mod fingerprint;
mod store;
mod submission_cache;
mod types;

pub use fingerprint::{canonical_form, fingerprint, fingerprint_of};
pub use store::StoreOptions;
pub use submission_cache::{CacheStats, SubmissionCache};
pub use types::{AssignmentType, CacheEntry, EntryFilter, SubmissionKey, SubmissionUpdate};

use crate::app::Config;

/// Open the cache described by the loaded configuration
pub fn init(config: &Config) -> SubmissionCache {
    SubmissionCache::with_options(
        config.cache.path.clone(),
        StoreOptions {
            atomic_writes: config.cache.atomic_writes,
        },
    )
}
