/// Constants module to avoid magic numbers in the codebase

// Storage
pub const DEFAULT_CACHE_FILE: &str = "submission_cache.json";
pub const DEFAULT_EXPORT_FILE: &str = "cache_export.json";
pub const TEMP_FILE_EXTENSION: &str = "tmp";
pub const KEY_SEPARATOR: char = '_';

// Configuration
pub const APP_NAME: &str = "subcache";
pub const ENV_PREFIX: &str = "SUBCACHE_";
pub const LOCAL_CONFIG_PATH: &str = ".subcache/config.toml";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const VERBOSE_LOG_LEVEL: &str = "debug";

// Entry defaults
pub const DEFAULT_STATUS: &str = "processed";

/// Field names owned by the entry itself; extension fields may not reuse them
pub const RESERVED_FIELDS: &[&str] = &[
    "course_id",
    "assignment_id",
    "student_id",
    "student_username",
    "assignment_name",
    "assignment_type",
    "hash",
    "status",
    "last_updated",
    "first_seen",
];

// Reporting
pub const DEFAULT_PASS_THRESHOLD: f64 = 50.0;
pub const DEFAULT_QUIZ_MAX_GRADE: f64 = 100.0;
pub const LISTING_NAME_WIDTH: usize = 30;
pub const LISTING_USER_WIDTH: usize = 15;
pub const LISTING_TYPE_WIDTH: usize = 10;
pub const RULE_WIDTH: usize = 70;
