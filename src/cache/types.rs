use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_STATUS, KEY_SEPARATOR};
use crate::utils::CacheError;

/// Kind of submission; kinds share numeric id-spaces on the LMS side
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssignmentType {
    /// File-upload assignment
    Assign,
    /// Code-judge (VPL) task
    Vpl,
    Quiz,
    /// Graded forum participation
    ForumTask,
    Other(String),
}

impl AssignmentType {
    pub fn as_str(&self) -> &str {
        match self {
            AssignmentType::Assign => "assign",
            AssignmentType::Vpl => "vpl",
            AssignmentType::Quiz => "quiz",
            AssignmentType::ForumTask => "forum_task",
            AssignmentType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "assign" => AssignmentType::Assign,
            "vpl" => AssignmentType::Vpl,
            "quiz" => AssignmentType::Quiz,
            "forum_task" => AssignmentType::ForumTask,
            other => AssignmentType::Other(other.to_string()),
        })
    }
}

impl From<&str> for AssignmentType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<String> for AssignmentType {
    fn from(s: String) -> Self {
        AssignmentType::from(s.as_str())
    }
}

impl From<AssignmentType> for String {
    fn from(kind: AssignmentType) -> Self {
        match kind {
            AssignmentType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// Identity of one tracked submission slot
///
/// Renders as `type_course_assignment_student`, the field name used in the
/// persisted snapshot. Parsing reads the three ids from the right, so tags
/// that contain the separator (`forum_task`) stay unambiguous.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubmissionKey {
    pub assignment_type: AssignmentType,
    pub course_id: i64,
    pub assignment_id: i64,
    pub student_id: i64,
}

impl SubmissionKey {
    pub fn new(
        course_id: i64,
        assignment_id: i64,
        student_id: i64,
        assignment_type: impl Into<AssignmentType>,
    ) -> Self {
        Self {
            assignment_type: assignment_type.into(),
            course_id,
            assignment_id,
            student_id,
        }
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.assignment_type,
            self.course_id,
            self.assignment_id,
            self.student_id,
            sep = KEY_SEPARATOR
        )
    }
}

impl FromStr for SubmissionKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CacheError::InvalidKey(s.to_string());
        let mut parts = s.rsplitn(4, KEY_SEPARATOR);

        let student_id: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let assignment_id: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let course_id: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let assignment_type = match parts.next() {
            Some(tag) if !tag.is_empty() => AssignmentType::from(tag),
            _ => return Err(invalid()),
        };

        Ok(Self {
            assignment_type,
            course_id,
            assignment_id,
            student_id,
        })
    }
}

/// Last observed state of one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub course_id: i64,
    pub assignment_id: i64,
    pub student_id: i64,
    #[serde(default)]
    pub student_username: String,
    #[serde(default)]
    pub assignment_name: String,
    pub assignment_type: AssignmentType,
    #[serde(rename = "hash")]
    pub fingerprint: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(rename = "last_updated", with = "timestamp")]
    pub last_updated_at: DateTime<Local>,
    #[serde(rename = "first_seen", with = "timestamp")]
    pub first_seen_at: DateTime<Local>,
    /// Caller-defined fields, flattened next to the core fields on disk
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CacheEntry {
    pub fn key(&self) -> SubmissionKey {
        SubmissionKey {
            assignment_type: self.assignment_type.clone(),
            course_id: self.course_id,
            assignment_id: self.assignment_id,
            student_id: self.student_id,
        }
    }

    /// Numeric extension field, if present
    pub fn extra_f64(&self, field: &str) -> Option<f64> {
        self.extra.get(field).and_then(Value::as_f64)
    }

    /// Username for display, falling back to the numeric id
    pub fn display_username(&self) -> String {
        if self.student_username.is_empty() {
            format!("ID:{}", self.student_id)
        } else {
            self.student_username.clone()
        }
    }
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

/// Everything `SubmissionCache::update` needs to record a new state
#[derive(Debug)]
pub struct SubmissionUpdate<'a, T: ?Sized> {
    pub key: SubmissionKey,
    pub data: &'a T,
    pub student_username: String,
    pub assignment_name: String,
    pub status: String,
    pub extra: Map<String, Value>,
}

impl<'a, T: ?Sized> SubmissionUpdate<'a, T> {
    pub fn new(key: SubmissionKey, data: &'a T) -> Self {
        Self {
            key,
            data,
            student_username: String::new(),
            assignment_name: String::new(),
            status: default_status(),
            extra: Map::new(),
        }
    }

    pub fn student_username(mut self, username: impl Into<String>) -> Self {
        self.student_username = username.into();
        self
    }

    pub fn assignment_name(mut self, name: impl Into<String>) -> Self {
        self.assignment_name = name.into();
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Add a single extension field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Merge a whole map of extension fields
    pub fn extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra.extend(extra);
        self
    }
}

/// Conjunctive filter for `get_all_entries`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub course_id: Option<i64>,
    pub assignment_id: Option<i64>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn course(mut self, course_id: i64) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn assignment(mut self, assignment_id: i64) -> Self {
        self.assignment_id = Some(assignment_id);
        self
    }

    pub fn matches(&self, entry: &CacheEntry) -> bool {
        self.course_id.map_or(true, |id| entry.course_id == id)
            && self.assignment_id.map_or(true, |id| entry.assignment_id == id)
    }
}

/// ISO-8601 timestamps; snapshots written without an offset are read as local time
mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Local>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Local));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local.from_local_datetime(&naive).earliest()
    }
}
