use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque identifier of a task record.
pub type TaskId = String;

/// Opaque identifier of an account record.
pub type AccountId = String;

/// Importance of a task. Absence of a priority is modelled as `Option::None`
/// and never as a fourth variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Errors raised while turning request parameters into domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown priority '{0}'")]
    UnknownPriority(String),
    #[error("Unknown sort key '{0}'")]
    UnknownSortKey(String),
    #[error("Unknown scope '{0}'")]
    UnknownScope(String),
    #[error("Unknown bulk action '{0}'")]
    UnknownBulkAction(String),
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// Sort rank of an optional priority: high 3, medium 2, low 1, absent 0.
    pub fn rank(priority: Option<Priority>) -> u8 {
        match priority {
            Some(Priority::High) => 3,
            Some(Priority::Medium) => 2,
            Some(Priority::Low) => 1,
            None => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    /// Parses user input where `""` and `"none"` both mean "no priority".
    pub fn parse_optional(value: &str) -> Result<Option<Priority>, ParseError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(ParseError::UnknownPriority(s.to_string())),
        }
    }
}

/// A single user-owned todo as handed out by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Task {
    pub id: TaskId,
    pub owner_id: AccountId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Returns true when the search text occurs in the title or the
    /// description, ignoring case.
    pub fn mentions(&self, needle_lowercase: &str) -> bool {
        if needle_lowercase.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle_lowercase)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle_lowercase))
    }
}

/// An account as seen by the dashboard and the admin area.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn display_name(&self) -> &str {
        Self::name_or_email(self.full_name.as_deref(), &self.email)
    }

    /// Full name when present and not blank, the email otherwise.
    pub fn name_or_email<'a>(full_name: Option<&'a str>, email: &'a str) -> &'a str {
        full_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(email)
    }

    /// Up to two uppercase initials of the full name, or the first letter of the email.
    pub fn initials(&self) -> String {
        match self.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(name) => name
                .split_whitespace()
                .filter_map(|part| part.chars().next())
                .flat_map(char::to_uppercase)
                .take(2)
                .collect(),
            None => self
                .email
                .chars()
                .next()
                .map(|c| c.to_uppercase().collect())
                .unwrap_or_else(|| "?".to_string()),
        }
    }
}
