//! Validation of raw create/edit/assign input before anything is persisted.
use chrono::NaiveDate;
use thiserror::Error;

use crate::task::{AccountId, Priority};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Raw form input for creating or editing a task. Every field is the string
/// the user typed; empty strings mean "not set".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub category: String,
    pub priority: String,
}

/// Raw form input for an admin assigning a task to another account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AssignDraft {
    pub assignee_id: String,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub task: TaskDraft,
}

/// Validated task fields, ready for the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
}

/// Per-field validation messages. Empty means the input was valid.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[error("Invalid form input")]
pub struct FormErrors {
    pub title: Option<String>,
    pub due_date: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
    }

    pub fn messages(&self) -> Vec<&str> {
        [&self.assignee, &self.title, &self.due_date, &self.priority]
            .into_iter()
            .filter_map(|message| message.as_deref())
            .collect()
    }
}

fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// Accepts `YYYY-MM-DD` and the date part of `YYYY-MM-DDTHH:MM` picker values.
fn parse_due_date(value: &str) -> Result<Option<NaiveDate>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| "Due date must be a date like 2025-01-31".to_string())
}

impl TaskDraft {
    /// Builds a draft pre-filled from an existing task, for edit forms.
    pub fn from_task(task: &crate::task::Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            due_date: task
                .due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            category: task.category.clone().unwrap_or_default(),
            priority: task
                .priority
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<NewTask, FormErrors> {
        let mut errors = FormErrors::default();

        let title = self.title.trim();
        if title.is_empty() {
            errors.title = Some("Title is required".to_string());
        }

        let due_date = parse_due_date(&self.due_date).unwrap_or_else(|message| {
            errors.due_date = Some(message);
            None
        });

        let priority = Priority::parse_optional(&self.priority).unwrap_or_else(|_| {
            errors.priority = Some("Priority must be low, medium, high or none".to_string());
            None
        });

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewTask {
            title: title.to_string(),
            description: optional_text(&self.description),
            due_date,
            category: optional_text(&self.category),
            priority,
        })
    }
}

impl AssignDraft {
    /// Validates the task fields and the assignee together so the form can
    /// show every problem at once.
    pub fn validate(&self) -> Result<(AccountId, NewTask), FormErrors> {
        let assignee = self.assignee_id.trim();
        match (self.task.validate(), assignee.is_empty()) {
            (Ok(task), false) => Ok((assignee.to_string(), task)),
            (result, missing_assignee) => {
                let mut errors = result.err().unwrap_or_default();
                if missing_assignee {
                    errors.assignee = Some("Please select a user".to_string());
                }
                Err(errors)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn can_validate_minimal_draft() {
        let task = draft("  Pay rent ").validate().unwrap();

        assert_eq!(
            task,
            NewTask {
                title: "Pay rent".to_string(),
                description: None,
                due_date: None,
                category: None,
                priority: None,
            }
        );
    }

    #[test]
    fn can_validate_full_draft() {
        let task = TaskDraft {
            title: "Ship release".to_string(),
            description: "tag and publish".to_string(),
            due_date: "2025-02-03T14:30".to_string(),
            category: " Work ".to_string(),
            priority: "high".to_string(),
        }
        .validate()
        .unwrap();

        assert_eq!(task.description.as_deref(), Some("tag and publish"));
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2025, 2, 3));
        assert_eq!(task.category.as_deref(), Some("Work"));
        assert_eq!(task.priority, Some(Priority::High));
    }

    #[test]
    fn rejects_empty_title() {
        let errors = draft("   ").validate().unwrap_err();

        assert_eq!(errors.title.as_deref(), Some("Title is required"));
        assert_eq!(errors.messages(), vec!["Title is required"]);
    }

    #[test]
    fn collects_every_field_error() {
        let errors = TaskDraft {
            title: String::new(),
            due_date: "next week".to_string(),
            priority: "urgent".to_string(),
            ..Default::default()
        }
        .validate()
        .unwrap_err();

        assert!(errors.title.is_some());
        assert!(errors.due_date.is_some());
        assert!(errors.priority.is_some());
        assert!(errors.assignee.is_none());
    }

    #[test]
    fn none_priority_is_no_priority() {
        let mut input = draft("Read");
        input.priority = "none".to_string();

        assert_eq!(input.validate().unwrap().priority, None);
    }

    #[test]
    fn assign_requires_a_user() {
        let errors = AssignDraft {
            assignee_id: String::new(),
            task: draft("Review"),
        }
        .validate()
        .unwrap_err();

        assert_eq!(errors.assignee.as_deref(), Some("Please select a user"));
        assert!(errors.title.is_none());

        let (assignee, task) = AssignDraft {
            assignee_id: "acc-9".to_string(),
            task: draft("Review"),
        }
        .validate()
        .unwrap();
        assert_eq!(assignee, "acc-9");
        assert_eq!(task.title, "Review");
    }

    #[test]
    fn can_prefill_from_task() {
        let mut task = crate::view::tests::task("t", "Plan", 1);
        task.due_date = NaiveDate::from_ymd_opt(2025, 5, 6);
        task.priority = Some(Priority::Medium);

        let draft = TaskDraft::from_task(&task);

        assert_eq!(draft.due_date, "2025-05-06");
        assert_eq!(draft.priority, "medium");
        assert_eq!(draft.validate().unwrap().title, "Plan");
    }
}
