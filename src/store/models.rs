use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Classification selecting which handler processes a task.
///
/// Stored as a plain string column. Values this bridge does not know are kept
/// verbatim in `Other` so a single odd row cannot break decoding of the poll
/// query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AutomationTag {
    None,
    Research,
    Project,
    Refactor,
    Infra,
    Other(String),
}

impl AutomationTag {
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Research => "research",
            Self::Project => "project",
            Self::Refactor => "refactor",
            Self::Infra => "infra",
            Self::Other(s) => s,
        }
    }

    /// Project-class tags share the repository handler.
    pub fn is_project_class(&self) -> bool {
        matches!(self, Self::Project | Self::Refactor | Self::Infra)
    }
}

impl From<String> for AutomationTag {
    fn from(s: String) -> Self {
        match s.as_str() {
            "none" => Self::None,
            "research" => Self::Research,
            "project" => Self::Project,
            "refactor" => Self::Refactor,
            "infra" => Self::Infra,
            _ => Self::Other(s),
        }
    }
}

impl From<AutomationTag> for String {
    fn from(tag: AutomationTag) -> Self {
        tag.as_str().to_string()
    }
}

impl fmt::Display for AutomationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Done,
    Failed,
}

impl AutomationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AutomationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid automation status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Started,
    Progress,
    Completed,
    Error,
}

/// One entry of a task's `automation_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: Some(message.into()),
            output: None,
        }
    }

    pub fn started(message: impl Into<String>) -> Self {
        Self::new(LogKind::Started, message)
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(LogKind::Progress, message)
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self::new(LogKind::Completed, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogKind::Error, message)
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// A row of the `tasks` table, as far as the bridge cares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub automation_tag: Option<AutomationTag>,
    #[serde(default)]
    pub automation_status: Option<AutomationStatus>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub automation_log: Vec<LogEntry>,
    #[serde(default)]
    pub project_tag: Option<String>,
    #[serde(default)]
    pub repo_path: Option<String>,
    #[serde(default)]
    pub pr_link: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            category: None,
            priority: None,
            context: None,
            next_actions: Vec::new(),
            automation_tag: None,
            automation_status: None,
            automation_log: Vec::new(),
            project_tag: None,
            repo_path: None,
            pr_link: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn tag(&self) -> &AutomationTag {
        self.automation_tag.as_ref().unwrap_or(&AutomationTag::None)
    }

    pub fn status(&self) -> AutomationStatus {
        self.automation_status.unwrap_or_default()
    }

    /// Whether the dispatcher may pick this task up.
    pub fn is_eligible(&self) -> bool {
        *self.tag() != AutomationTag::None && self.status() == AutomationStatus::Queued
    }
}

/// Merge-patch applied by `TaskStore::update_fields`. `None` fields are left
/// untouched; `updated_at` is always stamped by the store. The log is not
/// patchable: entries only ever go through `TaskStore::append_log`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_status: Option<AutomationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TaskPatch {
    pub fn status(status: AutomationStatus) -> Self {
        Self {
            automation_status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_decodes_supabase_row_with_nulls() {
        let row = r#"{
            "id": "a1",
            "title": "Look into caching",
            "description": null,
            "next_actions": null,
            "automation_tag": "research",
            "automation_status": "queued",
            "automation_log": null,
            "project_tag": null,
            "repo_path": null,
            "filename": "ignored.md"
        }"#;
        let task: Task = serde_json::from_str(row).unwrap();
        assert_eq!(task.id, "a1");
        assert_eq!(task.tag(), &AutomationTag::Research);
        assert_eq!(task.status(), AutomationStatus::Queued);
        assert!(task.automation_log.is_empty());
        assert!(task.next_actions.is_empty());
        assert!(task.is_eligible());
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let row = r#"{"id": "b", "title": "t", "automation_tag": "deploy"}"#;
        let task: Task = serde_json::from_str(row).unwrap();
        assert_eq!(task.tag(), &AutomationTag::Other("deploy".to_string()));
        assert_eq!(task.tag().to_string(), "deploy");
    }

    #[test]
    fn test_none_tag_is_never_eligible() {
        let mut task = Task::new("c", "t");
        task.automation_status = Some(AutomationStatus::Queued);
        assert!(!task.is_eligible());
        task.automation_tag = Some(AutomationTag::None);
        assert!(!task.is_eligible());
        task.automation_tag = Some(AutomationTag::Infra);
        assert!(task.is_eligible());
    }

    #[test]
    fn test_log_entry_uses_type_field() {
        let entry = LogEntry::started("Research task started");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["message"], "Research task started");
        assert!(json.get("output").is_none());
    }

    #[test]
    fn test_log_entry_parses_javascript_timestamps() {
        let raw = r#"{"timestamp":"2025-01-05T10:11:12.345Z","type":"progress","message":"Commit created on branch main"}"#;
        let entry: LogEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.kind, LogKind::Progress);
        assert_eq!(entry.output, None);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = TaskPatch::status(AutomationStatus::Done).with_description("notes");
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"automation_status": "done", "description": "notes"})
        );
        assert_eq!(serde_json::to_value(TaskPatch::default()).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            AutomationStatus::Idle,
            AutomationStatus::Queued,
            AutomationStatus::Running,
            AutomationStatus::Done,
            AutomationStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AutomationStatus>(), Ok(status));
        }
        assert!("paused".parse::<AutomationStatus>().is_err());
    }
}
