use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event kind. The string forms are stable: downstream readers filter
/// the persisted log on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Start,
    Step,
    Add,
    AddAbsence,
    Move,
    Delete,
    Close,
    UpdateInfo,
    Skip,
    Warn,
    /// Kinds added outside the built-in taxonomy
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "START",
            Self::Step => "STEP",
            Self::Add => "ADD",
            Self::AddAbsence => "ADD-ABS",
            Self::Move => "MOVE",
            Self::Delete => "DEL",
            Self::Close => "CLOSE",
            Self::UpdateInfo => "UPD-INFO",
            Self::Skip => "SKIP",
            Self::Warn => "WARN",
            Self::Other(kind) => kind,
        }
    }

    /// Kinds that change the Master dataset.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::AddAbsence | Self::Move | Self::Delete | Self::Close | Self::UpdateInfo
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        match kind {
            "START" => Self::Start,
            "STEP" => Self::Step,
            "ADD" => Self::Add,
            "ADD-ABS" => Self::AddAbsence,
            "MOVE" => Self::Move,
            "DEL" => Self::Delete,
            "CLOSE" => Self::Close,
            "UPD-INFO" => Self::UpdateInfo,
            "SKIP" => Self::Skip,
            "WARN" => Self::Warn,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(kind: String) -> Self {
        Self::from(kind.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
    pub key: String,
    pub message: String,
}
