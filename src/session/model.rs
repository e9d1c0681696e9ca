//! Wire types for the persisted session log (`replay.json`).
//!
//! Field names and tag spellings are a stable contract shared by the
//! recorder, the loader and the replay engine. Timestamps inside records are
//! relative seconds from session start; metadata carries absolute RFC 3339
//! instants.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical log filename inside a session directory.
pub const SESSION_LOG_FILENAME: &str = "replay.json";
/// Screenshot subdirectory inside a session directory.
pub const SCREENSHOTS_DIRNAME: &str = "screenshots";

/// Primitive input actions the exerciser can issue and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    KeyPress,
    KeyRelease,
    KeyTap,
    MouseMove,
    MouseClick,
    Wait,
}

impl ActionType {
    pub fn as_tag(&self) -> &'static str {
        match self {
            ActionType::KeyPress => "key_press",
            ActionType::KeyRelease => "key_release",
            ActionType::KeyTap => "key_tap",
            ActionType::MouseMove => "mouse_move",
            ActionType::MouseClick => "mouse_click",
            ActionType::Wait => "wait",
        }
    }

    /// Resolve a wire tag, tolerating legacy qualified spellings like
    /// `ActionType.KEY_TAP` and any casing.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let bare = tag.rsplit('.').next().unwrap_or(tag);
        match bare.to_ascii_lowercase().as_str() {
            "key_press" => Some(ActionType::KeyPress),
            "key_release" => Some(ActionType::KeyRelease),
            "key_tap" => Some(ActionType::KeyTap),
            "mouse_move" => Some(ActionType::MouseMove),
            "mouse_click" => Some(ActionType::MouseClick),
            "wait" => Some(ActionType::Wait),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    VisualChange,
    Softlock,
    PerformanceDrop,
    Crash,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::VisualChange => "visual_change",
            AnomalyKind::Softlock => "softlock",
            AnomalyKind::PerformanceDrop => "performance_drop",
            AnomalyKind::Crash => "crash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// One recorded driving-loop step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    /// Seconds since session start, monotonic non-decreasing.
    pub timestamp: f64,
    /// 0-based step counter, one increment per recorded action.
    pub frame_number: u64,
    /// Wire tag of the action. Kept as text so logs with unknown tags still
    /// load; replay resolves it through [`ActionType::from_tag`] and skips
    /// what it cannot resolve.
    pub action_type: String,
    /// Named parameters; keys depend on the action type and unknown keys are
    /// tolerated on replay.
    pub action_data: Map<String, Value>,
    /// Path relative to the session directory, present every Nth record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// One recorded anomaly, enriched by the recorder with timing and artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyRecord {
    pub timestamp: f64,
    /// The step counter at detection time; shared with actions, never
    /// incremented by anomaly logging.
    pub frame_number: u64,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub description: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssim: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrashInfo {
    pub reason: String,
    pub step: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub total_actions: u64,
    pub total_anomalies: u64,
    pub crashed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crash_info: Option<CrashInfo>,
    /// Free-form descriptive fields set by the driving policy (window title,
    /// fps, step budget, agent-specific keys).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionMetadata {
    pub fn new(session_name: String, start_time: DateTime<Utc>) -> Self {
        Self {
            session_name,
            start_time,
            end_time: None,
            duration_seconds: None,
            total_actions: 0,
            total_anomalies: 0,
            crashed: false,
            crash_info: None,
            extra: Map::new(),
        }
    }
}

/// The aggregate root: one complete recorded run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub metadata: SessionMetadata,
    pub actions: Vec<ActionRecord>,
    pub anomalies: Vec<AnomalyRecord>,
}

impl Session {
    /// Load a saved session from its directory or directly from the log
    /// file. A missing or corrupt log is a hard error.
    pub fn load(path: impl AsRef<Path>) -> Result<Session> {
        let path = path.as_ref();
        let log_path = Self::resolve_log_path(path);
        let raw = fs::read_to_string(&log_path)
            .with_context(|| format!("failed to read session log {}", log_path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("corrupt session log {}", log_path.display()))
    }

    /// Directory or file path → path of the structured log file.
    pub fn resolve_log_path(path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(SESSION_LOG_FILENAME)
        } else {
            path.to_path_buf()
        }
    }

    /// Directory or file path → the session directory itself.
    pub fn resolve_session_dir(path: &Path) -> PathBuf {
        if path.is_dir() {
            path.to_path_buf()
        } else {
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tags_round_trip_through_serde() {
        for (tag, action) in [
            ("key_press", ActionType::KeyPress),
            ("key_release", ActionType::KeyRelease),
            ("key_tap", ActionType::KeyTap),
            ("mouse_move", ActionType::MouseMove),
            ("mouse_click", ActionType::MouseClick),
            ("wait", ActionType::Wait),
        ] {
            assert_eq!(serde_json::to_value(action).unwrap(), tag);
            assert_eq!(
                serde_json::from_value::<ActionType>(tag.into()).unwrap(),
                action
            );
            assert_eq!(action.as_tag(), tag);
        }
    }

    #[test]
    fn from_tag_strips_qualified_prefixes() {
        assert_eq!(ActionType::from_tag("key_tap"), Some(ActionType::KeyTap));
        assert_eq!(
            ActionType::from_tag("ActionType.KEY_TAP"),
            Some(ActionType::KeyTap)
        );
        assert_eq!(ActionType::from_tag("MOUSE_CLICK"), Some(ActionType::MouseClick));
        assert_eq!(ActionType::from_tag("teleport"), None);
        assert_eq!(ActionType::from_tag("ActionType.WARP"), None);
    }

    #[test]
    fn anomaly_kind_serializes_with_the_type_key() {
        let record = AnomalyRecord {
            timestamp: 1.5,
            frame_number: 3,
            kind: AnomalyKind::Softlock,
            description: "stuck".into(),
            severity: Severity::High,
            ssim: None,
            screenshot: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "softlock");
        assert_eq!(value["severity"], "high");
        assert!(value.get("ssim").is_none());
        assert!(value.get("screenshot").is_none());
    }

    #[test]
    fn metadata_extra_fields_survive_a_round_trip() {
        let mut metadata = SessionMetadata::new("session_x".into(), Utc::now());
        metadata.extra.insert("window_title".into(), "Game".into());
        metadata.extra.insert("fps".into(), 10.into());

        let json = serde_json::to_string(&metadata).unwrap();
        let back: SessionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra["window_title"], "Game");
        assert_eq!(back.extra["fps"], 10);
        assert_eq!(back, metadata);
    }
}
