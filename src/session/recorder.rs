//! Append-only session recording: actions, anomalies, screenshots, and the
//! terminal save that produces `replay.json` plus a human-readable summary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use serde_json::{Map, Value};

use crate::analyzer::Anomaly;
use crate::config::{DEFAULT_SCREENSHOT_INTERVAL, OUTPUT_DIR};
use crate::frame::Frame;
use crate::session::model::{
    ActionRecord, ActionType, AnomalyRecord, CrashInfo, Session, SessionMetadata,
    SCREENSHOTS_DIRNAME, SESSION_LOG_FILENAME,
};

pub struct SessionRecorder {
    session_dir: PathBuf,
    screenshots_dir: PathBuf,
    start_instant: Instant,
    metadata: SessionMetadata,
    actions: Vec<ActionRecord>,
    anomalies: Vec<AnomalyRecord>,
    /// Shared step counter: incremented once per logged action, read (never
    /// incremented) by anomaly logging. Keeping a single counter is what
    /// holds the screenshot-interval invariant together.
    frame_count: u64,
    screenshot_interval: u64,
}

impl SessionRecorder {
    /// Create the session directory tree under `output_dir` and start the
    /// relative clock. A missing name is derived from the wall-clock start.
    pub fn new(session_name: Option<String>, output_dir: impl AsRef<Path>) -> Result<Self> {
        let start_time = Utc::now();
        let session_name = session_name
            .unwrap_or_else(|| format!("session_{}", start_time.format("%Y-%m-%dT%H%M%S")));

        let session_dir = output_dir.as_ref().join(&session_name);
        let screenshots_dir = session_dir.join(SCREENSHOTS_DIRNAME);
        fs::create_dir_all(&screenshots_dir).with_context(|| {
            format!("failed to create session directory {}", session_dir.display())
        })?;

        Ok(Self {
            session_dir,
            screenshots_dir,
            start_instant: Instant::now(),
            metadata: SessionMetadata::new(session_name, start_time),
            actions: Vec::new(),
            anomalies: Vec::new(),
            frame_count: 0,
            screenshot_interval: DEFAULT_SCREENSHOT_INTERVAL,
        })
    }

    /// Recorder writing to the default `repro/` output directory.
    pub fn with_default_output(session_name: Option<String>) -> Result<Self> {
        Self::new(session_name, OUTPUT_DIR)
    }

    pub fn session_name(&self) -> &str {
        &self.metadata.session_name
    }

    pub fn session_path(&self) -> &Path {
        &self.session_dir
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    pub fn anomalies(&self) -> &[AnomalyRecord] {
        &self.anomalies
    }

    /// Record one driving-loop step. A screenshot is attached only when the
    /// step counter lands on the screenshot interval.
    pub fn log_action(
        &mut self,
        action_type: ActionType,
        action_data: Map<String, Value>,
        frame: Option<&Frame>,
    ) {
        let timestamp = self.start_instant.elapsed().as_secs_f64();
        let frame_number = self.frame_count;

        let mut screenshot = None;
        if let Some(frame) = frame {
            if frame_number % self.screenshot_interval == 0 {
                let name = format!("frame_{frame_number:06}.png");
                screenshot = self.persist_screenshot(frame, &name);
            }
        }

        self.actions.push(ActionRecord {
            timestamp,
            frame_number,
            action_type: action_type.as_tag().to_string(),
            action_data,
            screenshot,
        });
        self.frame_count += 1;
    }

    /// Record an anomaly at the current step. Unlike actions, a supplied
    /// frame is always persisted.
    pub fn log_anomaly(&mut self, anomaly: Anomaly, frame: Option<&Frame>) {
        let timestamp = self.start_instant.elapsed().as_secs_f64();

        let screenshot = frame.and_then(|frame| {
            let name = format!(
                "anomaly_{:04}_frame_{:06}.png",
                self.anomalies.len(),
                self.frame_count
            );
            self.persist_screenshot(frame, &name)
        });

        println!(
            "[ANOMALY] {}: {}",
            anomaly.kind.as_str(),
            anomaly.description
        );

        self.anomalies.push(AnomalyRecord {
            timestamp,
            frame_number: self.frame_count,
            kind: anomaly.kind,
            description: anomaly.description,
            severity: anomaly.severity,
            ssim: anomaly.ssim,
            screenshot,
        });
    }

    /// Mark the session as crashed. Calling this again overwrites the
    /// previous crash info.
    pub fn log_crash(&mut self, info: CrashInfo) {
        println!("[CRASH DETECTED] {} at step {}", info.reason, info.step);
        self.metadata.crashed = true;
        self.metadata.crash_info = Some(info);
    }

    /// Free-form metadata upsert; the driving policy owns the key space.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.extra.insert(key.into(), value);
    }

    /// Finalize and persist the session. Safe to call more than once; a
    /// later call re-finalizes and overwrites.
    pub fn save(&mut self) -> Result<PathBuf> {
        self.metadata.end_time = Some(Utc::now());
        self.metadata.duration_seconds = Some(self.start_instant.elapsed().as_secs_f64());
        self.metadata.total_actions = self.actions.len() as u64;
        self.metadata.total_anomalies = self.anomalies.len() as u64;

        let session = Session {
            metadata: self.metadata.clone(),
            actions: self.actions.clone(),
            anomalies: self.anomalies.clone(),
        };

        let log_path = self.session_dir.join(SESSION_LOG_FILENAME);
        let json = serde_json::to_string_pretty(&session)?;
        fs::write(&log_path, json)
            .with_context(|| format!("failed to write session log {}", log_path.display()))?;

        self.write_summary()
            .context("failed to write session summary")?;

        println!("\nSession saved to: {}", self.session_dir.display());
        println!("Total actions: {}", self.actions.len());
        println!("Total anomalies: {}", self.anomalies.len());

        Ok(log_path)
    }

    fn write_summary(&self) -> Result<()> {
        let summary_path = self.session_dir.join("summary.txt");
        let mut file = fs::File::create(&summary_path)?;

        writeln!(file, "Session: {}", self.metadata.session_name)?;
        writeln!(file, "Start: {}", self.metadata.start_time.to_rfc3339())?;
        if let Some(end) = self.metadata.end_time {
            writeln!(file, "End: {}", end.to_rfc3339())?;
        }
        if let Some(duration) = self.metadata.duration_seconds {
            writeln!(file, "Duration: {duration:.2}s")?;
        }
        writeln!(file, "Total Actions: {}", self.actions.len())?;
        writeln!(file, "Total Anomalies: {}", self.anomalies.len())?;
        writeln!(file, "Crashed: {}", self.metadata.crashed)?;

        if !self.anomalies.is_empty() {
            writeln!(file, "\nAnomalies:")?;
            for (i, anomaly) in self.anomalies.iter().enumerate() {
                writeln!(
                    file,
                    "  {}. [{}] {} at {:.2}s",
                    i + 1,
                    anomaly.kind.as_str(),
                    anomaly.description,
                    anomaly.timestamp
                )?;
            }
        }
        Ok(())
    }

    fn persist_screenshot(&self, frame: &Frame, name: &str) -> Option<String> {
        let path = self.screenshots_dir.join(name);
        match frame.save(&path) {
            Ok(()) => Some(format!("{SCREENSHOTS_DIRNAME}/{name}")),
            Err(err) => {
                warn!("failed to persist screenshot {}: {err}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{AnomalyKind, Severity};
    use image::Rgb;
    use serde_json::json;
    use tempfile::TempDir;

    fn frame() -> Frame {
        Frame::from_pixel(8, 8, Rgb([120, 40, 200]))
    }

    fn softlock() -> Anomaly {
        Anomaly {
            kind: AnomalyKind::Softlock,
            description: "Frame unchanged for 30 captures".into(),
            severity: Severity::High,
            ssim: None,
        }
    }

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn frame_numbers_count_only_actions() {
        let dir = TempDir::new().unwrap();
        let mut recorder = SessionRecorder::new(Some("s".into()), dir.path()).unwrap();

        recorder.log_action(ActionType::Wait, params(&[("duration", json!(0.1))]), None);
        recorder.log_anomaly(softlock(), None);
        recorder.log_anomaly(softlock(), None);
        recorder.log_action(ActionType::KeyTap, params(&[("key", json!("w"))]), None);

        assert_eq!(recorder.actions()[0].frame_number, 0);
        assert_eq!(recorder.actions()[1].frame_number, 1);
        // Anomalies read the counter as it was when they were logged.
        assert_eq!(recorder.anomalies()[0].frame_number, 1);
        assert_eq!(recorder.anomalies()[1].frame_number, 1);
    }

    #[test]
    fn timestamps_are_monotonic() {
        let dir = TempDir::new().unwrap();
        let mut recorder = SessionRecorder::new(Some("s".into()), dir.path()).unwrap();
        for _ in 0..5 {
            recorder.log_action(ActionType::Wait, Map::new(), None);
        }
        let stamps: Vec<f64> = recorder.actions().iter().map(|a| a.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn action_screenshots_follow_the_interval() {
        let dir = TempDir::new().unwrap();
        let mut recorder = SessionRecorder::new(Some("s".into()), dir.path()).unwrap();
        let frame = frame();

        for _ in 0..12 {
            recorder.log_action(ActionType::KeyTap, Map::new(), Some(&frame));
        }

        for action in recorder.actions() {
            let expected = action.frame_number % 10 == 0;
            assert_eq!(
                action.screenshot.is_some(),
                expected,
                "frame {}",
                action.frame_number
            );
        }
        assert_eq!(
            recorder.actions()[0].screenshot.as_deref(),
            Some("screenshots/frame_000000.png")
        );
        assert!(dir
            .path()
            .join("s/screenshots/frame_000010.png")
            .exists());
    }

    #[test]
    fn anomaly_screenshots_are_unconditional() {
        let dir = TempDir::new().unwrap();
        let mut recorder = SessionRecorder::new(Some("s".into()), dir.path()).unwrap();
        let frame = frame();

        recorder.log_action(ActionType::Wait, Map::new(), None);
        recorder.log_anomaly(softlock(), Some(&frame));
        recorder.log_anomaly(softlock(), Some(&frame));
        recorder.log_anomaly(softlock(), None);

        assert_eq!(
            recorder.anomalies()[0].screenshot.as_deref(),
            Some("screenshots/anomaly_0000_frame_000001.png")
        );
        assert_eq!(
            recorder.anomalies()[1].screenshot.as_deref(),
            Some("screenshots/anomaly_0001_frame_000001.png")
        );
        assert!(recorder.anomalies()[2].screenshot.is_none());
        assert!(dir
            .path()
            .join("s/screenshots/anomaly_0001_frame_000001.png")
            .exists());
    }

    #[test]
    fn save_finalizes_and_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut recorder = SessionRecorder::new(Some("rt".into()), dir.path()).unwrap();
        recorder.set_metadata("window_title", json!("Game"));
        recorder.log_action(
            ActionType::KeyPress,
            params(&[("key", json!("space")), ("duration", json!(0.2))]),
            None,
        );
        recorder.log_anomaly(
            Anomaly {
                kind: AnomalyKind::VisualChange,
                description: "Large visual change detected".into(),
                severity: Severity::Medium,
                ssim: Some(0.31),
            },
            None,
        );

        let log_path = recorder.save().unwrap();
        assert!(log_path.ends_with("rt/replay.json"));
        assert!(dir.path().join("rt/summary.txt").exists());

        // Load via directory and via direct file path.
        for source in [dir.path().join("rt"), log_path.clone()] {
            let session = Session::load(&source).unwrap();
            assert_eq!(session.metadata.total_actions, 1);
            assert_eq!(session.metadata.total_anomalies, 1);
            assert_eq!(session.metadata.total_actions as usize, session.actions.len());
            assert_eq!(
                session.metadata.total_anomalies as usize,
                session.anomalies.len()
            );
            assert!(!session.metadata.crashed);
            assert!(session.metadata.end_time.is_some());
            assert_eq!(session.metadata.extra["window_title"], "Game");
            assert_eq!(session.actions[0].action_type, "key_press");
            assert_eq!(session.actions[0].action_data["key"], "space");
            assert_eq!(session.anomalies[0].kind, AnomalyKind::VisualChange);
            assert_eq!(session.anomalies[0].ssim, Some(0.31));
        }

        // A second save re-finalizes without error.
        recorder.log_action(ActionType::Wait, Map::new(), None);
        recorder.save().unwrap();
        let session = Session::load(dir.path().join("rt")).unwrap();
        assert_eq!(session.metadata.total_actions, 2);
    }

    #[test]
    fn repeated_crash_logging_keeps_the_last_report() {
        let dir = TempDir::new().unwrap();
        let mut recorder = SessionRecorder::new(Some("c".into()), dir.path()).unwrap();
        recorder.log_crash(CrashInfo {
            reason: "Process terminated".into(),
            step: 4,
        });
        recorder.log_crash(CrashInfo {
            reason: "capture stalled".into(),
            step: 9,
        });
        recorder.save().unwrap();

        let session = Session::load(recorder.session_path()).unwrap();
        assert!(session.metadata.crashed);
        let info = session.metadata.crash_info.unwrap();
        assert_eq!(info.reason, "capture stalled");
        assert_eq!(info.step, 9);
    }

    #[test]
    fn loading_a_missing_session_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Session::load(dir.path().join("nope")).is_err());
    }
}
