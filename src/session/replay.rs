//! Timing-faithful replay of a recorded session, plus video export and
//! range queries over the loaded log.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use log::warn;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::input::InputSink;
use crate::session::model::{
    ActionRecord, ActionType, AnomalyRecord, Session, SCREENSHOTS_DIRNAME,
};

/// Replay lifecycle. `Interrupted` is terminal and reachable from any point
/// after the pre-start wait begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Waiting,
    Replaying,
    Finished,
    Interrupted,
}

pub struct ReplayEngine {
    session_dir: PathBuf,
    session: Session,
    playback_speed: f64,
    state: ReplayState,
    completed: usize,
}

impl ReplayEngine {
    /// Load a session from its directory or log file. Speed must be
    /// positive; >1 replays faster than real time.
    pub fn new(path: impl AsRef<Path>, playback_speed: f64) -> Result<Self> {
        ensure!(
            playback_speed > 0.0,
            "playback speed must be positive, got {playback_speed}"
        );
        let path = path.as_ref();
        let session = Session::load(path)?;
        Ok(Self {
            session_dir: Session::resolve_session_dir(path),
            session,
            playback_speed,
            state: ReplayState::Idle,
            completed: 0,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Number of actions dispatched so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn print_summary(&self) {
        let meta = &self.session.metadata;
        println!("\n{}", "=".repeat(60));
        println!("Session Replay: {}", meta.session_name);
        println!("{}", "=".repeat(60));
        println!("Start Time: {}", meta.start_time.to_rfc3339());
        println!("Duration: {:.2}s", meta.duration_seconds.unwrap_or(0.0));
        println!("Total Actions: {}", meta.total_actions);
        println!("Total Anomalies: {}", meta.total_anomalies);
        println!("Crashed: {}", meta.crashed);
        println!("Playback Speed: {}x", self.playback_speed);

        if !self.session.anomalies.is_empty() {
            println!("\nAnomalies detected:");
            for (i, anomaly) in self.session.anomalies.iter().enumerate() {
                println!(
                    "  {}. [{}] at {:.2}s",
                    i + 1,
                    anomaly.kind.as_str(),
                    anomaly.timestamp
                );
                println!("     {}", anomaly.description);
            }
        }
        println!("{}\n", "=".repeat(60));
    }

    /// Re-issue the recorded actions at scaled relative timing.
    ///
    /// Wait time is computed against absolute elapsed time each iteration,
    /// so per-dispatch overhead never compounds into schedule drift. A
    /// record that is already behind schedule dispatches immediately.
    pub async fn replay(
        &mut self,
        sink: &mut dyn InputSink,
        target_hint: Option<&str>,
        start_delay_secs: f64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.print_summary();

        if let Some(title) = target_hint {
            println!("Target window: {title}");
        }
        println!("Replay will start in {start_delay_secs} seconds...");
        println!("Press Ctrl+C to stop replay at any time.");

        self.state = ReplayState::Waiting;
        self.completed = 0;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(start_delay_secs.max(0.0))) => {}
            _ = cancel.cancelled() => {
                self.finish(true);
                return Ok(());
            }
        }

        println!("\nStarting replay...");
        self.state = ReplayState::Replaying;
        let start = Instant::now();
        let total = self.session.actions.len();

        for i in 0..total {
            if cancel.is_cancelled() {
                self.finish(true);
                return Ok(());
            }

            let target_offset = self.session.actions[i].timestamp / self.playback_speed;
            let elapsed = start.elapsed().as_secs_f64();
            if target_offset > elapsed {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs_f64(target_offset - elapsed)) => {}
                    _ = cancel.cancelled() => {
                        self.finish(true);
                        return Ok(());
                    }
                }
            }

            let record = &self.session.actions[i];
            let Some(action) = ActionType::from_tag(&record.action_type) else {
                warn!("Unknown action type: {}", record.action_type);
                continue;
            };

            if let Err(err) = sink.execute(action, &record.action_data).await {
                warn!("action {i} ({}) failed: {err}", record.action_type);
            }
            self.completed += 1;

            if (i + 1) % 50 == 0 {
                println!("Progress: {}/{} actions replayed", i + 1, total);
            }
        }

        self.finish(false);
        Ok(())
    }

    fn finish(&mut self, interrupted: bool) {
        self.state = if interrupted {
            ReplayState::Interrupted
        } else {
            ReplayState::Finished
        };
        if interrupted {
            println!("\nReplay interrupted.");
        }
        println!(
            "\nReplay finished. Executed {}/{} actions.",
            self.completed,
            self.session.actions.len()
        );
    }

    /// Stitch the persisted action screenshots into a video via ffmpeg.
    /// Reports and returns without output when there is nothing to encode.
    pub fn export_video(&self, output_path: Option<PathBuf>, fps: u32) -> Result<()> {
        let screenshots_dir = self.session_dir.join(SCREENSHOTS_DIRNAME);
        if !screenshots_dir.is_dir() {
            println!("No screenshots directory found. Cannot create video.");
            return Ok(());
        }

        let mut frames: Vec<PathBuf> = std::fs::read_dir(&screenshots_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("frame_") && n.ends_with(".png"))
            })
            .collect();
        frames.sort();

        if frames.is_empty() {
            println!("No screenshots found. Cannot create video.");
            return Ok(());
        }

        let output = output_path.unwrap_or_else(|| self.session_dir.join("replay_video.mp4"));
        let fps = fps.max(1);

        // ffmpeg's concat demuxer takes a listing with per-frame durations.
        let mut listing = String::from("ffconcat version 1.0\n");
        for frame in &frames {
            listing.push_str(&format!("file '{}'\n", frame.display()));
            listing.push_str(&format!("duration {:.6}\n", 1.0 / fps as f64));
        }
        let list_path = self.session_dir.join("frames.ffconcat");
        std::fs::write(&list_path, listing)
            .with_context(|| format!("failed to write {}", list_path.display()))?;

        println!("Creating video from {} screenshots...", frames.len());
        let status = Command::new("ffmpeg")
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-fps_mode", "cfr", "-r", &fps.to_string(), "-pix_fmt", "yuv420p"])
            .arg(&output)
            .status()
            .context("failed to run ffmpeg, is it installed?");

        let _ = std::fs::remove_file(&list_path);
        let status = status?;
        if !status.success() {
            bail!("ffmpeg exited with {status}");
        }

        println!("Video saved: {}", output.display());
        Ok(())
    }

    /// First action at or after `timestamp`, in recorded order.
    pub fn action_at_or_after(&self, timestamp: f64) -> Option<&ActionRecord> {
        self.session
            .actions
            .iter()
            .find(|action| action.timestamp >= timestamp)
    }

    /// All anomalies whose timestamp falls in the closed interval
    /// `[start, end]`, in original order.
    pub fn anomalies_in_range(&self, start: f64, end: f64) -> Vec<&AnomalyRecord> {
        self.session
            .anomalies
            .iter()
            .filter(|anomaly| anomaly.timestamp >= start && anomaly.timestamp <= end)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{AnomalyKind, SessionMetadata, Severity};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{Map, Value};
    use std::fs;
    use tempfile::TempDir;

    fn action(ts: f64, n: u64, tag: &str, data: Map<String, Value>) -> ActionRecord {
        ActionRecord {
            timestamp: ts,
            frame_number: n,
            action_type: tag.to_string(),
            action_data: data,
            screenshot: None,
        }
    }

    fn anomaly(ts: f64) -> AnomalyRecord {
        AnomalyRecord {
            timestamp: ts,
            frame_number: 0,
            kind: AnomalyKind::Softlock,
            description: "stuck".into(),
            severity: Severity::High,
            ssim: None,
            screenshot: None,
        }
    }

    fn write_session(dir: &Path, actions: Vec<ActionRecord>, anomalies: Vec<AnomalyRecord>) {
        let mut metadata = SessionMetadata::new("replay_test".into(), Utc::now());
        metadata.total_actions = actions.len() as u64;
        metadata.total_anomalies = anomalies.len() as u64;
        metadata.duration_seconds = Some(actions.last().map(|a| a.timestamp).unwrap_or(0.0));
        metadata.end_time = Some(Utc::now());
        let session = Session {
            metadata,
            actions,
            anomalies,
        };
        fs::write(
            dir.join("replay.json"),
            serde_json::to_string_pretty(&session).unwrap(),
        )
        .unwrap();
    }

    /// Records the relative offset of every dispatched action, optionally
    /// burning time per dispatch to exercise drift correction.
    struct ProbeSink {
        started: Instant,
        overhead: Duration,
        dispatched: Vec<(ActionType, f64)>,
    }

    impl ProbeSink {
        fn new(overhead: Duration) -> Self {
            Self {
                started: Instant::now(),
                overhead,
                dispatched: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl InputSink for ProbeSink {
        async fn execute(&mut self, action: ActionType, _params: &Map<String, Value>) -> Result<()> {
            self.dispatched
                .push((action, self.started.elapsed().as_secs_f64()));
            if !self.overhead.is_zero() {
                tokio::time::sleep(self.overhead).await;
            }
            Ok(())
        }
    }

    fn timed_actions() -> Vec<ActionRecord> {
        vec![
            action(0.0, 0, "key_tap", Map::new()),
            action(1.0, 1, "key_tap", Map::new()),
            action(2.0, 2, "key_tap", Map::new()),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn double_speed_halves_the_schedule() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), timed_actions(), vec![]);

        let mut engine = ReplayEngine::new(dir.path(), 2.0).unwrap();
        let mut sink = ProbeSink::new(Duration::ZERO);
        engine
            .replay(&mut sink, None, 0.0, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(engine.state(), ReplayState::Finished);
        assert_eq!(engine.completed(), 3);
        let offsets: Vec<f64> = sink.dispatched.iter().map(|(_, t)| *t).collect();
        for (got, want) in offsets.iter().zip([0.0, 0.5, 1.0]) {
            assert!(
                (got - want).abs() < 0.02,
                "dispatch offsets {offsets:?}, wanted [0.0, 0.5, 1.0]"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_overhead_does_not_compound() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), timed_actions(), vec![]);

        let mut engine = ReplayEngine::new(dir.path(), 2.0).unwrap();
        // 0.3s of overhead per dispatch still leaves each action on time.
        let mut sink = ProbeSink::new(Duration::from_millis(300));
        engine
            .replay(&mut sink, None, 0.0, &CancellationToken::new())
            .await
            .unwrap();

        let offsets: Vec<f64> = sink.dispatched.iter().map(|(_, t)| *t).collect();
        for (got, want) in offsets.iter().zip([0.0, 0.5, 1.0]) {
            assert!(
                (got - want).abs() < 0.02,
                "dispatch offsets {offsets:?}, wanted [0.0, 0.5, 1.0]"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_records_dispatch_immediately_without_catching_down() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), timed_actions(), vec![]);

        let mut engine = ReplayEngine::new(dir.path(), 2.0).unwrap();
        // Overhead longer than the inter-action gap: the second action is
        // late and fires at once; the third is back on the absolute clock.
        let mut sink = ProbeSink::new(Duration::from_millis(600));
        engine
            .replay(&mut sink, None, 0.0, &CancellationToken::new())
            .await
            .unwrap();

        let offsets: Vec<f64> = sink.dispatched.iter().map(|(_, t)| *t).collect();
        assert!((offsets[0] - 0.0).abs() < 0.02, "offsets {offsets:?}");
        assert!((offsets[1] - 0.6).abs() < 0.02, "offsets {offsets:?}");
        assert!((offsets[2] - 1.2).abs() < 0.02, "offsets {offsets:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_tags_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            vec![
                action(0.0, 0, "key_tap", Map::new()),
                action(0.1, 1, "teleport", Map::new()),
                action(0.2, 2, "ActionType.WAIT", Map::new()),
                action(0.3, 3, "mouse_click", Map::new()),
            ],
            vec![],
        );

        let mut engine = ReplayEngine::new(dir.path(), 1.0).unwrap();
        let mut sink = ProbeSink::new(Duration::ZERO);
        engine
            .replay(&mut sink, None, 0.0, &CancellationToken::new())
            .await
            .unwrap();

        let kinds: Vec<ActionType> = sink.dispatched.iter().map(|(a, _)| *a).collect();
        assert_eq!(
            kinds,
            vec![ActionType::KeyTap, ActionType::Wait, ActionType::MouseClick]
        );
        assert_eq!(engine.completed(), 3);
        assert_eq!(engine.state(), ReplayState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_and_reports_partial_progress() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), timed_actions(), vec![]);

        let mut engine = ReplayEngine::new(dir.path(), 1.0).unwrap();
        let mut sink = ProbeSink::new(Duration::ZERO);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        engine.replay(&mut sink, None, 0.0, &cancel).await.unwrap();

        assert_eq!(engine.state(), ReplayState::Interrupted);
        assert_eq!(engine.completed(), 2);
        assert_eq!(sink.dispatched.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_the_start_delay_runs_nothing() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), timed_actions(), vec![]);

        let mut engine = ReplayEngine::new(dir.path(), 1.0).unwrap();
        let mut sink = ProbeSink::new(Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        engine.replay(&mut sink, None, 3.0, &cancel).await.unwrap();
        assert_eq!(engine.state(), ReplayState::Interrupted);
        assert_eq!(engine.completed(), 0);
        assert!(sink.dispatched.is_empty());
    }

    #[test]
    fn queries_respect_order_and_closed_intervals() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            timed_actions(),
            vec![anomaly(0.5), anomaly(1.0), anomaly(2.5)],
        );

        let engine = ReplayEngine::new(dir.path(), 1.0).unwrap();
        assert_eq!(engine.state(), ReplayState::Idle);

        assert_eq!(engine.action_at_or_after(0.5).unwrap().frame_number, 1);
        assert_eq!(engine.action_at_or_after(2.0).unwrap().frame_number, 2);
        assert!(engine.action_at_or_after(9.0).is_none());

        let in_range = engine.anomalies_in_range(0.5, 1.0);
        assert_eq!(in_range.len(), 2);
        assert_eq!(in_range[0].timestamp, 0.5);
        assert_eq!(in_range[1].timestamp, 1.0);
        assert!(engine.anomalies_in_range(3.0, 4.0).is_empty());
    }

    #[test]
    fn rejects_nonpositive_playback_speed() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), vec![], vec![]);
        assert!(ReplayEngine::new(dir.path(), 0.0).is_err());
        assert!(ReplayEngine::new(dir.path(), -1.0).is_err());
    }

    #[test]
    fn export_video_without_screenshots_is_a_graceful_no_op() {
        let dir = TempDir::new().unwrap();
        write_session(dir.path(), vec![], vec![]);
        let engine = ReplayEngine::new(dir.path(), 1.0).unwrap();

        // No screenshots directory at all.
        engine.export_video(None, 10).unwrap();
        assert!(!dir.path().join("replay_video.mp4").exists());

        // Directory present but empty.
        fs::create_dir(dir.path().join("screenshots")).unwrap();
        engine.export_video(None, 10).unwrap();
        assert!(!dir.path().join("replay_video.mp4").exists());
    }
}
