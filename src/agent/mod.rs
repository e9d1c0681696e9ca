//! The driving loop. Capture, analyze, decide, inject and record once per
//! step, strictly sequential, with cooperative cancellation at the loop
//! boundary.

mod random;

pub use random::RandomPolicy;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use log::warn;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::analyzer::{AnalysisResult, Analyzer};
use crate::capture::FrameSource;
use crate::config::{AnalyzerConfig, DEFAULT_FPS, DEFAULT_MAX_STEPS, OUTPUT_DIR};
use crate::frame::Frame;
use crate::input::InputSink;
use crate::process::ProcessWatch;
use crate::session::{ActionType, CrashInfo, SessionRecorder};

/// Chooses the next action from the current frame and its analysis. The
/// narrow seam that lets scripted or future learned policies swap in
/// without touching the loop.
pub trait DecisionPolicy {
    fn decide(&mut self, frame: &Frame, analysis: &AnalysisResult) -> (ActionType, Map<String, Value>);

    /// Descriptive fields stamped into session metadata at startup.
    fn metadata(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }
}

pub struct AgentConfig {
    pub window_title: String,
    pub session_name: Option<String>,
    pub fps: u32,
    pub max_steps: u64,
    pub output_dir: PathBuf,
}

impl AgentConfig {
    pub fn new(window_title: impl Into<String>) -> Self {
        Self {
            window_title: window_title.into(),
            session_name: None,
            fps: DEFAULT_FPS,
            max_steps: DEFAULT_MAX_STEPS,
            output_dir: PathBuf::from(OUTPUT_DIR),
        }
    }
}

/// Backoff after a failed capture before the loop tries again.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Settle time between process discovery and the first capture.
const STARTUP_DELAY: Duration = Duration::from_secs(2);

pub struct Agent {
    window_title: String,
    max_steps: u64,
    current_step: u64,
    source: Box<dyn FrameSource>,
    sink: Box<dyn InputSink>,
    policy: Box<dyn DecisionPolicy>,
    analyzer: Analyzer,
    recorder: SessionRecorder,
    watch: ProcessWatch,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        mut source: Box<dyn FrameSource>,
        sink: Box<dyn InputSink>,
        policy: Box<dyn DecisionPolicy>,
    ) -> Result<Self> {
        source.set_fps_cap(config.fps);

        let mut recorder = SessionRecorder::new(config.session_name, &config.output_dir)?;
        recorder.set_metadata("window_title", json!(config.window_title));
        recorder.set_metadata("max_steps", json!(config.max_steps));
        recorder.set_metadata("fps", json!(config.fps));
        for (key, value) in policy.metadata() {
            recorder.set_metadata(key, value);
        }

        let watch = ProcessWatch::find(&config.window_title);

        Ok(Self {
            window_title: config.window_title,
            max_steps: config.max_steps,
            current_step: 0,
            source,
            sink,
            policy,
            analyzer: Analyzer::new(AnalyzerConfig::default()),
            recorder,
            watch,
        })
    }

    /// Run the driving loop to the step budget, a crash, or cancellation,
    /// then finalize and save the session. Returns the saved log path.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<PathBuf> {
        println!("Starting agent for window: {}", self.window_title);
        println!("Session: {}", self.recorder.session_name());
        println!("Max steps: {}", self.max_steps);

        tokio::select! {
            _ = tokio::time::sleep(STARTUP_DELAY) => {}
            _ = cancel.cancelled() => {}
        }

        while self.current_step < self.max_steps && !cancel.is_cancelled() {
            if !self.watch.is_alive() {
                println!("\n[CRASH] Game process terminated!");
                self.recorder.log_crash(CrashInfo {
                    reason: "Process terminated".into(),
                    step: self.current_step,
                });
                break;
            }

            match self.step(cancel).await {
                Ok(()) => {}
                Err(err) => {
                    // Loop-boundary conversion: an unexpected failure becomes
                    // a crash record and the session still gets saved.
                    println!("\n[ERROR] {err}");
                    self.recorder.log_crash(CrashInfo {
                        reason: err.to_string(),
                        step: self.current_step,
                    });
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            println!("\nInterrupted by user");
        }

        self.stop()
    }

    /// One driving-loop step. A failed capture backs off and returns
    /// without advancing the step counter.
    async fn step(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(frame) = self.source.capture().await else {
            warn!("Failed to capture frame");
            tokio::select! {
                _ = tokio::time::sleep(CAPTURE_RETRY_DELAY) => {}
                _ = cancel.cancelled() => {}
            }
            return Ok(());
        };

        let analysis = self.analyzer.analyze(Some(&frame));
        for anomaly in &analysis.anomalies {
            self.recorder.log_anomaly(anomaly.clone(), Some(&frame));
        }

        let (action, params) = self.policy.decide(&frame, &analysis);

        // Injection failures count as attempted; they never end the session.
        if let Err(err) = self.sink.execute(action, &params).await {
            warn!("input injection failed: {err}");
        }

        self.recorder.log_action(action, params, Some(&frame));
        self.current_step += 1;

        if self.current_step % 100 == 0 {
            println!(
                "Step {}/{} - Anomalies: {}",
                self.current_step,
                self.max_steps,
                self.recorder.anomalies().len()
            );
        }
        Ok(())
    }

    /// Finalize the session. Runs on every exit path of [`Agent::run`].
    fn stop(&mut self) -> Result<PathBuf> {
        println!("\nStopping agent...");
        let log_path = self.recorder.save()?;
        println!("Replay saved: {}", log_path.display());
        Ok(log_path)
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    pub fn total_anomalies(&self) -> usize {
        self.recorder.anomalies().len()
    }

    pub fn session_path(&self) -> &Path {
        self.recorder.session_path()
    }
}
