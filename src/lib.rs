//! Black-box game exerciser.
//!
//! Captures a target application's frames at a capped rate, injects random
//! input, flags visual anomalies (softlocks, large sudden changes) and
//! records every step to a replayable `replay.json` log. The replay engine
//! re-issues the recorded input with the same relative timing and can stitch
//! captured screenshots into a video.

pub mod agent;
pub mod analyzer;
pub mod capture;
pub mod config;
pub mod frame;
pub mod input;
pub mod process;
pub mod session;

pub use agent::{Agent, AgentConfig, DecisionPolicy, RandomPolicy};
pub use analyzer::{AnalysisResult, Analyzer, Anomaly};
pub use frame::Frame;
pub use session::{ReplayEngine, Session, SessionRecorder};
