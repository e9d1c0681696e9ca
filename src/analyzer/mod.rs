//! Streaming visual anomaly detection over captured frames.
//!
//! The detector consumes one frame per driving-loop step, scores it against
//! the previous frame and reports softlocks (prolonged staticness) and large
//! sudden changes. Auxiliary pure helpers (template search, perceptual
//! hashing, edge maps) are exposed for custom policies and consume no
//! streaming state.

mod edges;
mod phash;
mod ssim;
mod template;

pub use edges::detect_edges;
pub use phash::{compute_phash, hash_distance};
pub use ssim::ssim;
pub use template::{match_template, TemplateMatch};

use std::collections::VecDeque;

use crate::config::AnalyzerConfig;
use crate::frame::{mean_abs_diff, to_gray, Frame};
use crate::session::{AnomalyKind, Severity};

/// One anomaly as seen by the detector. The recorder later stamps it with a
/// timestamp, frame number and optional screenshot path.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub description: String,
    pub severity: Severity,
    /// Similarity score at detection time, for change anomalies.
    pub ssim: Option<f64>,
}

/// Per-frame scoring output.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    /// Structural similarity to the previous frame, absent on the first
    /// frame or a dimension change.
    pub ssim_score: Option<f64>,
    /// Mean absolute intensity difference to the previous frame.
    pub frame_difference: Option<f64>,
    /// Whether this frame counted toward the static streak.
    pub is_static: bool,
    pub anomalies: Vec<Anomaly>,
}

/// Snapshot of the detector's streaming state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerStats {
    pub static_streak: u32,
    pub history_len: usize,
    pub ssim_threshold: f64,
    pub softlock_threshold: u32,
}

/// Large-change gate: both conditions must hold.
const CHANGE_SSIM_CEILING: f64 = 0.5;
const CHANGE_DIFF_FLOOR: f64 = 50.0;

pub struct Analyzer {
    config: AnalyzerConfig,
    previous_frame: Option<Frame>,
    previous_gray: Option<image::GrayImage>,
    static_streak: u32,
    history: VecDeque<Frame>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            previous_frame: None,
            previous_gray: None,
            static_streak: 0,
            history: VecDeque::new(),
        }
    }

    /// Score `frame` against the previous one and roll the detector state
    /// forward. An absent frame returns an empty result and mutates nothing.
    pub fn analyze(&mut self, frame: Option<&Frame>) -> AnalysisResult {
        let Some(frame) = frame else {
            return AnalysisResult::default();
        };

        let mut result = AnalysisResult::default();
        let gray = to_gray(frame);

        // A dimension change is treated as having no previous frame: no
        // scores, no anomalies, streak untouched.
        if let Some(prev_gray) = self
            .previous_gray
            .as_ref()
            .filter(|p| p.dimensions() == gray.dimensions())
        {
            let score = ssim(prev_gray, &gray);
            result.ssim_score = Some(score);
            result.frame_difference = Some(mean_abs_diff(prev_gray, &gray));

            if score > self.config.ssim_threshold {
                self.static_streak += 1;
                result.is_static = true;
            } else {
                self.static_streak = 0;
            }

            // No re-arm: an unresolved softlock is reported again on every
            // subsequent frame until similarity drops.
            if self.static_streak >= self.config.softlock_threshold {
                result.anomalies.push(Anomaly {
                    kind: AnomalyKind::Softlock,
                    description: format!(
                        "Frame unchanged for {} captures",
                        self.static_streak
                    ),
                    severity: Severity::High,
                    ssim: None,
                });
            }

            if score < CHANGE_SSIM_CEILING
                && result.frame_difference.is_some_and(|d| d > CHANGE_DIFF_FLOOR)
            {
                result.anomalies.push(Anomaly {
                    kind: AnomalyKind::VisualChange,
                    description: "Large visual change detected".to_string(),
                    severity: Severity::Medium,
                    ssim: Some(score),
                });
            }
        }

        self.previous_frame = Some(frame.clone());
        self.previous_gray = Some(gray);

        self.history.push_back(frame.clone());
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }

        result
    }

    /// Drop the comparison baseline, e.g. after a deliberate scene
    /// transition. Thresholds are untouched.
    pub fn reset(&mut self) {
        self.previous_frame = None;
        self.previous_gray = None;
        self.static_streak = 0;
        self.history.clear();
    }

    pub fn stats(&self) -> AnalyzerStats {
        AnalyzerStats {
            static_streak: self.static_streak,
            history_len: self.history.len(),
            ssim_threshold: self.config.ssim_threshold,
            softlock_threshold: self.config.softlock_threshold,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
