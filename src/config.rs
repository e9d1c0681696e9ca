//! Default tuning values shared by the agent, analyzer and recorder.

pub const DEFAULT_FPS: u32 = 10;
pub const DEFAULT_MAX_STEPS: u64 = 1000;
pub const DEFAULT_SSIM_THRESHOLD: f64 = 0.95;
pub const DEFAULT_SOFTLOCK_THRESHOLD: u32 = 30;
pub const DEFAULT_SCREENSHOT_INTERVAL: u64 = 10;
pub const OUTPUT_DIR: &str = "repro";

/// Keys the random policy samples from when no custom list is given.
pub const DEFAULT_GAME_KEYS: &[&str] = &[
    "w", "a", "s", "d", "up", "down", "left", "right", "space",
];

/// Fuller key set for policies that want menus and hotbars covered too.
pub const COMMON_GAME_KEYS: &[&str] = &[
    "w", "a", "s", "d", "up", "down", "left", "right", "space", "shift",
    "ctrl", "e", "q", "r", "f", "1", "2", "3", "4", "escape", "enter",
];

/// Thresholds for the streaming anomaly detector.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Similarity above this counts the frame as static.
    pub ssim_threshold: f64,
    /// Consecutive static frames before a softlock is reported.
    pub softlock_threshold: u32,
    /// Frames retained in the lookback buffer.
    pub max_history: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            ssim_threshold: DEFAULT_SSIM_THRESHOLD,
            softlock_threshold: DEFAULT_SOFTLOCK_THRESHOLD,
            max_history: 10,
        }
    }
}
