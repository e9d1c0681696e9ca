//! playtest CLI.
//!
//! Usage:
//!   playtest run --window "Game Title"          # exercise + record
//!   playtest replay --repro repro/session_x     # re-issue recorded input
//!   playtest export-video --repro repro/session_x
//!   playtest analyze --session repro/session_x --verbose

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use playtest::agent::{Agent, AgentConfig, RandomPolicy};
use playtest::capture::ScreenGrabber;
use playtest::config::{DEFAULT_FPS, DEFAULT_MAX_STEPS, OUTPUT_DIR};
use playtest::input::EnigoInjector;
use playtest::session::{ReplayEngine, Session, SCREENSHOTS_DIRNAME};

#[derive(Parser, Debug)]
#[command(
    name = "playtest",
    version,
    about = "Black-box game exerciser: capture, poke, detect anomalies, replay"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exercise a game window with synthetic input and record the session
    Run {
        /// Game window title to target (substring match)
        #[arg(long)]
        window: String,

        /// Agent type to use
        #[arg(long, default_value = "random")]
        agent: String,

        /// Maximum number of steps to run
        #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
        steps: u64,

        /// Frame capture rate in FPS
        #[arg(long, default_value_t = DEFAULT_FPS)]
        fps: u32,

        /// Custom session name (default: auto-generated)
        #[arg(long)]
        session_name: Option<String>,

        /// Custom key list for the random agent (e.g. w a s d space)
        #[arg(long, num_args = 1..)]
        keys: Option<Vec<String>>,

        /// Output directory for session artifacts
        #[arg(long, default_value = OUTPUT_DIR)]
        output_dir: PathBuf,
    },

    /// Reproduce a recorded session by re-issuing its input
    Replay {
        /// Path to a session directory or its replay.json
        #[arg(long)]
        repro: PathBuf,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Target window title (informational)
        #[arg(long)]
        window: Option<String>,

        /// Delay before starting replay in seconds
        #[arg(long, default_value_t = 3.0)]
        delay: f64,
    },

    /// Stitch a session's screenshots into a video (requires ffmpeg)
    ExportVideo {
        /// Path to a session directory or its replay.json
        #[arg(long)]
        repro: PathBuf,

        /// Output video path (default: <session>/replay_video.mp4)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Frame rate of the exported video
        #[arg(long, default_value_t = 10)]
        fps: u32,
    },

    /// Print an operator report for a recorded session
    Analyze {
        /// Path to a session directory or its replay.json
        #[arg(long)]
        session: PathBuf,

        /// Show the detailed action list
        #[arg(long)]
        verbose: bool,
    },
}

fn spawn_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            window,
            agent,
            steps,
            fps,
            session_name,
            keys,
            output_dir,
        } => run(window, agent, steps, fps, session_name, keys, output_dir).await,
        Command::Replay {
            repro,
            speed,
            window,
            delay,
        } => replay(repro, speed, window, delay).await,
        Command::ExportVideo { repro, output, fps } => {
            ReplayEngine::new(repro, 1.0)?.export_video(output, fps)
        }
        Command::Analyze { session, verbose } => analyze(session, verbose),
    }
}

async fn run(
    window: String,
    agent_kind: String,
    steps: u64,
    fps: u32,
    session_name: Option<String>,
    keys: Option<Vec<String>>,
    output_dir: PathBuf,
) -> Result<()> {
    println!("{}", "=".repeat(60));
    println!("playtest - Automated Game Testing");
    println!("{}", "=".repeat(60));
    println!("Window: {window}");
    println!("Agent: {agent_kind}");
    println!("Steps: {steps}");
    println!("FPS: {fps}");
    println!("{}", "=".repeat(60));

    anyhow::ensure!(agent_kind == "random", "unknown agent type: {agent_kind}");

    let mut config = AgentConfig::new(window.clone());
    config.session_name = session_name;
    config.fps = fps;
    config.max_steps = steps;
    config.output_dir = output_dir;

    let mut agent = Agent::new(
        config,
        Box::new(ScreenGrabber::new(Some(window))),
        Box::new(EnigoInjector::new()?),
        Box::new(RandomPolicy::new(keys)),
    )?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(&cancel);
    agent.run(&cancel).await?;

    println!("\nFinal Statistics:");
    println!("  Steps completed: {}", agent.current_step());
    println!("  Anomalies detected: {}", agent.total_anomalies());
    println!("  Session path: {}", agent.session_path().display());
    Ok(())
}

async fn replay(repro: PathBuf, speed: f64, window: Option<String>, delay: f64) -> Result<()> {
    println!("{}", "=".repeat(60));
    println!("playtest Replay Engine");
    println!("{}", "=".repeat(60));

    let mut engine = ReplayEngine::new(repro, speed)?;
    let mut sink = EnigoInjector::new()?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(&cancel);
    engine
        .replay(&mut sink, window.as_deref(), delay, &cancel)
        .await
}

fn analyze(path: PathBuf, verbose: bool) -> Result<()> {
    let session = Session::load(&path)?;
    let meta = &session.metadata;

    let meta_str = |key: &str| match meta.extra.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "Unknown".to_string(),
    };

    println!("{}", "=".repeat(60));
    println!("Session Analysis");
    println!("{}", "=".repeat(60));
    println!("Session Name: {}", meta.session_name);
    println!("Window: {}", meta_str("window_title"));
    println!("Agent Type: {}", meta_str("agent_type"));
    println!("Start Time: {}", meta.start_time.to_rfc3339());
    println!(
        "End Time: {}",
        meta.end_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "Unknown".to_string())
    );
    println!(
        "Duration: {:.2} seconds",
        meta.duration_seconds.unwrap_or(0.0)
    );
    println!("Max Steps: {}", meta_str("max_steps"));
    println!("FPS: {}", meta_str("fps"));
    println!();
    println!("Total Actions: {}", session.actions.len());
    println!("Total Anomalies: {}", session.anomalies.len());
    println!("Crashed: {}", meta.crashed);

    if let Some(crash) = &meta.crash_info {
        println!("\nCrash Information:");
        println!("  Reason: {}", crash.reason);
        println!("  Step: {}", crash.step);
    }

    if !session.anomalies.is_empty() {
        println!("\n{}", "=".repeat(60));
        println!("Anomalies Detected:");
        println!("{}", "=".repeat(60));

        let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
        for anomaly in &session.anomalies {
            *by_kind.entry(anomaly.kind.as_str()).or_insert(0) += 1;
        }
        println!("\nSummary by Type:");
        for (kind, count) in by_kind {
            println!("  {kind}: {count}");
        }

        println!("\nDetailed List:");
        for (i, anomaly) in session.anomalies.iter().enumerate() {
            println!("\n  {}. Type: {}", i + 1, anomaly.kind.as_str());
            println!("     Time: {:.2}s", anomaly.timestamp);
            println!("     Frame: {}", anomaly.frame_number);
            println!("     Description: {}", anomaly.description);
            println!("     Severity: {}", anomaly.severity.as_str());
            if let Some(screenshot) = &anomaly.screenshot {
                println!("     Screenshot: {screenshot}");
            }
        }
    }

    if verbose && !session.actions.is_empty() {
        println!("\n{}", "=".repeat(60));
        println!("Action List:");
        println!("{}", "=".repeat(60));

        let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
        for action in &session.actions {
            *by_type.entry(action.action_type.as_str()).or_insert(0) += 1;
        }
        println!("\nSummary by Type:");
        for (action_type, count) in by_type {
            println!("  {action_type}: {count}");
        }

        println!("\nFirst 20 Actions:");
        for (i, action) in session.actions.iter().take(20).enumerate() {
            println!(
                "  {}. [{:.2}s] {}: {}",
                i + 1,
                action.timestamp,
                action.action_type,
                serde_json::Value::Object(action.action_data.clone())
            );
        }
        if session.actions.len() > 20 {
            println!("\n  ... and {} more actions", session.actions.len() - 20);
        }
    }

    let screenshots_dir = Session::resolve_session_dir(&path).join(SCREENSHOTS_DIRNAME);
    if screenshots_dir.is_dir() {
        let count = std::fs::read_dir(&screenshots_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
            })
            .count();
        println!("\nScreenshots captured: {count}");
    }

    println!("\n{}", "=".repeat(60));
    println!("Analysis Complete");
    println!("{}", "=".repeat(60));
    Ok(())
}
