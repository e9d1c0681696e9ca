//! Synthetic input injection.
//!
//! `InputSink` is the narrow port the agent and the replay engine dispatch
//! through; `EnigoInjector` is the OS-backed implementation. Injection
//! failures are reported, never propagated; a flaky key event should not
//! end a session.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use log::warn;
use serde_json::{Map, Value};

use crate::session::ActionType;

/// Executes one primitive action described by a type tag plus named
/// parameters. Unknown parameter keys are ignored; missing ones fall back to
/// defaults.
#[async_trait]
pub trait InputSink {
    async fn execute(&mut self, action: ActionType, params: &Map<String, Value>) -> Result<()>;
}

fn param_str<'a>(params: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn param_f64(params: &Map<String, Value>, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn param_i32(params: &Map<String, Value>, key: &str) -> Option<i32> {
    params.get(key).and_then(Value::as_i64).map(|v| v as i32)
}

/// Key name → enigo key, covering the common game keys. Single characters
/// pass through as unicode input.
fn resolve_key(name: &str) -> Option<Key> {
    let key = match name.to_ascii_lowercase().as_str() {
        "space" => Key::Space,
        "enter" | "return" => Key::Return,
        "escape" | "esc" => Key::Escape,
        "shift" => Key::Shift,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "tab" => Key::Tab,
        "backspace" => Key::Backspace,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        other => {
            let mut chars = other.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Key::Unicode(c)
        }
    };
    Some(key)
}

fn resolve_button(name: &str) -> Button {
    match name.to_ascii_lowercase().as_str() {
        "right" => Button::Right,
        "middle" => Button::Middle,
        _ => Button::Left,
    }
}

pub struct EnigoInjector {
    enigo: Enigo,
}

impl EnigoInjector {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|err| anyhow::anyhow!("failed to initialize input backend: {err}"))?;
        Ok(Self { enigo })
    }

    fn key_event(&mut self, name: &str, direction: Direction) {
        let Some(key) = resolve_key(name) else {
            warn!("unknown key name '{name}', skipping");
            return;
        };
        if let Err(err) = self.enigo.key(key, direction) {
            warn!("key event '{name}' failed: {err}");
        }
    }

    async fn move_mouse(&mut self, x: i32, y: i32, duration: f64) {
        // Interpolate toward the target so the move takes roughly the
        // recorded duration instead of teleporting.
        const STEPS: u32 = 12;
        let start = self.enigo.location().unwrap_or((x, y));
        for i in 1..=STEPS {
            let t = i as f64 / STEPS as f64;
            let px = start.0 + ((x - start.0) as f64 * t) as i32;
            let py = start.1 + ((y - start.1) as f64 * t) as i32;
            if let Err(err) = self.enigo.move_mouse(px, py, Coordinate::Abs) {
                warn!("mouse move failed: {err}");
                return;
            }
            tokio::time::sleep(Duration::from_secs_f64(duration.max(0.0) / STEPS as f64)).await;
        }
    }
}

#[async_trait]
impl InputSink for EnigoInjector {
    async fn execute(&mut self, action: ActionType, params: &Map<String, Value>) -> Result<()> {
        match action {
            ActionType::KeyPress => {
                let key = param_str(params, "key", "space").to_string();
                let duration = param_f64(params, "duration", 0.1);
                self.key_event(&key, Direction::Press);
                tokio::time::sleep(Duration::from_secs_f64(duration.max(0.0))).await;
                self.key_event(&key, Direction::Release);
            }
            ActionType::KeyRelease => {
                let key = param_str(params, "key", "space").to_string();
                self.key_event(&key, Direction::Release);
            }
            ActionType::KeyTap => {
                let key = param_str(params, "key", "space").to_string();
                self.key_event(&key, Direction::Click);
            }
            ActionType::MouseMove => {
                let x = param_i32(params, "x").unwrap_or(0);
                let y = param_i32(params, "y").unwrap_or(0);
                let duration = param_f64(params, "duration", 0.1);
                self.move_mouse(x, y, duration).await;
            }
            ActionType::MouseClick => {
                let button = resolve_button(param_str(params, "button", "left"));
                if let (Some(x), Some(y)) = (param_i32(params, "x"), param_i32(params, "y")) {
                    if let Err(err) = self.enigo.move_mouse(x, y, Coordinate::Abs) {
                        warn!("mouse move before click failed: {err}");
                    }
                }
                if let Err(err) = self.enigo.button(button, Direction::Click) {
                    warn!("mouse click failed: {err}");
                }
            }
            ActionType::Wait => {
                let duration = param_f64(params, "duration", 0.5);
                tokio::time::sleep(Duration::from_secs_f64(duration.max(0.0))).await;
            }
        }
        Ok(())
    }
}
