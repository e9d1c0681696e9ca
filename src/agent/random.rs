//! The bundled random exerciser policy.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::agent::DecisionPolicy;
use crate::analyzer::AnalysisResult;
use crate::config::DEFAULT_GAME_KEYS;
use crate::frame::Frame;
use crate::session::ActionType;

/// Picks uniformly among a short key press, a key tap and a wait. No game
/// state is consulted; this is a pure fuzzing policy.
pub struct RandomPolicy {
    keys: Vec<String>,
    rng: rand::rngs::ThreadRng,
}

impl RandomPolicy {
    pub fn new(keys: Option<Vec<String>>) -> Self {
        let keys = keys.unwrap_or_else(|| {
            DEFAULT_GAME_KEYS.iter().map(|k| k.to_string()).collect()
        });
        Self {
            keys,
            rng: rand::thread_rng(),
        }
    }

    fn random_key(&mut self) -> String {
        self.keys
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| "space".to_string())
    }
}

impl DecisionPolicy for RandomPolicy {
    fn decide(&mut self, _frame: &Frame, _analysis: &AnalysisResult) -> (ActionType, Map<String, Value>) {
        let mut params = Map::new();
        match self.rng.gen_range(0..3) {
            0 => {
                params.insert("key".into(), json!(self.random_key()));
                params.insert("duration".into(), json!(self.rng.gen_range(0.05..0.3)));
                (ActionType::KeyPress, params)
            }
            1 => {
                params.insert("key".into(), json!(self.random_key()));
                (ActionType::KeyTap, params)
            }
            _ => {
                params.insert("duration".into(), json!(self.rng.gen_range(0.1..0.5)));
                (ActionType::Wait, params)
            }
        }
    }

    fn metadata(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("agent_type", json!("random")),
            ("action_keys", json!(self.keys)),
        ]
    }
}
