//! Session record/replay: the data model, the append-only recorder and the
//! timing-faithful replay engine.

mod model;
mod recorder;
mod replay;

pub use model::{
    ActionRecord, ActionType, AnomalyKind, AnomalyRecord, CrashInfo, Session, SessionMetadata,
    Severity, SCREENSHOTS_DIRNAME, SESSION_LOG_FILENAME,
};
pub use recorder::SessionRecorder;
pub use replay::{ReplayEngine, ReplayState};
