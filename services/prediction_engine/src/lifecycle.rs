use serde::{Deserialize, Serialize};

/// Feed codes for fixtures that have not kicked off yet.
pub const NOT_STARTED_CODES: &[&str] = &["TBD", "NS"];

/// Feed codes for fixtures that are being played right now.
pub const LIVE_CODES: &[&str] = &["1H", "HT", "2H", "ET", "BT", "P", "INT", "LIVE"];

/// Feed codes for fixtures with a final result.
pub const FINISHED_CODES: &[&str] = &["FT", "AET", "PEN"];

/// Fixtures with these codes are never stored as matches.
pub const DISCARDED_CODES: &[&str] = &["PST", "CANC", "ABD"];

/// Codes after which the feed will not change the fixture anymore.
pub const TERMINAL_CODES: &[&str] = &["FT", "AET", "PEN", "PST", "CANC", "ABD", "AWD", "WO"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted = 1,
    InProgress = 2,
    Finished = 3,
}

impl LifecycleState {
    pub fn accepts_predictions(self) -> bool {
        self == LifecycleState::NotStarted
    }
}

/// Maps a raw feed status code onto a lifecycle state.
///
/// Unrecognised codes fall back to `NotStarted` so that an unexpected value
/// can never trigger scoring.
pub fn classify(code: &str) -> LifecycleState {
    let code = code.trim();
    if LIVE_CODES.contains(&code) {
        LifecycleState::InProgress
    } else if FINISHED_CODES.contains(&code) {
        LifecycleState::Finished
    } else {
        LifecycleState::NotStarted
    }
}

pub fn is_finished_code(code: &str) -> bool {
    classify(code) == LifecycleState::Finished
}

pub fn is_discarded_code(code: &str) -> bool {
    DISCARDED_CODES.contains(&code.trim())
}
