pub mod config;
pub mod records;
pub mod state;

pub use config::SessionConfig;
pub use records::{AnswerEvaluation, AnswerRecord, SessionResult};
pub use state::SessionState;
