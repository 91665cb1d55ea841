//! Per-conversation history with explicit expiry

pub mod error;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use store::{
    generate_session_id, validate_session_id, Clock, ManualClock, SessionStore, SystemClock,
};
pub use types::{ExportFormat, Session, SessionStatus, Turn, TurnRole};
