mod environment;
mod history;
mod id;
mod manager;
mod persistence;
mod progress;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use environment::EnvironmentProbe;
pub use history::{SessionHistoryItem, SessionHistoryService};
pub use manager::SessionManager;
pub use persistence::{CURRENT_SESSION_SLOT, HISTORY_LIMIT, SESSION_HISTORY_SLOT, SessionPersistence};
pub use progress::SessionProgress;
