//! Persisted execution mode ("cpu" or "gpu") and recent-file history.

mod record;
mod store;

pub use record::{normalize, ModeRecord, SetupType};
pub use store::{LoadedMode, ModeStore};
