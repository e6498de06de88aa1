//! Vocal/instrumental separation.
//!
//! - `naming` - output names, backups and collision-safe paths
//! - `audio` - duration, padding and trimming
//! - `backend` - the ML engine behind a trait
//! - `job` - the phase state machine tying them together

mod audio;
mod backend;
mod job;
mod naming;

pub use audio::{is_wav, wav_duration, AudioEditor, MediaEditor};
pub use backend::{new_outputs, AudioSeparatorCli, SeparationBackend, SeparationRequest};
pub use job::{JobPhase, SeparationArtifact, SeparationJob, SeparationOutcome};
pub use naming::{
    backup_path, build_output_name, claim_unique_path, classify_role, clean_stem, is_backup_stem, unique_path,
    unique_path_with, ArtifactRole,
};
