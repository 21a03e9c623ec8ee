pub mod amplitude;
pub mod app;
pub mod audio;
pub mod config;
pub mod engine;
pub mod logging;
pub mod morph;
pub mod render;
pub mod speaking;
pub mod terminal;
pub mod tuning;
pub mod viseme;

pub use amplitude::{extract_amplitude, AmplitudeSmoother, AmplitudeSource};
pub use engine::{tick_state, LipSyncEngine, LipSyncState, TickReport};
pub use morph::{AvatarRig, MorphMesh, MorphWeightSink, MorphWeights};
pub use tuning::LipSyncTuning;
pub use viseme::{RandomSource, VisemeId, VisemeState};
