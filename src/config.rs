use serde::{Deserialize, Serialize};

/// Options honored by the driver and forwarded to the host collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Toggles strict typing in the host's parser and linker.
    pub strong_mode: bool,
}
