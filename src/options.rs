use serde::Deserialize;

/// Options for combining track files.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineOptions {
    /// Merge every point into one time-sorted track (default: true).
    /// When false, tracks are concatenated as-is.
    #[serde(default = "default_true")]
    pub single_track: bool,

    /// Insert pause markers across long recording gaps (default: true).
    /// Only used when `single_track` is set.
    #[serde(default = "default_true")]
    pub fill_pauses: bool,

    /// Gaps longer than this many seconds count as pauses (default: 600)
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold_seconds: u32,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            single_track: true,
            fill_pauses: true,
            gap_threshold_seconds: default_gap_threshold(),
        }
    }
}

impl CombineOptions {
    /// Concatenate tracks instead of unifying them.
    pub fn legacy() -> Self {
        Self {
            single_track: false,
            ..Self::default()
        }
    }

    pub fn fills_pauses(&self) -> bool {
        self.single_track && self.fill_pauses
    }
}

fn default_true() -> bool {
    true
}

fn default_gap_threshold() -> u32 {
    600
}
