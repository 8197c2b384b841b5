use super::{LoopState, PlayMode};
use std::time::Duration;

/// Playback state reported for one live track.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct TrackState {
    /// Play status (e.g., playing, paused, ended) of this track.
    pub playing: PlayMode,
    /// Volume applied from the next processed audio slice onward.
    pub volume: f32,
    /// Position within the current pass of the source.
    pub position: Duration,
    /// Total time for which this track has been actively playing,
    /// across all passes.
    pub play_time: Duration,
    /// Remaining passes of the source.
    pub loops: LoopState,
}
