use super::{LoopState, TrackState};
use flume::Sender;
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// A request from external code using a [`TrackHandle`] to modify
/// or act upon a live track.
///
/// [`TrackHandle`]: super::TrackHandle
pub(crate) enum TrackCommand {
    Play,
    Pause,
    Stop,
    Volume(f32),
    Loop(LoopState),
    Request(Sender<TrackState>),
}

impl Debug for TrackCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "TrackCommand::{}",
            match self {
                Self::Play => "Play".to_string(),
                Self::Pause => "Pause".to_string(),
                Self::Stop => "Stop".to_string(),
                Self::Volume(vol) => format!("Volume({vol})"),
                Self::Loop(loops) => format!("Loop({loops:?})"),
                Self::Request(tx) => format!("Request({tx:?})"),
            }
        )
    }
}
