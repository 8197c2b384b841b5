use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Errors associated with control and manipulation of tracks.
///
/// Unless otherwise stated, these don't invalidate an existing track,
/// but do advise on valid operations and commands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ControlError {
    /// The operation failed because the track has ended, was stopped, or
    /// was removed due to call closure or a playback error.
    ///
    /// Every control call on such a handle reports this error; none are
    /// silently ignored.
    Finished,
    /// The track's input cannot be rewound, so loop controls cannot apply.
    LoopUnsupported,
    /// The response to a state request was dropped before arrival.
    Dropped,
}

impl Display for ControlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "failed to operate on track (handle): ")?;
        match self {
            ControlError::Finished => write!(f, "track ended"),
            ControlError::LoopUnsupported => write!(f, "input cannot rewind, so cannot loop"),
            ControlError::Dropped => write!(f, "request was dropped before completion"),
        }
    }
}

impl Error for ControlError {}

/// Alias for most calls to a [`TrackHandle`].
///
/// [`TrackHandle`]: super::TrackHandle
pub type TrackResult<T> = Result<T, ControlError>;
