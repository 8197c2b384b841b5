use std::{io::Error as IoError, mem::discriminant, sync::Arc};

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Playback status of a track.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub enum PlayMode {
    /// The track is currently playing.
    #[default]
    Play,
    /// The track is currently paused, and may be resumed.
    Pause,
    /// The track has been manually stopped, and cannot be restarted.
    Stop,
    /// The track has naturally ended, and cannot be restarted.
    End,
    /// The track has encountered a runtime error, and cannot be restarted.
    Errored(PlayError),
}

impl PlayMode {
    /// Returns whether the track has irreversibly stopped.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, PlayMode::Stop | PlayMode::End | PlayMode::Errored(_))
    }

    #[must_use]
    pub(crate) fn is_playing(&self) -> bool {
        matches!(self, PlayMode::Play)
    }

    // A finished track cannot be restarted: terminal states absorb any
    // later transition request.
    #[must_use]
    fn next_state(self, other: Self) -> Self {
        match self {
            Self::Play | Self::Pause => other,
            state => state,
        }
    }

    pub(crate) fn change_to(&mut self, other: Self) {
        *self = self.clone().next_state(other);
    }
}

impl PartialEq for PlayMode {
    fn eq(&self, other: &Self) -> bool {
        discriminant(self) == discriminant(other)
    }
}

impl Eq for PlayMode {}

/// Errors reported by the playback core while pulling audio for a [`Track`].
///
/// [`Track`]: super::Track
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum PlayError {
    /// Reading from (or rewinding) the track's [`Input`] failed.
    ///
    /// [`Input`]: crate::input::Input
    Io(Arc<IoError>),
}

impl Display for PlayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("runtime error while playing track: ")?;
        match self {
            Self::Io(e) => write!(f, "i/o on input [{e}]"),
        }
    }
}

impl std::error::Error for PlayError {}
