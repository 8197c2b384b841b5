//! Live, controllable audio instances.
//!
//! Tracks add control state around the bytestreams offered by [`Input`]:
//! play status, volume, and looping behaviour. A [`Track`] may be
//! configured before it is handed to a driver, after which all control
//! happens through the returned [`TrackHandle`]. Handles remotely send
//! commands to the playback core, which applies them at the start of the
//! next engine slice; this design prevents user code from being able to
//! stall audio processing.
//!
//! [`Input`]: crate::input::Input

mod command;
mod error;
mod handle;
mod looping;
mod mode;
mod queue;
mod state;

pub use self::{error::*, handle::*, looping::*, mode::*, queue::*, state::*};
pub(crate) use command::*;

use crate::input::Input;
use uuid::Uuid;

/// Initial state for audio playback.
///
/// [`Track`]s allow you to configure play mode, volume, and looping before
/// you pass an input to a [`Driver`]. Live track data is accessed via a
/// [`TrackHandle`], returned by [`Driver::play`] and related methods.
///
/// [`Driver`]: crate::driver::Driver
/// [`Driver::play`]: crate::driver::Driver::play
pub struct Track {
    /// Whether or not this sound is currently playing.
    ///
    /// Defaults to [`PlayMode::Play`].
    pub playing: PlayMode,

    /// The volume for playback.
    ///
    /// Sensible values fall between `0.0` and `1.0`. Values outside this
    /// range can cause clipping or other audio artefacts.
    ///
    /// Defaults to `1.0`.
    pub volume: f32,

    /// The audio stream to be played.
    pub input: Input,

    /// Count of remaining passes of the source.
    ///
    /// Defaults to playing a track once (i.e., [`LoopState::Finite(1)`]).
    ///
    /// [`LoopState::Finite(1)`]: LoopState::Finite
    pub loops: LoopState,

    /// Unique identifier for this track.
    ///
    /// Defaults to a random 128-bit number.
    pub uuid: Uuid,
}

impl Track {
    /// Creates a new track directly from an [`Input`] and a random [`Uuid`].
    #[must_use]
    pub fn new(input: Input) -> Self {
        Self {
            playing: PlayMode::default(),
            volume: 1.0,
            input,
            loops: LoopState::default(),
            uuid: Uuid::new_v4(),
        }
    }

    /// Sets a track to playing if it is paused.
    #[must_use]
    pub fn play(mut self) -> Self {
        self.playing = PlayMode::Play;
        self
    }

    /// Pre-emptively pauses a track, preventing it from being
    /// automatically played.
    #[must_use]
    pub fn pause(mut self) -> Self {
        self.playing = PlayMode::Pause;
        self
    }

    /// Sets [`volume`] in a manner that allows method chaining.
    ///
    /// [`volume`]: Track::volume
    #[must_use]
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Sets a track's loop behaviour.
    #[must_use]
    pub fn loops(mut self, loops: LoopState) -> Self {
        self.loops = loops;
        self
    }

    /// Sets this track's unique identifier.
    #[must_use]
    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub(crate) fn into_context(self) -> (TrackHandle, TrackContext) {
        let (tx, receiver) = flume::unbounded();
        let handle = TrackHandle::new(tx, self.input.is_rewindable(), self.uuid);

        let context = TrackContext {
            track: self,
            receiver,
        };

        (handle, context)
    }
}

/// Any [`Input`] (or struct which can be used as one) can also be made
/// into a [`Track`].
impl<T: Into<Input>> From<T> for Track {
    fn from(val: T) -> Self {
        Track::new(val.into())
    }
}

/// A track bundled together with its command stream, ready to be passed
/// to the playback core.
pub(crate) struct TrackContext {
    pub(crate) track: Track,
    pub(crate) receiver: flume::Receiver<TrackCommand>,
}
