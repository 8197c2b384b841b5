use super::{ControlError, LoopState, TrackCommand, TrackResult, TrackState};
use flume::Sender;
use std::sync::Arc;
use uuid::Uuid;

/// Handle for safe control of a live track from other threads, outside
/// of the playback and voice handling context.
///
/// Almost all method calls here are fallible; in most cases, this will be
/// because the underlying track reached a terminal state and was discarded
/// by the playback core. A handle which has started failing with
/// [`ControlError::Finished`] will never succeed again.
#[derive(Clone, Debug)]
pub struct TrackHandle {
    inner: Arc<InnerHandle>,
}

#[derive(Debug)]
struct InnerHandle {
    command_channel: Sender<TrackCommand>,
    loopable: bool,
    uuid: Uuid,
}

impl TrackHandle {
    /// Creates a new handle around the given command sink, and a hint as
    /// to whether the underlying [`Input`] supports repeated playback.
    ///
    /// [`Input`]: crate::input::Input
    pub(crate) fn new(command_channel: Sender<TrackCommand>, loopable: bool, uuid: Uuid) -> Self {
        let inner = Arc::new(InnerHandle {
            command_channel,
            loopable,
            uuid,
        });

        Self { inner }
    }

    /// Unpauses an audio track.
    ///
    /// This is a no-op for a track which is already playing.
    pub fn play(&self) -> TrackResult<()> {
        self.send(TrackCommand::Play)
    }

    /// Pauses an audio track.
    ///
    /// This is a no-op for a track which is already paused.
    pub fn pause(&self) -> TrackResult<()> {
        self.send(TrackCommand::Pause)
    }

    /// Stops an audio track.
    ///
    /// This is *final*: the track is removed by the playback core on the
    /// next processed slice, and all further control calls will fail.
    pub fn stop(&self) -> TrackResult<()> {
        self.send(TrackCommand::Stop)
    }

    /// Sets the volume of an audio track.
    ///
    /// The new volume applies from the next processed audio slice onward;
    /// audio already handed to the engine is unaffected.
    pub fn set_volume(&self, volume: f32) -> TrackResult<()> {
        self.send(TrackCommand::Volume(volume))
    }

    /// Denotes whether the underlying [`Input`] can be rewound.
    ///
    /// If this returns `false`, all loop controls will fail, and the
    /// track is incapable of looping.
    ///
    /// [`Input`]: crate::input::Input
    #[must_use]
    pub fn is_loopable(&self) -> bool {
        self.inner.loopable
    }

    /// Sets an audio track to loop indefinitely.
    pub fn enable_loop(&self) -> TrackResult<()> {
        if self.is_loopable() {
            self.send(TrackCommand::Loop(LoopState::Infinite))
        } else {
            Err(ControlError::LoopUnsupported)
        }
    }

    /// Sets an audio track to no longer loop, ending it at the close of
    /// the pass currently playing.
    pub fn disable_loop(&self) -> TrackResult<()> {
        if self.is_loopable() {
            self.send(TrackCommand::Loop(LoopState::Finite(1)))
        } else {
            Err(ControlError::LoopUnsupported)
        }
    }

    /// Sets the number of passes which remain for this track, counting
    /// the pass currently playing.
    ///
    /// `set_loop_count(0)` stops looping after the current pass.
    pub fn set_loop_count(&self, count: usize) -> TrackResult<()> {
        if self.is_loopable() {
            self.send(TrackCommand::Loop(LoopState::Finite(count)))
        } else {
            Err(ControlError::LoopUnsupported)
        }
    }

    /// Requests playback information and state from the playback core.
    pub async fn get_info(&self) -> TrackResult<TrackState> {
        let (tx, rx) = flume::bounded(1);
        self.send(TrackCommand::Request(tx))?;

        rx.recv_async().await.map_err(|_| ControlError::Finished)
    }

    /// Returns this handle's (and track's) unique identifier.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    // The command channel is unbounded, so a send failure means the
    // playback core has dropped its receiver: the track is finished.
    fn send(&self, cmd: TrackCommand) -> TrackResult<()> {
        self.inner
            .command_channel
            .send(cmd)
            .map_err(|_e| ControlError::Finished)
    }
}
