//! Runner for a voice session against an external audio transport.
//!
//! A [`Driver`] spawns one long-lived core task which owns the playback
//! core, the receive dispatcher, and the live engine session. All public
//! methods are thin message sends into that task.

pub mod engine;
pub mod retry;
pub(crate) mod tasks;
#[cfg(test)]
pub(crate) mod test_impls;

pub use engine::{Engine, EngineEvent, EngineSession, OutboundAudio};

use crate::{
    error::{ConnectionResult, JoinError, JoinResult},
    receive::Receiver,
    tracks::{Track, TrackHandle, TrackQueue},
    Config,
    ConnectionInfo,
};
use flume::Sender;
use std::sync::Arc;
use tasks::message::CoreMessage;
use tokio::time;
use tracing::{instrument, warn};

/// Whether an engine session carries decoded audio in its ticks.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DecodeMode {
    /// Decode inbound audio: ticks carry PCM alongside raw payloads.
    #[default]
    Decode,
    /// Pass raw payloads through without decoding.
    Pass,
}

/// Control handle for one voice session's audio processing.
///
/// Driver instances are cheap to clone: clones share the same core task.
/// A `Driver` performs no gateway handshaking of its own: it is handed a
/// complete [`ConnectionInfo`] by its owning [`Call`] (or directly, when
/// driven standalone).
///
/// [`Call`]: crate::Call
#[derive(Clone, Debug)]
pub struct Driver {
    config: Config,
    self_mute: bool,
    sender: Sender<CoreMessage>,
    queue: TrackQueue,
}

impl Driver {
    /// Creates a driver running against the given engine.
    ///
    /// This spawns the session's core task, and so must be called from
    /// within an async runtime.
    #[must_use]
    pub fn new(config: Config, engine: Arc<dyn Engine>) -> Self {
        let queue = TrackQueue::new();
        let sender = tasks::start(config.clone(), engine, queue.clone());

        Self {
            config,
            self_mute: false,
            sender,
            queue,
        }
    }

    /// Connects to a voice session using the given info, reporting the
    /// engine's result over `tx`.
    pub(crate) fn raw_connect(&mut self, info: ConnectionInfo, tx: Sender<ConnectionResult<()>>) {
        self.send(CoreMessage::Connect { info, tx });
    }

    /// Connects to a voice session using previously-obtained session
    /// description data.
    #[instrument(skip(self))]
    pub async fn connect(&mut self, info: ConnectionInfo) -> JoinResult<()> {
        let (tx, rx) = flume::bounded(1);
        self.raw_connect(info, tx);

        rx.recv_async()
            .await
            .map_err(|_| JoinError::Dropped)?
            .map_err(JoinError::Driver)
    }

    /// Tears down the current session immediately, without waiting for
    /// the core to acknowledge the release.
    pub fn leave(&mut self) {
        self.send(CoreMessage::Leave { ack: None });
    }

    /// Tears down the current session, waiting for the core to confirm
    /// that resources were released.
    ///
    /// The wait is bounded by [`Config::driver_timeout`]; on expiry the
    /// teardown still completes in the background.
    pub async fn leave_gracefully(&mut self) {
        let (tx, rx) = flume::bounded(1);
        self.send(CoreMessage::Leave { ack: Some(tx) });

        let ack = rx.recv_async();
        match self.config.driver_timeout {
            Some(t) =>
                if time::timeout(t, ack).await.is_err() {
                    warn!("Graceful disconnect was not acknowledged in time.");
                },
            None => {
                let _ = ack.await;
            },
        }
    }

    /// Sets whether outbound audio is transmitted.
    pub fn mute(&mut self, mute: bool) {
        self.self_mute = mute;
        self.send(CoreMessage::SetMute(mute));
    }

    /// Returns whether outbound audio is muted.
    #[must_use]
    pub fn is_mute(&self) -> bool {
        self.self_mute
    }

    /// Plays a track immediately, mixing it over anything else in
    /// progress and bypassing [the queue].
    ///
    /// [the queue]: Driver::queue
    pub fn play(&mut self, track: Track) -> TrackHandle {
        let (handle, context) = track.into_context();
        self.send(CoreMessage::AddTrack(context));

        handle
    }

    /// Adds a track to the end of [the queue], to be played once every
    /// earlier entry has finished.
    ///
    /// If nothing is queued, the track begins on the next engine slice.
    ///
    /// [the queue]: Driver::queue
    pub fn enqueue(&mut self, mut track: Track) -> TrackHandle {
        let (tx, receiver) = flume::unbounded();
        let handle = TrackHandle::new(tx, track.input.is_rewindable(), track.uuid);
        self.queue.add_raw(&mut track, handle.clone());

        self.send(CoreMessage::AddTrack(crate::tracks::TrackContext {
            track,
            receiver,
        }));

        handle
    }

    /// Returns the serial queue attached to this driver.
    #[must_use]
    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    /// Stops and discards every live and queued track.
    pub fn stop(&mut self) {
        self.send(CoreMessage::StopTracks);
    }

    /// Registers a receiver for inbound audio and lifecycle signals.
    ///
    /// Receivers are invoked in registration order, and are never
    /// deregistered automatically: a failing receiver is logged and
    /// keeps receiving future events.
    pub fn add_receiver(&mut self, receiver: Arc<dyn Receiver>) {
        self.send(CoreMessage::AddReceiver(receiver));
    }

    /// Removes every registered receiver.
    pub fn remove_all_receivers(&mut self) {
        self.send(CoreMessage::RemoveReceivers);
    }

    /// Accesses this driver's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn send(&self, message: CoreMessage) {
        if self.sender.send(message).is_err() {
            warn!("Core task unexpectedly gone; message discarded.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_impls::*, *};
    use crate::{
        constants::STEREO_FRAME_SIZE,
        input::MemorySource,
        tracks::{ControlError, LoopState},
    };
    use byteorder::{ByteOrder, LittleEndian};

    fn pcm_of(value: i16, samples: usize) -> MemorySource {
        let pcm = vec![value; samples];
        let mut bytes = vec![0u8; samples * 2];
        LittleEndian::write_i16_into(&pcm, &mut bytes);
        MemorySource::new(bytes)
    }

    async fn connected_driver() -> (Driver, TestSession) {
        let (engine, handle) = TestEngine::new();
        let mut driver = Driver::new(Config::default(), engine);
        driver.connect(test_info()).await.unwrap();
        let session = handle.sessions.recv_async().await.unwrap();

        (driver, session)
    }

    fn first_sample(frame: &OutboundAudio) -> i16 {
        match frame {
            OutboundAudio::Frame(samples) => samples[0],
            OutboundAudio::Silence => panic!("expected audio, got silence"),
        }
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn queue_plays_tracks_in_order() {
        let (mut driver, session) = connected_driver().await;

        // First track covers one and a half slices, second exactly one.
        let first = driver.enqueue(Track::from(pcm_of(100, STEREO_FRAME_SIZE * 3 / 2)));
        let _second = driver.enqueue(Track::from(pcm_of(200, STEREO_FRAME_SIZE)));
        assert_eq!(driver.queue().len(), 2);

        session.tick().await;
        let frame = session.audio.recv_async().await.unwrap();
        assert_eq!(first_sample(&frame), 100);

        // Second slice drains the remainder of the first track.
        session.tick().await;
        let frame = session.audio.recv_async().await.unwrap();
        assert_eq!(first_sample(&frame), 100);

        // The queue resumes the second track on the following slice.
        session.tick().await;
        let frame = session.audio.recv_async().await.unwrap();
        assert_eq!(first_sample(&frame), 200);

        assert_eq!(first.play(), Err(ControlError::Finished));
        assert_eq!(driver.queue().len(), 1);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn finite_loops_consume_source_exactly_n_times() {
        let (mut driver, session) = connected_driver().await;

        let handle = driver
            .enqueue(Track::from(pcm_of(5, STEREO_FRAME_SIZE)).loops(LoopState::Finite(2)));

        for _ in 0..2 {
            session.tick().await;
            let frame = session.audio.recv_async().await.unwrap();
            assert_eq!(first_sample(&frame), 5);
        }

        // Third slice observes the end of the final pass.
        session.tick().await;
        assert_eq!(
            session.audio.recv_async().await.unwrap(),
            OutboundAudio::Silence
        );

        assert_eq!(handle.pause(), Err(ControlError::Finished));
        assert!(handle.get_info().await.is_err());
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn volume_applies_from_next_slice_and_pause_is_idempotent() {
        let (mut driver, session) = connected_driver().await;

        let handle = driver.play(Track::from(pcm_of(1000, STEREO_FRAME_SIZE * 8)));

        session.tick().await;
        let frame = session.audio.recv_async().await.unwrap();
        assert_eq!(first_sample(&frame), 1000);

        handle.set_volume(0.5).unwrap();
        session.tick().await;
        let frame = session.audio.recv_async().await.unwrap();
        assert_eq!(first_sample(&frame), 500);

        handle.pause().unwrap();
        handle.pause().unwrap();
        session.tick().await;
        assert_eq!(
            session.audio.recv_async().await.unwrap(),
            OutboundAudio::Silence
        );

        handle.play().unwrap();
        session.tick().await;
        let frame = session.audio.recv_async().await.unwrap();
        assert_eq!(first_sample(&frame), 500);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn muted_driver_transmits_silence() {
        let (mut driver, session) = connected_driver().await;

        let _handle = driver.play(Track::from(pcm_of(9, STEREO_FRAME_SIZE * 4)));
        driver.mute(true);
        assert!(driver.is_mute());

        session.tick().await;
        assert_eq!(
            session.audio.recv_async().await.unwrap(),
            OutboundAudio::Silence
        );
    }
}
