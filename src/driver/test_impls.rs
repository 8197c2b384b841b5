//! In-memory engine used to exercise drivers and calls in tests.

use super::{Engine, EngineEvent, EngineSession, OutboundAudio};
use crate::{
    constants::ENGINE_EVENT_BUFFER,
    error::{ConnectionError, ConnectionResult},
    Config,
    ConnectionInfo,
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Engine double: every `open` yields a channel-backed session whose far
/// ends are handed to the test through [`TestEngineHandle`].
pub(crate) struct TestEngine {
    sessions: flume::Sender<TestSession>,
    refuse: AtomicBool,
}

/// Test-side view of opened sessions.
pub(crate) struct TestEngineHandle {
    pub sessions: flume::Receiver<TestSession>,
}

/// Far end of one opened session.
pub(crate) struct TestSession {
    pub info: ConnectionInfo,
    pub audio: flume::Receiver<OutboundAudio>,
    pub events: flume::Sender<EngineEvent>,
}

impl TestEngine {
    pub(crate) fn new() -> (Arc<Self>, TestEngineHandle) {
        let (tx, rx) = flume::unbounded();

        (
            Arc::new(Self {
                sessions: tx,
                refuse: AtomicBool::new(false),
            }),
            TestEngineHandle { sessions: rx },
        )
    }

    /// Makes every subsequent `open` fail, simulating an unreachable
    /// voice server.
    pub(crate) fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Engine for TestEngine {
    async fn open(
        &self,
        info: &ConnectionInfo,
        _config: &Config,
    ) -> ConnectionResult<EngineSession> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectionError::TimedOut);
        }

        let (audio_tx, audio_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::bounded(ENGINE_EVENT_BUFFER);

        let _ = self.sessions.send(TestSession {
            info: info.clone(),
            audio: audio_rx,
            events: event_tx,
        });

        Ok(EngineSession {
            audio: audio_tx,
            events: event_rx,
        })
    }
}

impl TestSession {
    /// Pushes one empty tick, driving a playback slice.
    pub(crate) async fn tick(&self) {
        self.events
            .send_async(EngineEvent::Tick(Default::default()))
            .await
            .expect("Core task hung up mid-test.");
    }
}

pub(crate) fn test_info() -> ConnectionInfo {
    ConnectionInfo {
        channel_id: Some(3.into()),
        endpoint: "voice.test.invalid".into(),
        guild_id: 1.into(),
        session_id: "sess".into(),
        token: "tok".into(),
        user_id: 2.into(),
    }
}
