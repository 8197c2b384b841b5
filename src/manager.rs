use crate::{
    driver::Engine,
    error::{JoinError, JoinResult, ServerUpdateError},
    gateway::VoiceUpdate,
    id::{ChannelId, GuildId, UserId},
    model::payload::{VoiceServerUpdate, VoiceStateUpdate},
    Call,
    Config,
};
use dashmap::DashMap;
use derivative::Derivative;
use once_cell::sync::OnceCell;
use parking_lot::RwLock as PRwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Clone, Copy, Debug)]
struct ClientData {
    user_id: UserId,
}

/// Raw inbound voice event, as surfaced by the host's gateway connection.
///
/// Both variants must concern *this* account's voice state; filtering
/// out other users' updates is the gateway adapter's responsibility.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum GatewayEvent {
    /// A voice state update for this account.
    StateUpdate {
        /// Guild the update concerns.
        guild_id: GuildId,
        /// Payload body.
        body: VoiceStateUpdate,
    },
    /// A voice server description for a pending or live session.
    ServerUpdate {
        /// Guild the update concerns.
        guild_id: GuildId,
        /// Payload body.
        body: VoiceServerUpdate,
    },
}

/// A struct responsible for managing [`Call`]s.
///
/// This manager transparently maps guild state and a gateway connection
/// into individual calls: at most one call exists per guild, created on
/// demand and removed explicitly. It also forwards inbound voice events
/// which affect call state.
///
/// [`Call`]: Call
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Warbler {
    client_data: OnceCell<ClientData>,
    calls: DashMap<GuildId, Arc<Mutex<Call>>>,
    config: PRwLock<Config>,
    #[derivative(Debug = "ignore")]
    engine: Arc<dyn Engine>,
    #[derivative(Debug = "ignore")]
    gateway: Arc<dyn VoiceUpdate>,
}

impl Warbler {
    /// Creates a new manager over the given gateway sink and engine.
    ///
    /// [`initialise_client_data`] must be called before any call is
    /// created.
    ///
    /// [`initialise_client_data`]: Warbler::initialise_client_data
    #[must_use]
    pub fn new(gateway: Arc<dyn VoiceUpdate>, engine: Arc<dyn Engine>) -> Self {
        Self::from_config(gateway, engine, Config::default())
    }

    /// Creates a new manager, using the given configuration for every
    /// created call.
    #[must_use]
    pub fn from_config(
        gateway: Arc<dyn VoiceUpdate>,
        engine: Arc<dyn Engine>,
        config: Config,
    ) -> Self {
        Self {
            client_data: OnceCell::new(),
            calls: DashMap::new(),
            config: config.into(),
            engine,
            gateway,
        }
    }

    /// Sets the account's user ID.
    ///
    /// If this struct is already initialised, this function is a no-op.
    pub fn initialise_client_data<U: Into<UserId>>(&self, user_id: U) {
        let _ = self.client_data.set(ClientData {
            user_id: user_id.into(),
        });
    }

    /// Retrieves a [`Call`] for the given guild, if one already exists.
    ///
    /// [`Call`]: Call
    #[must_use]
    pub fn get<G: Into<GuildId>>(&self, guild_id: G) -> Option<Arc<Mutex<Call>>> {
        self.calls.get(&guild_id.into()).map(|entry| Arc::clone(&entry))
    }

    /// Retrieves a [`Call`] for the given guild, creating a new one if
    /// none is found.
    ///
    /// This will not join any calls, or cause connection state to change.
    ///
    /// [`Call`]: Call
    #[inline]
    pub fn get_or_insert<G>(&self, guild_id: G) -> Arc<Mutex<Call>>
    where
        G: Into<GuildId>,
    {
        self._get_or_insert(guild_id.into())
    }

    fn _get_or_insert(&self, guild_id: GuildId) -> Arc<Mutex<Call>> {
        self.get(guild_id).unwrap_or_else(|| {
            self.calls
                .entry(guild_id)
                .or_insert_with(|| {
                    let info = self
                        .client_data
                        .get()
                        .expect("Manager has not been initialised.");

                    let call = Call::from_config(
                        guild_id,
                        Arc::clone(&self.gateway),
                        info.user_id,
                        Arc::clone(&self.engine),
                        self.config.read().clone(),
                    );

                    Arc::new(Mutex::new(call))
                })
                .clone()
        })
    }

    /// Sets a shared configuration for all calls created from this
    /// manager.
    ///
    /// Changes made here will apply to new Call and Driver instances only.
    pub fn set_config(&self, new_config: Config) {
        let mut config = self.config.write();
        *config = new_config;
    }

    /// Connects to a target by retrieving its relevant [`Call`] and
    /// joining, or creating the handler if required.
    ///
    /// This can also switch to the given channel if a handler already
    /// exists for the target and is connected elsewhere. The channel
    /// _must_ be in the provided guild; this is _not_ checked by the
    /// library, and will result in an error.
    ///
    /// If the join fails (e.g., the handshake times out), the handler is
    /// rolled back to an idle state so a retry starts clean, and the
    /// [`Call`] remains accessible via [`get`].
    ///
    /// [`Call`]: Call
    /// [`get`]: Warbler::get
    #[inline]
    pub async fn join<C, G>(&self, guild_id: G, channel_id: C) -> JoinResult<Arc<Mutex<Call>>>
    where
        C: Into<ChannelId>,
        G: Into<GuildId>,
    {
        self._join(guild_id.into(), channel_id.into()).await
    }

    async fn _join(&self, guild_id: GuildId, channel_id: ChannelId) -> JoinResult<Arc<Mutex<Call>>> {
        let call = self.get_or_insert(guild_id);

        let stage_1 = {
            let mut handler = call.lock().await;
            handler.join(channel_id).await
        };

        let result = match stage_1 {
            Ok(join) => join.await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(call),
            Err(e) => {
                // Leave the handler idle so a retry starts clean.
                let mut handler = call.lock().await;
                if let Err(roll) = handler.disconnect(true).await {
                    warn!("Failed to roll back handler after join error: {roll}.");
                }

                Err(e)
            },
        }
    }

    /// Retrieves the [handler][`Call`] for the given target and leaves
    /// the associated voice channel, if connected.
    ///
    /// This will _not_ drop the handler, and will preserve it and its
    /// settings. Consider calling [`remove`] if you do not need to reuse
    /// event receivers or active tracks.
    ///
    /// [`Call`]: Call
    /// [`remove`]: Warbler::remove
    #[inline]
    pub async fn leave<G: Into<GuildId>>(&self, guild_id: G) -> JoinResult<()> {
        self._leave(guild_id.into()).await
    }

    async fn _leave(&self, guild_id: GuildId) -> JoinResult<()> {
        if let Some(call) = self.get(guild_id) {
            let mut handler = call.lock().await;
            handler.leave().await
        } else {
            Err(JoinError::NoCall)
        }
    }

    /// Retrieves the [`Call`] for the given target, leaves the associated
    /// voice channel, and drops the handler.
    ///
    /// An `Err(..)` value implies that the gateway could not be
    /// contacted, and that leaving should be reattempted later.
    ///
    /// [`Call`]: Call
    #[inline]
    pub async fn remove<G: Into<GuildId>>(&self, guild_id: G) -> JoinResult<()> {
        self._remove(guild_id.into()).await
    }

    async fn _remove(&self, guild_id: GuildId) -> JoinResult<()> {
        self.leave(guild_id).await?;
        self.calls.remove(&guild_id);
        Ok(())
    }

    /// Routes a raw inbound voice event to the call it concerns.
    ///
    /// You are required to call this with all inbound voice events:
    /// i.e., at least `StateUpdate`s and `ServerUpdate`s for this
    /// account. Calls to this function must happen on a **separate task**
    /// to any [`join`] invocation, as joins only resolve once their
    /// events have been processed here.
    ///
    /// [`join`]: Warbler::join
    pub async fn process(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::ServerUpdate { guild_id, body } => {
                if let Err(e) = self
                    .server_update(*guild_id, body.endpoint.clone(), body.token.clone())
                    .await
                {
                    warn!("Voice server unavailable for guild {guild_id}: {e}.");
                }
            },
            GatewayEvent::StateUpdate { guild_id, body } =>
                self.state_update(*guild_id, body.session_id.clone(), body.channel_id)
                    .await,
        }
    }

    /// Applies one state-update half of a handshake to the given guild's
    /// call, if one exists.
    pub async fn state_update(
        &self,
        guild_id: GuildId,
        session_id: String,
        channel_id: Option<ChannelId>,
    ) {
        if let Some(call) = self.get(guild_id) {
            let mut handler = call.lock().await;
            handler.update_state(session_id, channel_id);
        }
    }

    /// Applies one server-update half of a handshake to the given guild's
    /// call, if one exists.
    ///
    /// The platform's explicit "no voice server" signal is surfaced to
    /// the caller after the handler has been rolled back.
    pub async fn server_update(
        &self,
        guild_id: GuildId,
        endpoint: Option<String>,
        token: String,
    ) -> Result<(), ServerUpdateError> {
        if let Some(call) = self.get(guild_id) {
            let mut handler = call.lock().await;
            handler.update_server(endpoint, token)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::{
            retry::{Retry, Strategy},
            test_impls::{TestEngine, TestEngineHandle, TestSession},
            EngineEvent,
        },
        error::JoinResult,
        receive::{Receiver, ReceiverError, VoiceTick},
    };
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct RecordingGateway {
        tx: flume::Sender<(GuildId, Option<ChannelId>)>,
    }

    #[async_trait]
    impl VoiceUpdate for RecordingGateway {
        async fn update_voice_state(
            &self,
            guild_id: GuildId,
            channel_id: Option<ChannelId>,
            _self_deaf: bool,
            _self_mute: bool,
        ) -> JoinResult<()> {
            let _ = self.tx.send((guild_id, channel_id));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counting {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        reconnects: AtomicUsize,
    }

    #[async_trait]
    impl Receiver for Counting {
        async fn voice_tick(&self, _tick: &VoiceTick) -> Result<(), ReceiverError> {
            Ok(())
        }

        async fn driver_connect(&self) -> Result<(), ReceiverError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn driver_disconnect(&self) -> Result<(), ReceiverError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn driver_reconnect(&self) -> Result<(), ReceiverError> {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        manager: Arc<Warbler>,
        engine: Arc<TestEngine>,
        engine_handle: TestEngineHandle,
        requests: flume::Receiver<(GuildId, Option<ChannelId>)>,
    }

    fn fixture(config: Config) -> Fixture {
        let (engine, engine_handle) = TestEngine::new();
        let (tx, requests) = flume::unbounded();
        let manager = Arc::new(Warbler::from_config(
            Arc::new(RecordingGateway { tx }),
            engine.clone(),
            config,
        ));
        manager.initialise_client_data(UserId(2));

        Fixture {
            manager,
            engine,
            engine_handle,
            requests,
        }
    }

    /// Runs a full join for guild 1 / channel 3, delivering the handshake
    /// halves in the given order.
    async fn joined(fix: &Fixture, server_first: bool) -> (Arc<Mutex<Call>>, TestSession) {
        let mgr = Arc::clone(&fix.manager);
        let join = tokio::spawn(async move { mgr.join(GuildId(1), ChannelId(3)).await });

        let (guild, channel) = fix.requests.recv_async().await.unwrap();
        assert_eq!(guild, GuildId(1));
        assert_eq!(channel, Some(ChannelId(3)));

        if server_first {
            fix.manager
                .server_update(GuildId(1), Some("wss://voice".into()), "tok".into())
                .await
                .unwrap();
            fix.manager
                .state_update(GuildId(1), "sess".into(), Some(ChannelId(3)))
                .await;
        } else {
            fix.manager
                .state_update(GuildId(1), "sess".into(), Some(ChannelId(3)))
                .await;
            fix.manager
                .server_update(GuildId(1), Some("wss://voice".into()), "tok".into())
                .await
                .unwrap();
        }

        let call = join.await.unwrap().unwrap();
        let session = fix.engine_handle.sessions.recv_async().await.unwrap();

        (call, session)
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn join_completes_for_either_handshake_order() {
        for server_first in [false, true] {
            let fix = fixture(Config::default());
            let (call, session) = joined(&fix, server_first).await;

            assert_eq!(session.info.session_id, "sess");
            assert_eq!(session.info.endpoint, "wss://voice");
            let handler = call.lock().await;
            assert_eq!(handler.current_channel(), Some(ChannelId(3)));
            assert!(handler.current_connection().is_some());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn join_without_state_update_times_out_and_rolls_back() {
        let fix = fixture(Config::default().gateway_timeout(Some(Duration::from_millis(50))));

        let mgr = Arc::clone(&fix.manager);
        let join = tokio::spawn(async move { mgr.join(GuildId(1), ChannelId(42)).await });

        let _ = fix.requests.recv_async().await.unwrap();

        // Only one half of the handshake ever arrives.
        fix.manager
            .server_update(GuildId(1), Some("wss://voice".into()), "tok".into())
            .await
            .unwrap();

        let result = join.await.unwrap();
        assert!(matches!(result, Err(JoinError::TimedOut)));

        // Rolled back to idle: no channel, no connection, and a leave
        // request was sent to the gateway.
        let call = fix.manager.get(GuildId(1)).unwrap();
        let handler = call.lock().await;
        assert!(handler.current_channel().is_none());
        assert!(handler.current_connection().is_none());

        let (_, channel) = fix.requests.recv_async().await.unwrap();
        assert_eq!(channel, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn overlapping_disconnects_release_once() {
        let fix = fixture(Config::default());
        let (call, _session) = joined(&fix, false).await;

        let counter = Arc::new(Counting::default());
        {
            let mut handler = call.lock().await;
            handler.add_receiver(counter.clone());

            handler.disconnect(false).await.unwrap();
            handler.disconnect(true).await.unwrap();
        }

        // The forced disconnect found nothing left to release.
        let mut handler = call.lock().await;
        handler.leave_gracefully().await;
        assert_eq!(counter.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn transport_loss_reconnects_and_notifies() {
        let retry = Retry {
            strategy: Strategy::Every(Duration::from_millis(5)),
            retry_limit: Some(1),
        };
        let fix = fixture(Config::default().driver_retry(retry));
        let (call, session) = joined(&fix, false).await;

        let counter = Arc::new(Counting::default());
        call.lock().await.add_receiver(counter.clone());

        session.events.send_async(EngineEvent::Dropped).await.unwrap();

        let session2 = fix.engine_handle.sessions.recv_async().await.unwrap();
        assert_eq!(session2.info.session_id, "sess");

        while counter.reconnects.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn exhausted_reconnects_release_the_session() {
        let retry = Retry {
            strategy: Strategy::Every(Duration::from_millis(5)),
            retry_limit: Some(1),
        };
        let fix = fixture(Config::default().driver_retry(retry));
        let (call, session) = joined(&fix, false).await;

        let counter = Arc::new(Counting::default());
        call.lock().await.add_receiver(counter.clone());

        fix.engine.set_refuse(true);
        session.events.send_async(EngineEvent::Dropped).await.unwrap();

        while counter.disconnects.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.reconnects.load(Ordering::SeqCst), 0);
    }
}
