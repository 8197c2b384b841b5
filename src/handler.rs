use crate::{
    driver::{Driver, Engine},
    error::{ConnectionResult, JoinError, JoinResult, ServerUpdateError},
    gateway::VoiceUpdate,
    id::{ChannelId, GuildId, UserId},
    info::{ConnectionInfo, ConnectionProgress},
    join::Join,
    tracks::{Track, TrackHandle},
    Config,
};
use derivative::Derivative;
use flume::Sender;
use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Duration,
};
use tracing::instrument;

/// Channels awaiting the completion of an in-flight join: one resolves
/// the gateway stage, the other carries the engine's connection result.
#[derive(Clone, Debug)]
struct Return {
    gateway_tx: Sender<()>,
    driver_tx: Sender<ConnectionResult<()>>,
}

/// The Call handler is responsible for a single voice connection, acting
/// as a clean API above the handshake state and gateway message
/// management.
///
/// A `Call` exposes all control methods of [`Driver`] via `Deref(Mut)`;
/// the track methods defined directly on `Call` additionally require a
/// completed handshake.
///
/// [`Driver`]: struct@Driver
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Call {
    config: Config,

    connection: Option<(ConnectionProgress, Return)>,

    /// The driver of the underlying engine session.
    driver: Driver,

    guild_id: GuildId,
    /// Whether the current handler is set to deafen voice connections.
    self_deaf: bool,
    /// Whether the current handler is set to mute voice connections.
    self_mute: bool,
    user_id: UserId,

    #[derivative(Debug = "ignore")]
    ws: Arc<dyn VoiceUpdate>,
}

impl Call {
    /// Creates a new Call, which will send outbound state requests via
    /// `ws` and open audio sessions against `engine`.
    #[inline]
    pub fn new<G, U>(
        guild_id: G,
        ws: Arc<dyn VoiceUpdate>,
        user_id: U,
        engine: Arc<dyn Engine>,
    ) -> Self
    where
        G: Into<GuildId>,
        U: Into<UserId>,
    {
        Self::from_config(guild_id, ws, user_id, engine, Config::default())
    }

    /// Creates a new Call, configuring the driver as specified.
    #[inline]
    pub fn from_config<G, U>(
        guild_id: G,
        ws: Arc<dyn VoiceUpdate>,
        user_id: U,
        engine: Arc<dyn Engine>,
        config: Config,
    ) -> Self
    where
        G: Into<GuildId>,
        U: Into<UserId>,
    {
        Call {
            config: config.clone(),
            connection: None,
            driver: Driver::new(config, engine),
            guild_id: guild_id.into(),
            self_deaf: false,
            self_mute: false,
            user_id: user_id.into(),
            ws,
        }
    }

    fn do_connect(&mut self) {
        if let Some((ConnectionProgress::Complete(c), ret)) = &self.connection {
            // It's okay if the receiver hung up.
            let _ = ret.gateway_tx.send(());

            let info = c.clone();
            let tx = ret.driver_tx.clone();
            self.driver.raw_connect(info, tx);
        }
    }

    /// Requests that the platform move this account into `channel_id` and
    /// waits in the handshake state for both halves of the reply.
    ///
    /// This function acts as a future in two stages:
    /// * The first `await` sends the request over the gateway.
    /// * The second `await`s the handshake and the engine's connection
    ///   attempt. To prevent deadlock, any mutexes around this Call
    ///   *must* be released before this result is queried.
    ///
    /// When using [`Warbler::join`], this pattern is correctly handled for
    /// you, including rollback to an idle state on failure.
    ///
    /// [`Warbler::join`]: crate::Warbler::join
    #[instrument(skip(self))]
    #[inline]
    pub async fn join<C>(&mut self, channel_id: C) -> JoinResult<Join>
    where
        C: Into<ChannelId> + Debug,
    {
        self._join(channel_id.into()).await
    }

    async fn _join(&mut self, channel_id: ChannelId) -> JoinResult<Join> {
        let (tx, rx) = flume::unbounded();
        let (gw_tx, gw_rx) = flume::unbounded();

        let do_conn = self.should_actually_join(&gw_tx, channel_id).await?;

        if do_conn {
            self.connection = Some((
                ConnectionProgress::new(self.guild_id, self.user_id, channel_id),
                Return {
                    gateway_tx: gw_tx,
                    driver_tx: tx,
                },
            ));

            let timeout = self.config.gateway_timeout;

            self.update()
                .await
                .map(|()| Join::new(rx.into_recv_async(), gw_rx.into_recv_async(), timeout))
        } else {
            // Skipping the gateway request implies that the current
            // connection is complete AND the channel matches. Send a
            // polite request to the driver, which only actually
            // reconnects if it had a problem earlier.
            let info = self.current_connection().unwrap().clone();
            self.driver.raw_connect(info, tx.clone());

            Ok(Join::new(
                rx.into_recv_async(),
                gw_rx.into_recv_async(),
                None,
            ))
        }
    }

    async fn should_actually_join(
        &mut self,
        tx: &Sender<()>,
        channel_id: ChannelId,
    ) -> JoinResult<bool> {
        Ok(if let Some(conn) = &self.connection {
            if conn.0.in_progress() {
                self.leave().await?;
                true
            } else if conn.0.channel_id() == channel_id {
                let _ = tx.send(());
                false
            } else {
                // Connected, but to another channel: move.
                true
            }
        } else {
            true
        })
    }

    /// Joins a voice channel with the given initial mute/deafen flags,
    /// overriding the configured gateway timeout for this attempt.
    ///
    /// The same two-stage protocol as [`join`] applies.
    ///
    /// [`join`]: Call::join
    #[instrument(skip(self))]
    pub async fn connect<C>(
        &mut self,
        channel_id: C,
        timeout: Option<Duration>,
        self_mute: bool,
        self_deaf: bool,
    ) -> JoinResult<Join>
    where
        C: Into<ChannelId> + Debug,
    {
        self.config.gateway_timeout = timeout;
        self.self_mute = self_mute;
        self.self_deaf = self_deaf;
        self.driver.mute(self_mute);

        self.join(channel_id).await
    }

    /// Moves this account to another voice channel without leaving the
    /// session.
    ///
    /// The platform re-delivers both handshake halves for a move, so this
    /// passes back through the same waiting state as an initial join.
    #[instrument(skip(self))]
    #[inline]
    pub async fn move_to<C>(&mut self, channel_id: C) -> JoinResult<Join>
    where
        C: Into<ChannelId> + Debug,
    {
        self._join(channel_id.into()).await
    }

    /// Returns the current voice connection details for this Call, if
    /// the handshake has completed.
    #[must_use]
    pub fn current_connection(&self) -> Option<&ConnectionInfo> {
        match &self.connection {
            Some((progress, _)) => progress.get_connection_info(),
            _ => None,
        }
    }

    /// Returns the `id` of the channel, if connected or connecting to any.
    ///
    /// This remains set after a connection failure, to allow for
    /// reconnection as needed; it changes if moved into another voice
    /// channel by an admin, and is unset if kicked from voice.
    #[must_use]
    pub fn current_channel(&self) -> Option<ChannelId> {
        match &self.connection {
            Some((progress, _)) => Some(progress.channel_id()),
            _ => None,
        }
    }

    /// Leaves the current voice channel, waiting for the driver to
    /// acknowledge a graceful teardown.
    ///
    /// This does _not_ forget settings, like whether to be self-deafened
    /// or self-muted.
    #[instrument(skip(self))]
    pub async fn leave(&mut self) -> JoinResult<()> {
        self.disconnect(false).await
    }

    /// Tears down the voice session.
    ///
    /// With `force = false`, this waits for the driver to confirm an
    /// orderly teardown, bounded by [`Config::driver_timeout`]. With
    /// `force = true`, the release is requested without waiting for any
    /// acknowledgement. Overlapping disconnects release the session
    /// exactly once.
    ///
    /// [`Config::driver_timeout`]: crate::Config::driver_timeout
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self, force: bool) -> JoinResult<()> {
        self.connection = None;

        if force {
            self.driver.leave();
        } else {
            self.driver.leave_gracefully().await;
        }

        // Only now tell the gateway we have left the channel.
        self.update().await
    }

    fn leave_local(&mut self) {
        self.connection = None;
        self.driver.leave();
    }

    /// Sets whether the current connection is to be muted.
    ///
    /// Valid only while a voice connection is live; the request is sent
    /// to the gateway without waiting for an acknowledgement.
    #[instrument(skip(self))]
    pub async fn mute(&mut self, mute: bool) -> JoinResult<()> {
        if self.current_connection().is_none() {
            return Err(JoinError::NotConnected);
        }

        self.self_mute = mute;
        self.driver.mute(mute);

        self.update().await
    }

    /// Returns whether the current connection is self-muted.
    #[must_use]
    pub fn is_mute(&self) -> bool {
        self.self_mute
    }

    /// Sets whether the current connection is to be deafened.
    ///
    /// Valid only while a voice connection is live; the request is sent
    /// to the gateway without waiting for an acknowledgement.
    ///
    /// **Note**: unlike in official clients, you _can_ be deafened while
    /// not being muted.
    #[instrument(skip(self))]
    pub async fn deafen(&mut self, deaf: bool) -> JoinResult<()> {
        if self.current_connection().is_none() {
            return Err(JoinError::NotConnected);
        }

        self.self_deaf = deaf;

        self.update().await
    }

    /// Returns whether the current connection is self-deafened.
    ///
    /// This is purely cosmetic.
    #[must_use]
    pub fn is_deaf(&self) -> bool {
        self.self_deaf
    }

    /// Plays a track over the live session, bypassing the queue.
    ///
    /// Fails with [`JoinError::NotConnected`] before the handshake has
    /// completed; nothing is buffered for a later connection.
    pub fn play(&mut self, track: Track) -> JoinResult<TrackHandle> {
        if self.current_connection().is_none() {
            return Err(JoinError::NotConnected);
        }

        Ok(self.driver.play(track))
    }

    /// Adds a track to the serial queue for the live session.
    ///
    /// Fails with [`JoinError::NotConnected`] before the handshake has
    /// completed; nothing is buffered for a later connection.
    pub fn enqueue(&mut self, track: Track) -> JoinResult<TrackHandle> {
        if self.current_connection().is_none() {
            return Err(JoinError::NotConnected);
        }

        Ok(self.driver.enqueue(track))
    }

    /// Processes a voice state update for this account delivered by the
    /// platform gateway.
    ///
    /// A `None` channel signals that the account left (or was removed
    /// from) voice, and tears the session down.
    #[instrument(skip(self))]
    #[inline]
    pub fn update_state<C>(&mut self, session_id: String, channel_id: Option<C>)
    where
        C: Into<ChannelId> + Debug,
    {
        self._update_state(session_id, channel_id.map(Into::into));
    }

    fn _update_state(&mut self, session_id: String, channel_id: Option<ChannelId>) {
        if let Some(channel_id) = channel_id {
            let try_conn = if let Some((progress, _)) = self.connection.as_mut() {
                progress.apply_state_update(session_id, channel_id)
            } else {
                false
            };

            if try_conn {
                self.do_connect();
            }
        } else {
            // Likely that we were disconnected by an admin.
            self.leave_local();
        }
    }

    /// Processes a voice server update delivered by the platform gateway.
    ///
    /// A `None` endpoint is the platform's explicit signal that no voice
    /// server is available: any handshake or session is rolled back, and
    /// the error is returned to the caller.
    #[instrument(skip(self, token))]
    pub fn update_server(
        &mut self,
        endpoint: Option<String>,
        token: String,
    ) -> Result<(), ServerUpdateError> {
        let Some(endpoint) = endpoint else {
            self.leave_local();
            return Err(ServerUpdateError::NoVoiceServer);
        };

        let try_conn = if let Some((progress, _)) = self.connection.as_mut() {
            progress.apply_server_update(endpoint, token)
        } else {
            false
        };

        if try_conn {
            self.do_connect();
        }

        Ok(())
    }

    /// Sends an update for the current session over the gateway.
    async fn update(&mut self) -> JoinResult<()> {
        let channel_id = self.connection.as_ref().map(|c| c.0.channel_id());

        self.ws
            .update_voice_state(self.guild_id, channel_id, self.self_deaf, self.self_mute)
            .await
    }
}

impl Deref for Call {
    type Target = Driver;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl DerefMut for Call {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_impls::TestEngine;
    use async_trait::async_trait;

    struct NullGateway;

    #[async_trait]
    impl VoiceUpdate for NullGateway {
        async fn update_voice_state(
            &self,
            _guild_id: GuildId,
            _channel_id: Option<ChannelId>,
            _self_deaf: bool,
            _self_mute: bool,
        ) -> JoinResult<()> {
            Ok(())
        }
    }

    fn call() -> Call {
        let (engine, _handle) = TestEngine::new();
        Call::new(GuildId(1), Arc::new(NullGateway), UserId(2), engine)
    }

    #[tokio::test]
    async fn control_ops_require_connection() {
        let mut call = call();

        assert!(matches!(call.mute(true).await, Err(JoinError::NotConnected)));
        assert!(matches!(
            call.deafen(true).await,
            Err(JoinError::NotConnected)
        ));

        let track = Track::from(crate::input::MemorySource::new(vec![0u8; 64]));
        assert!(matches!(call.enqueue(track), Err(JoinError::NotConnected)));
    }

    #[tokio::test]
    async fn null_endpoint_rolls_back_handshake() {
        let mut call = call();

        // Begin a join and half-complete its handshake, then deliver the
        // platform's failure signal.
        let _join = call.join(ChannelId(3)).await.unwrap();
        call.update_state("sess".to_string(), Some(ChannelId(3)));

        let result = call.update_server(None, "tok".to_string());

        assert!(matches!(result, Err(ServerUpdateError::NoVoiceServer)));
        assert!(call.current_connection().is_none());
        assert!(call.current_channel().is_none());
    }

    #[tokio::test]
    async fn state_update_with_null_channel_tears_down() {
        let mut call = call();

        let _join = call.join(ChannelId(3)).await.unwrap();
        assert_eq!(call.current_channel(), Some(ChannelId(3)));

        call.update_state::<ChannelId>("sess".to_string(), None);

        assert!(call.current_channel().is_none());
    }
}
