use crate::id::{ChannelId, GuildId, UserId};
use std::fmt;

/// Join state for one voice session: either still waiting on a half of
/// the handshake, or fully described and ready to hand to the engine.
#[derive(Clone, Debug)]
pub(crate) enum ConnectionProgress {
    Complete(ConnectionInfo),
    Incomplete(Partial),
}

impl ConnectionProgress {
    pub(crate) fn new(guild_id: GuildId, user_id: UserId, channel_id: ChannelId) -> Self {
        ConnectionProgress::Incomplete(Partial {
            channel_id,
            guild_id,
            user_id,
            token: None,
            endpoint: None,
            session_id: None,
        })
    }

    pub(crate) fn get_connection_info(&self) -> Option<&ConnectionInfo> {
        if let Self::Complete(c) = self {
            Some(c)
        } else {
            None
        }
    }

    pub(crate) fn in_progress(&self) -> bool {
        matches!(self, ConnectionProgress::Incomplete(_))
    }

    pub(crate) fn channel_id(&self) -> ChannelId {
        match self {
            ConnectionProgress::Complete(info) => info
                .channel_id
                .expect("All code paths set channel_id for local tracking."),
            ConnectionProgress::Incomplete(part) => part.channel_id,
        }
    }

    pub(crate) fn guild_id(&self) -> GuildId {
        match self {
            ConnectionProgress::Complete(info) => info.guild_id,
            ConnectionProgress::Incomplete(part) => part.guild_id,
        }
    }

    pub(crate) fn user_id(&self) -> UserId {
        match self {
            ConnectionProgress::Complete(info) => info.user_id,
            ConnectionProgress::Incomplete(part) => part.user_id,
        }
    }

    /// Applies one state-update half of the handshake, returning `true`
    /// if the stored session info changed in a way that needs a (re)connect.
    pub(crate) fn apply_state_update(&mut self, session_id: String, channel_id: ChannelId) -> bool {
        if self.channel_id() != channel_id {
            // The account was moved into another channel mid-handshake;
            // server details for the old channel no longer apply.
            *self = ConnectionProgress::new(self.guild_id(), self.user_id(), channel_id);
        }

        match self {
            Self::Complete(c) => {
                let should_reconn = c.session_id != session_id;
                c.session_id = session_id;
                should_reconn
            },
            Self::Incomplete(i) => i
                .apply_state_update(session_id)
                .map(|info| {
                    *self = Self::Complete(info);
                })
                .is_some(),
        }
    }

    /// Applies one server-update half of the handshake, returning `true`
    /// if the stored session info changed in a way that needs a (re)connect.
    pub(crate) fn apply_server_update(&mut self, endpoint: String, token: String) -> bool {
        match self {
            Self::Complete(c) => {
                let should_reconn = c.endpoint != endpoint || c.token != token;

                c.endpoint = endpoint;
                c.token = token;

                should_reconn
            },
            Self::Incomplete(i) => i
                .apply_server_update(endpoint, token)
                .map(|info| {
                    *self = Self::Complete(info);
                })
                .is_some(),
        }
    }
}

/// Parameters needed to open a session against the platform's voice
/// servers via an [`Engine`].
///
/// [`Engine`]: crate::driver::Engine
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct ConnectionInfo {
    /// ID of the voice channel being joined, if it is known.
    ///
    /// This is not needed to establish a connection, but is useful
    /// for book-keeping.
    pub channel_id: Option<ChannelId>,
    /// Address of the voice server assigned to this session.
    pub endpoint: String,
    /// ID of the target voice channel's parent guild.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation purposes.
    pub session_id: String,
    /// Ephemeral secret used to validate the above session.
    pub token: String,
    /// User ID of this account.
    pub user_id: UserId,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("channel_id", &self.channel_id)
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct Partial {
    pub channel_id: ChannelId,
    pub endpoint: Option<String>,
    pub guild_id: GuildId,
    pub session_id: Option<String>,
    pub token: Option<String>,
    pub user_id: UserId,
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("channel_id", &self.channel_id)
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token_is_some", &self.token.is_some())
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Partial {
    fn finalise(&mut self) -> Option<ConnectionInfo> {
        if self.endpoint.is_some() && self.session_id.is_some() && self.token.is_some() {
            let endpoint = self.endpoint.take().unwrap();
            let session_id = self.session_id.take().unwrap();
            let token = self.token.take().unwrap();

            Some(ConnectionInfo {
                channel_id: Some(self.channel_id),
                endpoint,
                session_id,
                token,
                guild_id: self.guild_id,
                user_id: self.user_id,
            })
        } else {
            None
        }
    }

    fn apply_state_update(&mut self, session_id: String) -> Option<ConnectionInfo> {
        self.session_id = Some(session_id);

        self.finalise()
    }

    fn apply_server_update(&mut self, endpoint: String, token: String) -> Option<ConnectionInfo> {
        self.endpoint = Some(endpoint);
        self.token = Some(token);

        self.finalise()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId(1);
    const USER: UserId = UserId(2);
    const CHANNEL: ChannelId = ChannelId(3);

    fn fresh() -> ConnectionProgress {
        ConnectionProgress::new(GUILD, USER, CHANNEL)
    }

    #[test]
    fn state_then_server_completes_once() {
        let mut progress = fresh();

        assert!(!progress.apply_state_update("sess".into(), CHANNEL));
        assert!(progress.in_progress());

        assert!(progress.apply_server_update("wss://a".into(), "tok".into()));
        let info = progress.get_connection_info().unwrap();
        assert_eq!(info.session_id, "sess");
        assert_eq!(info.endpoint, "wss://a");
        assert_eq!(info.channel_id, Some(CHANNEL));
    }

    #[test]
    fn server_then_state_completes_once() {
        let mut progress = fresh();

        assert!(!progress.apply_server_update("wss://a".into(), "tok".into()));
        assert!(progress.in_progress());

        assert!(progress.apply_state_update("sess".into(), CHANNEL));
        assert!(!progress.in_progress());
    }

    #[test]
    fn partial_information_never_completes() {
        let mut progress = fresh();

        assert!(!progress.apply_server_update("wss://a".into(), "tok".into()));
        assert!(progress.get_connection_info().is_none());
    }

    #[test]
    fn channel_move_resets_server_half() {
        let mut progress = fresh();

        assert!(!progress.apply_server_update("wss://a".into(), "tok".into()));

        // A state-update naming a different channel invalidates the old
        // server details, so the handshake must not complete yet.
        let moved = ChannelId(99);
        assert!(!progress.apply_state_update("sess".into(), moved));
        assert!(progress.in_progress());
        assert_eq!(progress.channel_id(), moved);

        assert!(progress.apply_server_update("wss://b".into(), "tok2".into()));
        assert_eq!(progress.get_connection_info().unwrap().endpoint, "wss://b");
    }

    #[test]
    fn duplicate_updates_after_completion_do_not_recomplete() {
        let mut progress = fresh();
        progress.apply_state_update("sess".into(), CHANNEL);
        progress.apply_server_update("wss://a".into(), "tok".into());

        // Identical repeats change nothing.
        assert!(!progress.apply_state_update("sess".into(), CHANNEL));
        assert!(!progress.apply_server_update("wss://a".into(), "tok".into()));

        // Changed fields are stored and flagged for reconnection.
        assert!(progress.apply_server_update("wss://b".into(), "tok".into()));
        assert_eq!(progress.get_connection_info().unwrap().endpoint, "wss://b");
    }
}
