//! Gateway payload bodies exchanged with the platform.
//!
//! These types mirror the wire shape of the voice-related gateway messages:
//! the two inbound handshake halves ([`payload::VoiceStateUpdate`],
//! [`payload::VoiceServerUpdate`]), inbound speaking notifications
//! ([`payload::Speaking`]), and the single outbound request
//! ([`payload::VoiceStateChange`]).

pub mod payload {
    //! Message bodies, split out for reuse by gateway adapters.

    use crate::id::{ChannelId, UserId};
    use serde::{Deserialize, Serialize};

    /// Voice state update for this account, delivered by the platform
    /// gateway as one half of the connection handshake.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub struct VoiceStateUpdate {
        /// Platform-assigned session identifier.
        pub session_id: String,
        /// Channel the account now occupies; `None` means it has left voice.
        pub channel_id: Option<ChannelId>,
    }

    /// Voice server description, delivered by the platform gateway as the
    /// other half of the connection handshake.
    ///
    /// A `None` endpoint is an explicit signal that the allocated voice
    /// server is unavailable, not a transient omission.
    #[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub struct VoiceServerUpdate {
        /// Address of the allocated voice server.
        pub endpoint: Option<String>,
        /// Ephemeral secret used to authenticate against `endpoint`.
        pub token: String,
    }

    /// Speaking-state notification for another participant, used to map a
    /// transport SSRC back to a platform user.
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub struct Speaking {
        /// Synchronisation source of the participant's audio stream.
        pub ssrc: u32,
        /// The participant's user ID, if the platform has resolved it.
        pub user_id: Option<UserId>,
        /// Whether the participant has begun (`true`) or ceased (`false`)
        /// transmitting.
        pub speaking: bool,
    }

    /// Outbound voice-state change request.
    ///
    /// `channel_id = None` requests leaving voice entirely.
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub struct VoiceStateChange {
        /// Target channel, or `None` to disconnect.
        pub channel_id: Option<ChannelId>,
        /// Whether the account mutes its own transmission.
        pub self_mute: bool,
        /// Whether the account ignores inbound audio.
        pub self_deaf: bool,
    }
}
