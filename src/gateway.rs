//! Outbound contract to the platform gateway.

use crate::{
    error::JoinResult,
    id::{ChannelId, GuildId},
};
use async_trait::async_trait;

/// Sink for outbound voice-state change requests.
///
/// This is the only outbound dependency a [`Call`] has on the platform
/// gateway: implementors serialise the request (see
/// [`model::payload::VoiceStateChange`]) and send it over whatever
/// websocket or shard machinery the host application owns.
///
/// [`Call`]: crate::Call
/// [`model::payload::VoiceStateChange`]: crate::model::payload::VoiceStateChange
#[async_trait]
pub trait VoiceUpdate: Send + Sync {
    /// Request that the platform move this account into `channel_id`
    /// (or out of voice entirely, when `None`), with the given mute and
    /// deafen flags.
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> JoinResult<()>;
}
