#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Warbler is an async voice session library for chat platforms, written
//! in Rust. The library offers:
//!  * A per-guild session handler ([`Call`]) which reconciles the
//!    platform's two independently-delivered handshake messages into a
//!    single connect/move/reconnect/disconnect lifecycle, behind a
//!    guild-keyed manager ([`Warbler`]).
//!  * Controllable, loopable, volume-adjustable audio playback over a
//!    serial queue ([`tracks`]), advanced one engine time-slice at a
//!    time.
//!  * Receipt of remote participants' audio as periodic [`VoiceTick`]s,
//!    fanned out to registered [`Receiver`]s with derived speaking-state
//!    edges, including a ready-made multi-file WAV recorder
//!    ([`WavRecorder`]).
//!
//! The audio transport itself (sockets, encryption, jitter, codecs) and
//! the platform websocket are *not* part of this crate: they are injected
//! collaborators behind the [`Engine`] and [`VoiceUpdate`] traits, which
//! lets the same session logic run against any transport or gateway
//! implementation, including in-memory doubles for testing.
//!
//! [`VoiceTick`]: crate::receive::VoiceTick
//! [`Receiver`]: crate::receive::Receiver
//! [`WavRecorder`]: crate::receive::WavRecorder
//! [`Engine`]: crate::driver::Engine
//! [`VoiceUpdate`]: crate::gateway::VoiceUpdate

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
)]

mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod gateway;
mod handler;
pub mod id;
pub(crate) mod info;
pub mod input;
mod join;
mod manager;
pub mod model;
pub mod receive;
pub mod tracks;

pub use crate::{
    config::Config,
    driver::Driver,
    gateway::VoiceUpdate,
    handler::Call,
    info::ConnectionInfo,
    join::Join,
    manager::{GatewayEvent, Warbler},
};
