//! Seams between the guild player and its external collaborators.
//!
//! The player only talks to voice, chat and stream providers through these
//! traits; `crate::bot` implements them on top of songbird and serenity.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::player::GuildCommand;
use crate::audio::track::{AudioSource, Track, TrackInfo};
use crate::error::MusicResult;

/// Completion callback handed to a voice session with every track.
///
/// Firing it never touches guild state directly: it posts a message onto the
/// guild's command channel, tagged with the play token it was issued for.
#[derive(Debug, Clone)]
pub struct EndSignal {
    tx: UnboundedSender<GuildCommand>,
    token: u64,
}

impl EndSignal {
    pub(crate) fn new(tx: UnboundedSender<GuildCommand>, token: u64) -> Self {
        Self { tx, token }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// Avisa al reproductor que el track terminó
    pub fn fire(&self) {
        // El actor puede haber terminado (guild eliminado)
        let _ = self.tx.send(GuildCommand::TrackEnded { token: self.token });
    }
}

/// An established audio connection to one voice channel.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Starts `source` at `volume` (1.0 = 100%), replacing whatever is playing.
    /// `on_end` must fire once when the track finishes, fails or is stopped.
    async fn play(&self, source: AudioSource, volume: f32, on_end: EndSignal) -> MusicResult<()>;

    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    /// Stops the current track. Its `on_end` fires.
    async fn stop(&self);

    async fn set_volume(&self, volume: f32);

    /// Moves the connection to another voice channel of the same guild.
    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()>;

    async fn disconnect(&self);
}

/// Opens voice sessions.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceSession>>;
}

/// Referencia a un mensaje enviado al chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoticeRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Chat-side notifications issued by the player without a command to answer.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn now_playing(&self, track: &TrackInfo) -> anyhow::Result<NoticeRef>;

    async fn retract(&self, notice: NoticeRef) -> anyhow::Result<()>;

    async fn notice(&self, text: &str) -> anyhow::Result<()>;
}

/// Turns a track's provider reference into a fetchable audio stream URL.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve_stream(&self, track: &mut Track) -> anyhow::Result<()>;
}
