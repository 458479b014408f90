//! # Guild Registry
//!
//! Maps each guild to its player actor. Entries are created when the bot sees
//! a guild (ready / guild create) and torn down when it leaves, which cancels
//! the actor and releases its voice session.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::{
    player::{EnqueueReport, GuildCommand, GuildPlayer, PlayerDeps, PlayerSnapshot, QueueOp},
    queue::{LoopMode, QueuePage},
    session::Notifier,
    track::{Track, TrackInfo},
};
use crate::error::{MusicError, MusicResult};

/// Elementos por página en la vista de la cola
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Cheap, cloneable client of one guild's player.
#[derive(Clone)]
pub struct GuildHandle {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<GuildCommand>,
}

impl GuildHandle {
    pub(crate) fn new(guild_id: GuildId, tx: mpsc::UnboundedSender<GuildCommand>) -> Self {
        Self { guild_id, tx }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<MusicResult<T>>) -> GuildCommand,
    ) -> MusicResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| MusicError::GuildUnavailable)?;
        rx.await.map_err(|_| MusicError::GuildUnavailable)?
    }

    /// Conecta al canal si todavía no hay sesión
    pub async fn connect(&self, channel: Option<ChannelId>) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Connect { channel, reply }).await
    }

    /// Appends tracks without starting playback.
    pub async fn enqueue(&self, tracks: Vec<Track>) -> MusicResult<EnqueueReport> {
        self.request(|reply| GuildCommand::Enqueue { tracks, reply }).await
    }

    /// Starts the queue if nothing is playing. Returns whether a track started.
    pub async fn start(&self) -> MusicResult<bool> {
        self.request(|reply| GuildCommand::Start { reply }).await
    }

    /// Connect, enqueue and start in one step.
    pub async fn play(
        &self,
        tracks: Vec<Track>,
        channel: Option<ChannelId>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> MusicResult<EnqueueReport> {
        self.request(|reply| GuildCommand::Play {
            tracks,
            channel,
            notifier,
            reply,
        })
        .await
    }

    /// Skips the current track, or `amount` tracks counting the current one.
    pub async fn skip(&self, amount: Option<usize>) -> MusicResult<usize> {
        self.request(|reply| GuildCommand::Skip { amount, reply }).await
    }

    pub async fn stop(&self) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Stop { reply }).await
    }

    pub async fn pause(&self) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Pause { reply }).await
    }

    pub async fn resume(&self) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Resume { reply }).await
    }

    pub async fn seek(&self, position: Duration) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Seek { position, reply }).await
    }

    pub async fn replay(&self) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Replay { reply }).await
    }

    pub async fn edit(&self, op: QueueOp) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Edit { op, reply }).await
    }

    /// Sets the loop mode, or cycles it when `mode` is `None`.
    pub async fn set_loop(&self, mode: Option<LoopMode>) -> MusicResult<LoopMode> {
        self.request(|reply| GuildCommand::SetLoop { mode, reply }).await
    }

    /// Queries the volume, or sets it (percent) when `percent` is given.
    pub async fn volume(&self, percent: Option<f32>) -> MusicResult<f32> {
        self.request(|reply| GuildCommand::Volume { percent, reply }).await
    }

    /// 0-based.
    pub async fn track_at(&self, index: usize) -> MusicResult<TrackInfo> {
        self.request(|reply| GuildCommand::TrackAt { index, reply }).await
    }

    pub async fn snapshot(&self) -> MusicResult<PlayerSnapshot> {
        self.request(|reply| GuildCommand::Snapshot { reply }).await
    }

    pub async fn current_track(&self) -> MusicResult<Option<TrackInfo>> {
        Ok(self.snapshot().await?.current)
    }

    pub async fn is_playing(&self) -> MusicResult<bool> {
        Ok(self.snapshot().await?.is_playing)
    }

    /// Página de la cola; fuera de rango da la vuelta
    pub async fn queue_page(&self, page: i64) -> MusicResult<QueuePage> {
        let snapshot = self.snapshot().await?;
        if !snapshot.is_playing {
            return Err(MusicError::NotPlaying);
        }
        if snapshot.queue.is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        Ok(QueuePage::build(snapshot.queue, page, QUEUE_PAGE_SIZE))
    }

    /// Reports that the bot's voice state left `channel`.
    pub fn disconnected(&self, channel: Option<ChannelId>) {
        let _ = self.tx.send(GuildCommand::Disconnected { channel });
    }

    /// Reports that the bot's voice state is now `channel`.
    pub fn moved(&self, channel: ChannelId) {
        let _ = self.tx.send(GuildCommand::Moved { channel });
    }

    pub async fn leave(&self) -> MusicResult<()> {
        self.request(|reply| GuildCommand::Leave { reply }).await
    }
}

struct GuildEntry {
    handle: GuildHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registro de reproductores por servidor
pub struct GuildRegistry {
    guilds: DashMap<GuildId, GuildEntry>,
    deps: PlayerDeps,
}

impl GuildRegistry {
    pub fn new(deps: PlayerDeps) -> Self {
        Self {
            guilds: DashMap::new(),
            deps,
        }
    }

    /// Returns the guild's player, spawning it on first use.
    pub fn ensure(&self, guild_id: GuildId) -> GuildHandle {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                let cancel = CancellationToken::new();
                let (handle, task) = GuildPlayer::spawn(guild_id, self.deps.clone(), cancel.clone());
                info!("➕ Reproductor creado para guild {}", guild_id);
                GuildEntry { handle, cancel, task }
            })
            .handle
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildHandle> {
        self.guilds.get(&guild_id).map(|entry| entry.handle.clone())
    }

    /// Stops the guild's player; its session is released before the task ends.
    pub fn remove(&self, guild_id: GuildId) -> Option<JoinHandle<()>> {
        let (_, entry) = self.guilds.remove(&guild_id)?;
        entry.cancel.cancel();
        info!("➖ Reproductor eliminado para guild {}", guild_id);
        Some(entry.task)
    }

    /// Cancela todos los reproductores (apagado del bot)
    pub async fn shutdown(&self) {
        let ids: Vec<GuildId> = self.guilds.iter().map(|entry| *entry.key()).collect();
        let tasks: Vec<JoinHandle<()>> = ids.into_iter().filter_map(|guild_id| self.remove(guild_id)).collect();
        info!("🛑 Deteniendo {} reproductores", tasks.len());
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("Reproductor terminó con error: {:?}", e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}
