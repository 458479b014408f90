//! # Guild Player
//!
//! One actor task per guild owns the whole playback state: the queue, the
//! current track, the voice session and the idle-disconnect timer. Chat
//! commands and voice completion callbacks both reach it as
//! [`GuildCommand`] messages on a single channel, so queue mutations and
//! advances are serialized without locks and only one advance can ever be in
//! flight.
//!
//! ## States
//!
//! - **Idle**: no current track, empty queue. A session may still be open;
//!   the idle timer disconnects it after `idle_timeout`.
//! - **Playing** / **Paused**: `current` is set and bound to the session.
//! - **Advancing**: transient, inside [`GuildPlayer::advance`].
//!
//! Every start of playback gets a fresh play token. Completion signals
//! carrying an older token are stale and ignored.
//!
//! Disconnects the player starts itself (`/leave`, inactivity, a failed
//! session) come back later as a voice-state echo. The channels it left are
//! remembered until their echo arrives, so a late echo never tears down a
//! session opened in the meantime.

use serenity::model::id::{ChannelId, GuildId};
use std::{ops::Range, sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{
    queue::{LoopMode, TrackQueue},
    registry::GuildHandle,
    session::{EndSignal, NoticeRef, Notifier, StreamResolver, VoiceConnector, VoiceSession},
    track::{AudioSource, Track, TrackInfo},
};
use crate::error::{MusicError, MusicResult};

type Reply<T> = oneshot::Sender<MusicResult<T>>;

/// Mensajes que recibe el actor de cada servidor
pub enum GuildCommand {
    Connect {
        channel: Option<ChannelId>,
        reply: Reply<()>,
    },
    /// Appends without starting playback.
    Enqueue {
        tracks: Vec<Track>,
        reply: Reply<EnqueueReport>,
    },
    /// Advances if nothing is playing.
    Start {
        reply: Reply<bool>,
    },
    /// Connect if needed, enqueue, then start if idle.
    Play {
        tracks: Vec<Track>,
        channel: Option<ChannelId>,
        notifier: Option<Arc<dyn Notifier>>,
        reply: Reply<EnqueueReport>,
    },
    TrackEnded {
        token: u64,
    },
    Skip {
        amount: Option<usize>,
        reply: Reply<usize>,
    },
    Stop {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Seek {
        position: Duration,
        reply: Reply<()>,
    },
    Replay {
        reply: Reply<()>,
    },
    Edit {
        op: QueueOp,
        reply: Reply<()>,
    },
    SetLoop {
        mode: Option<LoopMode>,
        reply: Reply<LoopMode>,
    },
    Volume {
        percent: Option<f32>,
        reply: Reply<f32>,
    },
    TrackAt {
        index: usize,
        reply: Reply<TrackInfo>,
    },
    Snapshot {
        reply: Reply<PlayerSnapshot>,
    },
    /// Voice-state report: the bot is no longer in `channel` (unknown when
    /// the previous state was not cached).
    Disconnected {
        channel: Option<ChannelId>,
    },
    /// Voice-state report: the bot is now in `channel`.
    Moved {
        channel: ChannelId,
    },
    Leave {
        reply: Reply<()>,
    },
}

/// Mutaciones de la cola
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOp {
    Remove(usize),
    RemoveRange(Range<usize>),
    RemoveLast,
    Move { from: usize, to: usize },
    MoveLast,
    Swap(usize, usize),
    Reverse,
    Shuffle,
    Clear,
}

/// Resultado de agregar canciones
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueReport {
    pub added: usize,
    /// 1-based queue position of the first added track.
    pub position: usize,
    /// Time until the first added track starts.
    pub wait: Duration,
    /// Playback started from idle with this batch.
    pub started: bool,
}

/// Read-only view of a guild's playback state.
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub current: Option<TrackInfo>,
    pub queue: Vec<TrackInfo>,
    pub is_playing: bool,
    pub paused: bool,
    pub connected: bool,
    pub channel: Option<ChannelId>,
    pub loop_mode: LoopMode,
    pub volume: f32,
    pub queue_duration: Duration,
}

/// Ajustes de reproducción por servidor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuildSettings {
    /// Percent, 0-200.
    pub volume: f32,
    pub loop_mode: LoopMode,
}

#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub idle_timeout: Duration,
    pub max_queue_size: usize,
    pub default_volume: f32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            max_queue_size: 1000,
            default_volume: 100.0,
        }
    }
}

/// Shared collaborators every guild player is built with.
#[derive(Clone)]
pub struct PlayerDeps {
    pub connector: Arc<dyn VoiceConnector>,
    pub streams: Arc<dyn StreamResolver>,
    pub options: PlayerOptions,
}

pub struct GuildPlayer {
    guild_id: GuildId,
    queue: TrackQueue,
    current: Option<Track>,
    session: Option<Arc<dyn VoiceSession>>,
    channel: Option<ChannelId>,
    /// Canales que dejamos y cuyo eco de voice state no llegó todavía
    own_leaves: Vec<ChannelId>,
    is_playing: bool,
    now_playing: Option<NoticeRef>,
    notifier: Option<Arc<dyn Notifier>>,
    settings: GuildSettings,
    token: u64,
    idle_deadline: Option<Instant>,
    idle_timeout: Duration,
    connector: Arc<dyn VoiceConnector>,
    streams: Arc<dyn StreamResolver>,
    tx: mpsc::UnboundedSender<GuildCommand>,
}

impl GuildPlayer {
    /// Crea el actor del servidor y lo lanza en segundo plano
    pub fn spawn(guild_id: GuildId, deps: PlayerDeps, cancel: CancellationToken) -> (GuildHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = GuildPlayer {
            guild_id,
            queue: TrackQueue::new(deps.options.max_queue_size),
            current: None,
            session: None,
            channel: None,
            own_leaves: Vec::new(),
            is_playing: false,
            now_playing: None,
            notifier: None,
            settings: GuildSettings {
                volume: deps.options.default_volume,
                loop_mode: LoopMode::Disabled,
            },
            token: 0,
            idle_deadline: None,
            idle_timeout: deps.options.idle_timeout,
            connector: deps.connector,
            streams: deps.streams,
            tx: tx.clone(),
        };
        let task = tokio::spawn(player.run(rx, cancel));
        (GuildHandle::new(guild_id, tx), task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GuildCommand>, cancel: CancellationToken) {
        debug!("🎛️ Reproductor iniciado para guild {}", self.guild_id);
        loop {
            let deadline = self.idle_deadline;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = idle_wait(deadline) => self.on_idle_timeout().await,
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }
        self.reset().await;
        info!("👋 Reproductor detenido para guild {}", self.guild_id);
    }

    async fn handle(&mut self, command: GuildCommand) {
        match command {
            GuildCommand::Connect { channel, reply } => {
                let _ = reply.send(self.ensure_session(channel).await);
            }
            GuildCommand::Enqueue { tracks, reply } => {
                let _ = reply.send(self.enqueue(tracks));
            }
            GuildCommand::Start { reply } => {
                let _ = reply.send(self.start_if_idle().await);
            }
            GuildCommand::Play {
                tracks,
                channel,
                notifier,
                reply,
            } => {
                let _ = reply.send(self.play(tracks, channel, notifier).await);
            }
            GuildCommand::TrackEnded { token } => self.on_track_end(token).await,
            GuildCommand::Skip { amount, reply } => {
                let _ = reply.send(self.skip(amount).await);
            }
            GuildCommand::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            GuildCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            GuildCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            GuildCommand::Seek { position, reply } => {
                let _ = reply.send(self.seek(position).await);
            }
            GuildCommand::Replay { reply } => {
                let _ = reply.send(self.replay().await);
            }
            GuildCommand::Edit { op, reply } => {
                let _ = reply.send(self.edit(op));
            }
            GuildCommand::SetLoop { mode, reply } => {
                self.settings.loop_mode = mode.unwrap_or_else(|| self.settings.loop_mode.next());
                info!("🔁 Loop `{}` en guild {}", self.settings.loop_mode.as_str(), self.guild_id);
                let _ = reply.send(Ok(self.settings.loop_mode));
            }
            GuildCommand::Volume { percent, reply } => {
                let _ = reply.send(self.volume(percent).await);
            }
            GuildCommand::TrackAt { index, reply } => {
                let result = self.ensure_playing().and_then(|_| self.queue.get(index).map(Track::info));
                let _ = reply.send(result);
            }
            GuildCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            GuildCommand::Disconnected { channel } => self.on_disconnected(channel).await,
            GuildCommand::Moved { channel } => {
                if self.session.is_some() && self.channel != Some(channel) {
                    info!("🔀 Bot movido al canal {} en guild {}", channel, self.guild_id);
                    self.channel = Some(channel);
                }
            }
            GuildCommand::Leave { reply } => {
                if self.session.is_none() {
                    let _ = reply.send(Err(MusicError::NotInVoice));
                    return;
                }
                self.reset().await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    /// Connects to `channel`, or moves the open session there when the
    /// caller is in a different channel.
    async fn ensure_session(&mut self, channel: Option<ChannelId>) -> MusicResult<()> {
        if let Some(session) = self.session.clone() {
            if let Some(channel) = channel.filter(|c| self.channel != Some(*c)) {
                session.move_to(channel).await?;
                info!("🔀 Movido al canal de voz {} en guild {}", channel, self.guild_id);
                self.channel = Some(channel);
            }
            return Ok(());
        }
        let channel = channel.ok_or(MusicError::NotInVoice)?;
        let session = self.connector.connect(self.guild_id, channel).await?;
        info!("🔊 Conectado al canal de voz {} en guild {}", channel, self.guild_id);
        self.session = Some(session);
        self.channel = Some(channel);
        Ok(())
    }

    async fn on_disconnected(&mut self, channel: Option<ChannelId>) {
        let echo = match channel {
            Some(channel) => self.own_leaves.iter().position(|c| *c == channel),
            None => (!self.own_leaves.is_empty()).then_some(0),
        };
        if let Some(index) = echo {
            self.own_leaves.remove(index);
            debug!("Eco de desconexión propia en guild {}", self.guild_id);
            return;
        }
        if self.session.is_none() {
            debug!("Desconexión ya procesada en guild {}", self.guild_id);
            return;
        }
        warn!("🔌 Bot desconectado de voz en guild {}", self.guild_id);
        // Ya estamos fuera del canal: no habrá eco
        self.channel = None;
        self.reset().await;
    }

    /// Closes the session and remembers the channel until its echo arrives.
    async fn leave_voice(&mut self, session: Arc<dyn VoiceSession>) {
        session.disconnect().await;
        if let Some(channel) = self.channel.take() {
            self.own_leaves.push(channel);
        }
    }

    fn enqueue(&mut self, tracks: Vec<Track>) -> MusicResult<EnqueueReport> {
        let ahead = self.queue.len();
        let wait = self.current.as_ref().map(Track::remaining).unwrap_or_default()
            + self.queue.total_duration();
        let added = self.queue.append(tracks)?;
        Ok(EnqueueReport {
            added,
            position: ahead + 1,
            wait,
            started: false,
        })
    }

    async fn play(
        &mut self,
        tracks: Vec<Track>,
        channel: Option<ChannelId>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> MusicResult<EnqueueReport> {
        self.ensure_session(channel).await?;
        if notifier.is_some() {
            self.notifier = notifier;
        }
        let mut report = self.enqueue(tracks)?;
        report.started = self.start_if_idle().await?;
        Ok(report)
    }

    async fn start_if_idle(&mut self) -> MusicResult<bool> {
        if self.is_playing {
            return Ok(false);
        }
        if self.queue.is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        if self.session.is_none() {
            return Err(MusicError::NotInVoice);
        }
        self.advance().await;
        Ok(self.is_playing)
    }

    async fn on_track_end(&mut self, token: u64) {
        if token != self.token || !self.is_playing {
            debug!("Ignorando fin de track obsoleto ({} != {})", token, self.token);
            return;
        }
        debug!("Track terminado, reproduciendo siguiente...");
        self.advance().await;
    }

    /// Picks the next track and starts it, or goes idle when none is left.
    async fn advance(&mut self) {
        self.recycle_outgoing();

        while let Some(mut track) = self.queue.pop_front() {
            self.token += 1;
            match self.start_track(&mut track).await {
                Ok(()) => {
                    info!("🎵 Reproduciendo: {}", track.title());
                    track.begin();
                    self.current = Some(track);
                    self.is_playing = true;
                    self.idle_deadline = None;
                    self.refresh_now_playing().await;
                    return;
                }
                Err(e) if e.is_session_failure() => {
                    error!("❌ Falló la sesión de voz en guild {}: {}", self.guild_id, e);
                    self.reset().await;
                    self.announce(&e.notice()).await;
                    return;
                }
                Err(e) => {
                    warn!("⏭️ Saltando track problemático {}: {}", track.title(), e);
                }
            }
        }

        self.go_idle().await;
    }

    /// Loop policy, applied to the outgoing track before the next pop.
    fn recycle_outgoing(&mut self) {
        let Some(mut outgoing) = self.current.take() else {
            return;
        };
        if !outgoing.is_reloopable() {
            return;
        }
        match self.settings.loop_mode {
            LoopMode::Queue => {
                outgoing.rewind();
                debug!("🔁 Track agregado al final por loop de cola: {}", outgoing.title());
                self.queue.push_back(outgoing);
            }
            LoopMode::Song => {
                outgoing.rewind();
                debug!("🔂 Repitiendo track: {}", outgoing.title());
                self.queue.push_front(outgoing);
            }
            LoopMode::Disabled => {}
        }
    }

    async fn start_track(&self, track: &mut Track) -> MusicResult<()> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| MusicError::SessionError("sin conexión de voz".into()))?;

        let source = match track.take_prepared() {
            Some(source) => source,
            None => {
                if track.stream_url().is_none() {
                    self.streams
                        .resolve_stream(track)
                        .await
                        .map_err(|e| MusicError::TrackStartFailure(format!("{:#}", e)))?;
                }
                let url = track
                    .stream_url()
                    .ok_or_else(|| MusicError::TrackStartFailure("sin URL de stream".into()))?;
                AudioSource::new(url)
            }
        };

        let on_end = EndSignal::new(self.tx.clone(), self.token);
        session.play(source, self.settings.volume / 100.0, on_end).await
    }

    async fn go_idle(&mut self) {
        self.is_playing = false;
        self.current = None;
        self.refresh_now_playing().await;
        info!("📭 Cola vacía en guild {}", self.guild_id);

        if self.session.is_some() {
            self.idle_deadline = Some(Instant::now() + self.idle_timeout);
            debug!(
                "⏳ Desconexión por inactividad en {}",
                humantime::format_duration(self.idle_timeout)
            );
        }
    }

    async fn on_idle_timeout(&mut self) {
        self.idle_deadline = None;
        if self.is_playing {
            return;
        }
        if let Some(session) = self.session.take() {
            info!("🚪 Desconectando por inactividad en guild {}", self.guild_id);
            self.leave_voice(session).await;
        }
    }

    /// Posts the new "now playing" message and retracts the previous one.
    async fn refresh_now_playing(&mut self) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let previous = self.now_playing.take();

        if let Some(track) = &self.current {
            match notifier.now_playing(&track.info()).await {
                Ok(notice) => self.now_playing = Some(notice),
                Err(e) => warn!("Error al enviar mensaje now playing: {:?}", e),
            }
        }
        if let Some(previous) = previous {
            if let Err(e) = notifier.retract(previous).await {
                warn!("Error al borrar mensaje now playing: {:?}", e);
            }
        }
    }

    async fn announce(&self, text: &str) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notice(text).await {
                warn!("Error al enviar aviso: {:?}", e);
            }
        }
    }

    /// Hard reset: stop, disconnect, forget the queue.
    async fn reset(&mut self) {
        // Invalida las señales pendientes del track actual
        self.token += 1;
        self.idle_deadline = None;
        if let Some(session) = self.session.take() {
            session.stop().await;
            self.leave_voice(session).await;
        }
        self.channel = None;
        self.queue.clear();
        self.current = None;
        self.is_playing = false;
    }

    fn ensure_playing(&self) -> MusicResult<()> {
        if self.is_playing {
            Ok(())
        } else {
            Err(MusicError::NotPlaying)
        }
    }

    fn active_session(&self) -> MusicResult<Arc<dyn VoiceSession>> {
        self.ensure_playing()?;
        self.session
            .clone()
            .ok_or_else(|| MusicError::SessionError("sin conexión de voz".into()))
    }

    async fn skip(&mut self, amount: Option<usize>) -> MusicResult<usize> {
        let session = self.active_session()?;
        let skipped = match amount {
            Some(amount) if amount > 1 => {
                if self.queue.is_empty() {
                    return Err(MusicError::EmptyQueue);
                }
                self.queue.skip(amount - 1) + 1
            }
            _ => 1,
        };
        info!("⏭️ Saltando {} canciones", skipped);
        session.stop().await;
        Ok(skipped)
    }

    async fn stop(&mut self) -> MusicResult<()> {
        let session = self.active_session()?;
        self.queue.clear();
        if let Some(current) = self.current.as_mut() {
            current.retire();
        }
        session.stop().await;
        info!("⏹️ Reproducción detenida");
        Ok(())
    }

    async fn pause(&mut self) -> MusicResult<()> {
        let session = self.active_session()?;
        let current = self.current.as_mut().ok_or(MusicError::NotPlaying)?;
        if current.is_frozen() {
            return Err(MusicError::AlreadyPaused);
        }
        session.pause().await?;
        current.pause();
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    async fn resume(&mut self) -> MusicResult<()> {
        let session = self.active_session()?;
        let current = self.current.as_mut().ok_or(MusicError::NotPlaying)?;
        if !current.is_frozen() {
            return Err(MusicError::NotPaused);
        }
        session.resume().await?;
        current.resume();
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// Puts a copy of the current track that starts at `position` at the head
    /// of the queue and stops the session; the normal end-of-track path plays
    /// it through its prepared source.
    async fn seek(&mut self, position: Duration) -> MusicResult<()> {
        let session = self.active_session()?;
        let current = self.current.as_mut().ok_or(MusicError::NotPlaying)?;
        let duration = current.duration();
        if !duration.is_zero() && position >= duration {
            return Err(MusicError::SeekBeyondEnd {
                requested: position,
                duration,
            });
        }
        let url = current
            .stream_url()
            .ok_or_else(|| MusicError::TrackStartFailure("sin URL de stream".into()))?
            .to_string();

        let copy = current.replay_from(AudioSource::starting_at(url, position));
        current.retire();
        info!("⏩ Seek a {} en {}", crate::audio::track::format_duration(position), copy.title());
        self.queue.push_front(copy);
        session.stop().await;
        Ok(())
    }

    async fn replay(&mut self) -> MusicResult<()> {
        let session = self.active_session()?;
        let current = self.current.as_mut().ok_or(MusicError::NotPlaying)?;
        let copy = current.restart_copy();
        current.retire();
        self.queue.push_front(copy);
        session.stop().await;
        Ok(())
    }

    fn edit(&mut self, op: QueueOp) -> MusicResult<()> {
        self.ensure_playing()?;
        match op {
            QueueOp::Remove(index) => self.queue.remove(index).map(drop),
            QueueOp::RemoveRange(range) => self.queue.remove_range(range).map(drop),
            QueueOp::RemoveLast => self.queue.remove_last().map(drop),
            QueueOp::Move { from, to } => self.queue.move_track(from, to),
            QueueOp::MoveLast => self.queue.move_last_to_front(),
            QueueOp::Swap(first, second) => self.queue.swap(first, second),
            QueueOp::Reverse => self.queue.reverse(),
            QueueOp::Shuffle => self.queue.shuffle(),
            QueueOp::Clear => {
                if self.queue.is_empty() {
                    return Err(MusicError::EmptyQueue);
                }
                self.queue.clear();
                Ok(())
            }
        }
    }

    async fn volume(&mut self, percent: Option<f32>) -> MusicResult<f32> {
        let Some(percent) = percent else {
            return Ok(self.settings.volume);
        };
        if !(0.0..=200.0).contains(&percent) {
            return Err(MusicError::VolumeOutOfRange(percent));
        }
        self.settings.volume = percent;
        if let (true, Some(session)) = (self.is_playing, &self.session) {
            session.set_volume(percent / 100.0).await;
        }
        info!("🔊 Volumen ajustado a {}%", percent);
        Ok(percent)
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            current: self.current.as_ref().map(Track::info),
            queue: self.queue.snapshot(),
            is_playing: self.is_playing,
            paused: self.current.as_ref().is_some_and(Track::is_frozen),
            connected: self.session.is_some(),
            channel: self.channel,
            loop_mode: self.settings.loop_mode,
            volume: self.settings.volume,
            queue_duration: self.queue.total_duration(),
        }
    }
}

async fn idle_wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct FakeSession {
        /// `play` falla con `SessionError` mientras esté activo
        pub fail_play: AtomicBool,
        pub moves: Mutex<Vec<ChannelId>>,
        pub played: Mutex<Vec<AudioSource>>,
        pub volumes: Mutex<Vec<f32>>,
        pub signal: Mutex<Option<EndSignal>>,
        pub stops: AtomicUsize,
        pub pauses: AtomicUsize,
        pub disconnects: AtomicUsize,
    }

    impl FakeSession {
        /// Simula que el track terminó de forma natural
        pub fn finish(&self) {
            if let Some(signal) = self.signal.lock().take() {
                signal.fire();
            }
        }

        pub fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VoiceSession for FakeSession {
        async fn play(&self, source: AudioSource, volume: f32, on_end: EndSignal) -> MusicResult<()> {
            if self.fail_play.load(Ordering::SeqCst) {
                return Err(MusicError::SessionError("el bot no está en un canal de voz".into()));
            }
            self.played.lock().push(source);
            self.volumes.lock().push(volume);
            *self.signal.lock() = Some(on_end);
            Ok(())
        }

        async fn pause(&self) -> MusicResult<()> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn resume(&self) -> MusicResult<()> {
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.finish();
        }

        async fn set_volume(&self, volume: f32) {
            self.volumes.lock().push(volume);
        }

        async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
            self.moves.lock().push(channel_id);
            Ok(())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) struct FakeConnector {
        pub session: Arc<FakeSession>,
        pub connects: AtomicUsize,
    }

    #[async_trait]
    impl VoiceConnector for FakeConnector {
        async fn connect(&self, _guild: GuildId, _channel: ChannelId) -> MusicResult<Arc<dyn VoiceSession>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.session.clone())
        }
    }

    /// Resuelve `https://stream/<title>`; los títulos "bad*" fallan
    pub(crate) struct FakeStreams;

    #[async_trait]
    impl StreamResolver for FakeStreams {
        async fn resolve_stream(&self, track: &mut Track) -> anyhow::Result<()> {
            if track.title().starts_with("bad") {
                anyhow::bail!("formato no disponible");
            }
            let url = format!("https://stream/{}", track.title());
            track.set_stream(url, None);
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeNotifier {
        pub sent: Mutex<Vec<String>>,
        pub retracted: Mutex<Vec<NoticeRef>>,
        pub notices: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn now_playing(&self, track: &TrackInfo) -> anyhow::Result<NoticeRef> {
            let mut sent = self.sent.lock();
            sent.push(track.title.clone());
            Ok(NoticeRef {
                channel_id: 1,
                message_id: sent.len() as u64,
            })
        }

        async fn retract(&self, notice: NoticeRef) -> anyhow::Result<()> {
            self.retracted.lock().push(notice);
            Ok(())
        }

        async fn notice(&self, text: &str) -> anyhow::Result<()> {
            self.notices.lock().push(text.to_string());
            Ok(())
        }
    }

    pub(crate) fn deps(session: Arc<FakeSession>, idle_timeout: Duration) -> PlayerDeps {
        PlayerDeps {
            connector: Arc::new(FakeConnector {
                session,
                connects: AtomicUsize::new(0),
            }),
            streams: Arc::new(FakeStreams),
            options: PlayerOptions {
                idle_timeout,
                max_queue_size: 100,
                default_volume: 100.0,
            },
        }
    }

    struct Harness {
        handle: GuildHandle,
        session: Arc<FakeSession>,
        notifier: Arc<FakeNotifier>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_idle(Duration::from_secs(600))
        }

        fn with_idle(idle_timeout: Duration) -> Self {
            let session = Arc::new(FakeSession::default());
            let (handle, _task) =
                GuildPlayer::spawn(GuildId::new(1), deps(session.clone(), idle_timeout), CancellationToken::new());
            Self {
                handle,
                session,
                notifier: Arc::new(FakeNotifier::default()),
            }
        }

        async fn play(&self, titles: &[&str]) -> EnqueueReport {
            self.handle
                .play(tracks(titles), Some(ChannelId::new(7)), Some(self.notifier.clone()))
                .await
                .unwrap()
        }

        async fn state(&self) -> PlayerSnapshot {
            let snapshot = self.handle.snapshot().await.unwrap();
            assert_invariants(&snapshot);
            snapshot
        }
    }

    pub(crate) fn tracks(titles: &[&str]) -> Vec<Track> {
        titles
            .iter()
            .map(|t| Track::youtube(*t, format!("https://youtu.be/{}", t), Duration::from_secs(100)))
            .collect()
    }

    fn assert_invariants(snapshot: &PlayerSnapshot) {
        assert_eq!(snapshot.current.is_some(), snapshot.is_playing);
        if let Some(current) = &snapshot.current {
            assert!(snapshot.queue.iter().all(|t| t.id != current.id));
        }
    }

    fn current_title(snapshot: &PlayerSnapshot) -> Option<&str> {
        snapshot.current.as_ref().map(|t| t.title.as_str())
    }

    fn queue_titles(snapshot: &PlayerSnapshot) -> Vec<&str> {
        snapshot.queue.iter().map(|t| t.title.as_str()).collect()
    }

    #[tokio::test]
    async fn enqueue_then_start_plays_from_idle() {
        let h = Harness::new();
        h.handle.connect(Some(ChannelId::new(7))).await.unwrap();
        h.handle.enqueue(tracks(&["lofi beats"])).await.unwrap();

        let idle = h.state().await;
        assert!(!idle.is_playing);
        assert_eq!(queue_titles(&idle), vec!["lofi beats"]);

        assert!(h.handle.start().await.unwrap());
        let playing = h.state().await;
        assert_eq!(current_title(&playing), Some("lofi beats"));
        assert!(playing.queue.is_empty());
        assert_eq!(h.session.played.lock()[0].url, "https://stream/lofi beats");
    }

    #[tokio::test]
    async fn play_sends_one_now_playing_notice() {
        let h = Harness::new();
        let report = h.play(&["lofi beats"]).await;
        assert!(report.started);
        assert_eq!(*h.notifier.sent.lock(), vec!["lofi beats".to_string()]);
        assert!(h.notifier.retracted.lock().is_empty());
    }

    #[tokio::test]
    async fn start_without_session_is_rejected() {
        let h = Harness::new();
        h.handle.enqueue(tracks(&["A"])).await.unwrap();
        assert!(matches!(h.handle.start().await, Err(MusicError::NotInVoice)));
        assert!(matches!(
            h.handle.play(tracks(&["B"]), None, None).await,
            Err(MusicError::NotInVoice)
        ));
    }

    #[tokio::test]
    async fn enqueue_while_playing_reports_position_and_wait() {
        let h = Harness::new();
        h.play(&["A", "B"]).await;
        let report = h.play(&["C"]).await;
        assert!(!report.started);
        assert_eq!(report.position, 2);
        // Lo que resta de A (≈100s) más B (100s)
        assert!(report.wait > Duration::from_secs(199) && report.wait <= Duration::from_secs(200));
    }

    #[tokio::test]
    async fn move_and_swap_reorder_queue() {
        let h = Harness::new();
        h.play(&["now", "A", "B", "C"]).await;

        h.handle.edit(QueueOp::Move { from: 2, to: 0 }).await.unwrap();
        assert_eq!(queue_titles(&h.state().await), vec!["C", "A", "B"]);

        h.handle.edit(QueueOp::Swap(0, 2)).await.unwrap();
        assert_eq!(queue_titles(&h.state().await), vec!["B", "A", "C"]);
    }

    #[tokio::test]
    async fn loop_queue_rotates_tracks() {
        let h = Harness::new();
        h.handle.set_loop(Some(LoopMode::Queue)).await.unwrap();
        h.play(&["A", "B"]).await;

        let expected = [("B", vec!["A"]), ("A", vec!["B"]), ("B", vec!["A"]), ("A", vec!["B"])];
        for (current, queue) in expected {
            h.session.finish();
            let state = h.state().await;
            assert_eq!(current_title(&state), Some(current));
            assert_eq!(queue_titles(&state), queue);
        }
    }

    #[tokio::test]
    async fn loop_song_reinserts_at_head() {
        let h = Harness::new();
        h.handle.set_loop(Some(LoopMode::Song)).await.unwrap();
        h.play(&["A", "B"]).await;

        h.session.finish();
        let state = h.state().await;
        assert_eq!(current_title(&state), Some("A"));
        assert_eq!(queue_titles(&state), vec!["B"]);
    }

    #[tokio::test]
    async fn disabled_loop_drops_finished_tracks() {
        let h = Harness::new();
        h.play(&["A", "B"]).await;
        h.session.finish();
        h.session.finish();
        let state = h.state().await;
        assert!(!state.is_playing);
        assert!(state.queue.is_empty());
        assert_eq!(h.notifier.retracted.lock().len(), 2);
    }

    #[tokio::test]
    async fn failing_track_is_skipped() {
        let h = Harness::new();
        h.play(&["bad link", "B"]).await;
        let state = h.state().await;
        assert_eq!(current_title(&state), Some("B"));
        assert!(state.queue.is_empty());
        assert_eq!(*h.notifier.sent.lock(), vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn only_failing_tracks_leaves_player_idle() {
        let h = Harness::new();
        let report = h.play(&["bad one", "bad two"]).await;
        assert!(!report.started);
        assert!(!h.state().await.is_playing);
    }

    #[tokio::test]
    async fn stale_end_signal_is_ignored() {
        let h = Harness::new();
        h.play(&["A", "B", "C"]).await;
        let stale = h.session.signal.lock().clone().unwrap();

        h.handle.skip(None).await.unwrap();
        assert_eq!(current_title(&h.state().await), Some("B"));

        stale.fire();
        stale.fire();
        let state = h.state().await;
        assert_eq!(current_title(&state), Some("B"));
        assert_eq!(queue_titles(&state), vec!["C"]);
    }

    #[tokio::test]
    async fn skip_amount_drops_tracks_ahead() {
        let h = Harness::new();
        h.play(&["A", "B", "C", "D"]).await;
        assert_eq!(h.handle.skip(Some(3)).await.unwrap(), 3);
        let state = h.state().await;
        assert_eq!(current_title(&state), Some("D"));
        assert!(state.queue.is_empty());
    }

    #[tokio::test]
    async fn stop_does_not_recycle_current() {
        let h = Harness::new();
        h.handle.set_loop(Some(LoopMode::Queue)).await.unwrap();
        h.play(&["A", "B"]).await;
        h.handle.stop().await.unwrap();
        let state = h.state().await;
        assert!(!state.is_playing);
        assert!(state.queue.is_empty());
    }

    #[tokio::test]
    async fn replay_restarts_current_track() {
        let h = Harness::new();
        h.play(&["A", "B"]).await;
        h.handle.replay().await.unwrap();
        let state = h.state().await;
        assert_eq!(current_title(&state), Some("A"));
        assert_eq!(queue_titles(&state), vec!["B"]);
        assert_eq!(h.session.played.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_restarts_at_offset_without_duplicates() {
        let h = Harness::new();
        h.handle.set_loop(Some(LoopMode::Queue)).await.unwrap();
        h.play(&["A", "B"]).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        h.handle.seek(Duration::from_secs(90)).await.unwrap();
        let state = h.state().await;
        let current = state.current.clone().unwrap();
        assert_eq!(current.title, "A");
        assert_eq!(current.elapsed, Duration::from_secs(90));
        assert_eq!(queue_titles(&state), vec!["B"]);

        let last = h.session.played.lock().last().cloned().unwrap();
        assert_eq!(last, AudioSource::starting_at("https://stream/A", Duration::from_secs(90)));

        // La copia con fuente preparada no vuelve a la cola
        h.session.finish();
        let state = h.state().await;
        assert_eq!(current_title(&state), Some("B"));
        assert!(state.queue.is_empty());
    }

    #[tokio::test]
    async fn seek_past_end_is_rejected() {
        let h = Harness::new();
        h.play(&["A"]).await;
        assert!(matches!(
            h.handle.seek(Duration::from_secs(500)).await,
            Err(MusicError::SeekBeyondEnd { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_idempotent() {
        let h = Harness::new();
        h.play(&["A"]).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        h.handle.pause().await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(h.handle.pause().await, Err(MusicError::AlreadyPaused)));

        let state = h.state().await;
        assert!(state.paused);
        assert_eq!(state.current.unwrap().elapsed, Duration::from_secs(10));
        assert_eq!(h.session.pauses.load(Ordering::SeqCst), 1);

        h.handle.resume().await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(h.state().await.current.unwrap().elapsed, Duration::from_secs(13));
        assert!(matches!(h.handle.resume().await, Err(MusicError::NotPaused)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_disconnects_once() {
        let h = Harness::with_idle(Duration::from_secs(600));
        h.play(&["A"]).await;
        h.session.finish();
        assert!(h.state().await.connected);

        tokio::time::advance(Duration::from_secs(601)).await;
        let state = h.state().await;
        assert!(!state.connected);
        assert_eq!(h.session.disconnects(), 1);

        tokio::time::advance(Duration::from_secs(1200)).await;
        h.state().await;
        assert_eq!(h.session.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_track_cancels_idle_disconnect() {
        let h = Harness::with_idle(Duration::from_secs(600));
        h.play(&["A"]).await;
        h.session.finish();

        tokio::time::advance(Duration::from_secs(300)).await;
        h.play(&["B"]).await;
        tokio::time::advance(Duration::from_secs(400)).await;
        let state = h.state().await;
        assert!(state.connected);
        assert_eq!(current_title(&state), Some("B"));
        assert_eq!(h.session.disconnects(), 0);
    }

    #[tokio::test]
    async fn forced_disconnect_resets_to_idle() {
        let h = Harness::new();
        h.play(&["A", "B"]).await;
        let stale = h.session.signal.lock().clone().unwrap();

        h.handle.disconnected(Some(ChannelId::new(7)));
        stale.fire();
        let state = h.state().await;
        assert!(!state.is_playing);
        assert!(state.queue.is_empty());
        assert!(!state.connected);
        assert_eq!(h.session.disconnects(), 1);
    }

    #[tokio::test]
    async fn late_echo_of_own_leave_keeps_new_session() {
        let h = Harness::new();
        h.play(&["A"]).await;
        h.handle.leave().await.unwrap();
        h.play(&["B"]).await;

        h.handle.disconnected(Some(ChannelId::new(7)));
        let state = h.state().await;
        assert!(state.connected);
        assert_eq!(current_title(&state), Some("B"));
        assert_eq!(h.session.disconnects(), 1);

        // La siguiente desconexión ya no es un eco
        h.handle.disconnected(Some(ChannelId::new(7)));
        let state = h.state().await;
        assert!(!state.connected);
        assert!(!state.is_playing);
        assert_eq!(h.session.disconnects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_echo_of_idle_disconnect_without_cached_channel() {
        let h = Harness::with_idle(Duration::from_secs(60));
        h.play(&["A"]).await;
        h.session.finish();
        assert!(h.state().await.connected);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!h.state().await.connected);

        h.play(&["B"]).await;
        h.handle.disconnected(None);
        let state = h.state().await;
        assert!(state.connected);
        assert_eq!(current_title(&state), Some("B"));
        assert_eq!(h.session.disconnects(), 1);
    }

    #[tokio::test]
    async fn leave_disconnects_once_and_resets() {
        let h = Harness::new();
        h.play(&["A", "B"]).await;

        h.handle.leave().await.unwrap();
        let state = h.state().await;
        assert!(!state.is_playing);
        assert!(state.queue.is_empty());
        assert!(!state.connected);
        assert_eq!(state.channel, None);
        assert_eq!(h.session.disconnects(), 1);
        assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);

        assert!(matches!(h.handle.leave().await, Err(MusicError::NotInVoice)));
        assert_eq!(h.session.disconnects(), 1);
    }

    #[tokio::test]
    async fn session_failure_resets_and_notifies_once() {
        let h = Harness::new();
        h.session.fail_play.store(true, Ordering::SeqCst);

        let report = h.play(&["A", "B"]).await;
        assert!(!report.started);

        let state = h.state().await;
        assert!(!state.is_playing);
        assert!(state.queue.is_empty());
        assert!(!state.connected);
        assert_eq!(h.session.disconnects(), 1);
        assert!(h.session.played.lock().is_empty());
        assert_eq!(h.notifier.notices.lock().len(), 1);
        assert!(h.notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn follows_caller_to_another_channel() {
        let h = Harness::new();
        h.play(&["A"]).await;

        h.handle.play(tracks(&["B"]), Some(ChannelId::new(8)), None).await.unwrap();
        h.handle.play(tracks(&["C"]), Some(ChannelId::new(8)), None).await.unwrap();
        h.handle.play(tracks(&["D"]), None, None).await.unwrap();

        let state = h.state().await;
        assert_eq!(state.channel, Some(ChannelId::new(8)));
        assert_eq!(current_title(&state), Some("A"));
        assert_eq!(queue_titles(&state), vec!["B", "C", "D"]);
        assert_eq!(*h.session.moves.lock(), vec![ChannelId::new(8)]);
    }

    #[tokio::test]
    async fn external_move_updates_channel() {
        let h = Harness::new();
        h.play(&["A"]).await;

        h.handle.moved(ChannelId::new(9));
        let state = h.state().await;
        assert_eq!(state.channel, Some(ChannelId::new(9)));
        assert!(state.is_playing);

        h.handle.play(tracks(&["B"]), Some(ChannelId::new(9)), None).await.unwrap();
        assert!(h.session.moves.lock().is_empty());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_whole() {
        let h = Harness::new();
        let titles: Vec<String> = (0..101).map(|i| format!("t{}", i)).collect();
        let titles: Vec<&str> = titles.iter().map(String::as_str).collect();

        let result = h.handle.play(tracks(&titles), Some(ChannelId::new(7)), None).await;
        assert!(matches!(result, Err(MusicError::QueueFull(100))));
        let state = h.state().await;
        assert!(state.queue.is_empty());
        assert!(!state.is_playing);
    }

    #[tokio::test]
    async fn queue_commands_require_playback() {
        let h = Harness::new();
        assert!(matches!(h.handle.edit(QueueOp::Shuffle).await, Err(MusicError::NotPlaying)));
        assert!(matches!(h.handle.skip(None).await, Err(MusicError::NotPlaying)));
        assert!(matches!(h.handle.pause().await, Err(MusicError::NotPlaying)));

        h.play(&["A"]).await;
        assert!(matches!(h.handle.edit(QueueOp::Clear).await, Err(MusicError::EmptyQueue)));
        assert!(matches!(h.handle.edit(QueueOp::Remove(0)).await, Err(MusicError::EmptyQueue)));
    }

    #[tokio::test]
    async fn volume_is_validated_and_applied() {
        let h = Harness::new();
        h.play(&["A"]).await;
        assert!(matches!(
            h.handle.volume(Some(250.0)).await,
            Err(MusicError::VolumeOutOfRange(_))
        ));
        assert_eq!(h.handle.volume(Some(50.0)).await.unwrap(), 50.0);
        assert_eq!(h.handle.volume(None).await.unwrap(), 50.0);
        assert_eq!(*h.session.volumes.lock(), vec![1.0, 0.5]);
    }

    #[tokio::test]
    async fn loop_without_mode_cycles() {
        let h = Harness::new();
        assert_eq!(h.handle.set_loop(None).await.unwrap(), LoopMode::Queue);
        assert_eq!(h.handle.set_loop(None).await.unwrap(), LoopMode::Song);
        assert_eq!(h.handle.set_loop(None).await.unwrap(), LoopMode::Disabled);
    }
}
