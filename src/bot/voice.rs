//! # Voice
//!
//! songbird implementation of the player's voice seams. A session wraps one
//! songbird `Call`; every track it starts reports its end (natural finish,
//! error or stop) exactly once through the [`EndSignal`] it was started with.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::TrackHandle,
    Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, info, warn};

use crate::audio::{
    session::{EndSignal, VoiceConnector, VoiceSession},
    track::AudioSource,
};
use crate::error::{MusicError, MusicResult};

/// Handler para fin y error de tracks
///
/// Registered twice per track (end and error); the shared flag keeps the
/// signal from firing more than once.
#[derive(Clone)]
struct TrackEndHandler {
    guild_id: GuildId,
    signal: EndSignal,
    fired: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in *tracks {
                if let songbird::tracks::PlayMode::Errored(e) = &state.playing {
                    error!("❌ Error en track para guild {}: {}", self.guild_id, e);
                }
            }
        }

        if !self.fired.swap(true, Ordering::SeqCst) {
            debug!("🎵 Track {} terminó en guild {}", self.signal.token(), self.guild_id);
            self.signal.fire();
        }
        Some(VoiceEvent::Cancel)
    }
}

/// Conexión de voz respaldada por songbird
pub struct SongbirdSession {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSession {
    fn track(&self) -> MusicResult<TrackHandle> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| MusicError::SessionError("no hay track activo".into()))
    }
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    async fn play(&self, source: AudioSource, volume: f32, on_end: EndSignal) -> MusicResult<()> {
        let input = HttpRequest::new(self.http.clone(), source.url);

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(MusicError::SessionError("el bot no está en un canal de voz".into()));
            }
            call.play_only_input(input.into())
        };

        if let Err(e) = handle.set_volume(volume) {
            warn!("No se pudo ajustar el volumen: {}", e);
        }

        let handler = TrackEndHandler {
            guild_id: self.guild_id,
            signal: on_end,
            fired: Arc::new(AtomicBool::new(false)),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(VoiceEvent::Track(event), handler.clone())
                .map_err(|e| MusicError::SessionError(format!("Error al agregar event handler: {}", e)))?;
        }

        if !source.start_at.is_zero() {
            debug!("⏩ Iniciando en {:?}", source.start_at);
            // El resultado del seek llega de forma asíncrona
            drop(handle.seek(source.start_at));
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> MusicResult<()> {
        self.track()?
            .pause()
            .map_err(|e| MusicError::SessionError(e.to_string()))
    }

    async fn resume(&self) -> MusicResult<()> {
        self.track()?
            .play()
            .map_err(|e| MusicError::SessionError(e.to_string()))
    }

    async fn stop(&self) {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            // Si el track ya terminó, el error es esperado
            if let Err(e) = handle.stop() {
                debug!("stop sobre track finalizado: {}", e);
            }
        }
    }

    async fn set_volume(&self, volume: f32) {
        if let Ok(handle) = self.track() {
            if let Err(e) = handle.set_volume(volume) {
                warn!("No se pudo ajustar el volumen: {}", e);
            }
        }
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        // join sobre una llamada existente la mueve de canal
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map(drop)
            .map_err(|e| MusicError::SessionError(format!("No se pudo cambiar de canal: {}", e)))
    }

    async fn disconnect(&self) {
        self.current.lock().take();
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => warn!("Error al desconectar de voz en guild {}: {}", self.guild_id, e),
        }
    }
}

/// Abre sesiones de voz con el gestor de songbird
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceSession>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::SessionError(format!("No se pudo unir al canal: {}", e)))?;

        {
            let mut call = call.lock().await;
            if let Err(e) = call.deafen(true).await {
                warn!("No se pudo ensordecer al bot: {}", e);
            }
        }

        Ok(Arc::new(SongbirdSession {
            guild_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            current: Mutex::new(None),
        }))
    }
}
