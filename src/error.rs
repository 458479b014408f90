//! # Errors
//!
//! Error taxonomy for the playback core.
//!
//! Every variant except [`MusicError::TrackStartFailure`] is reported back to
//! the user as a notice at the command boundary. `TrackStartFailure` never
//! leaves the driver: the failed track is dropped and the queue advances.

use std::time::Duration;
use thiserror::Error;

/// Formatos aceptados para enlaces directos
pub const SUPPORTED_FORMATS: &str = "wav, matroska/webm, mp4, flac, ogg, mp3";

#[derive(Debug, Error)]
pub enum MusicError {
    /// The user is not in a voice channel and there is no session to reuse.
    #[error("Debes estar en un canal de voz")]
    NotInVoice,

    #[error("No se encontraron resultados")]
    NoMatch,

    #[error("No se adjuntó ningún archivo")]
    NoFile,

    #[error("Formato no soportado: `{extension}`")]
    UnsupportedFormat { extension: String },

    #[error("No se pudo leer la duración del archivo")]
    ProbeFailure,

    #[error("La cola está vacía")]
    EmptyQueue,

    /// `index` is 0-based; the notice shows it 1-based.
    #[error("Posición {} fuera de rango (la cola tiene {len} canciones)", .index + 1)]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Error de la sesión de voz: {0}")]
    SessionError(String),

    #[error("No se pudo iniciar la canción: {0}")]
    TrackStartFailure(String),

    #[error("No se está reproduciendo nada")]
    NotPlaying,

    #[error("La canción ya está pausada")]
    AlreadyPaused,

    #[error("La canción no está pausada")]
    NotPaused,

    #[error("Marca de tiempo inválida: `{0}` (usa [hh:]mm:ss)")]
    InvalidTimestamp(String),

    #[error("Volumen fuera de rango: {0}% (0-200)")]
    VolumeOutOfRange(f32),

    #[error("La posición {} supera la duración de la canción ({})", clock(.requested), clock(.duration))]
    SeekBeyondEnd { requested: Duration, duration: Duration },

    #[error("No se pudo cargar la colección: {0}")]
    CollectionFailure(String),

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    /// The guild actor is gone (guild removed or shutting down).
    #[error("El servidor no está disponible")]
    GuildUnavailable,
}

impl MusicError {
    /// Texto que se muestra al usuario, con pista de solución cuando aplica
    pub fn notice(&self) -> String {
        match self {
            MusicError::UnsupportedFormat { .. } => {
                format!("{}\nFormatos soportados: `{}`", self, SUPPORTED_FORMATS)
            }
            MusicError::ProbeFailure => {
                format!("{}\nVerifica que el enlace apunte a un archivo de audio accesible", self)
            }
            _ => self.to_string(),
        }
    }

    /// Errores que indican un estado roto de la sesión de voz
    pub fn is_session_failure(&self) -> bool {
        matches!(self, MusicError::SessionError(_))
    }
}

pub type MusicResult<T> = Result<T, MusicError>;

fn clock(duration: &Duration) -> String {
    crate::audio::track::format_duration(*duration)
}
