// Enlaces directos a archivos de audio

use async_process::Command;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::audio::track::Track;
use crate::error::{MusicError, MusicResult};

/// Extensiones aceptadas
pub const FILE_EXTENSIONS: [&str; 6] = ["wav", "webm", "mp4", "flac", "ogg", "mp3"];

/// Reads the duration of remote media.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration(&self, url: &str) -> Option<Duration>;
}

/// [`MediaProbe`] backed by `ffprobe`.
pub struct FfprobeProbe {
    path: String,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(path: String, timeout: Duration) -> Self {
        Self { path, timeout }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration(&self, url: &str) -> Option<Duration> {
        let output = timeout(
            self.timeout,
            Command::new(&self.path)
                .args(["-i", url, "-show_entries", "format=duration", "-v", "quiet", "-of", "csv=p=0"])
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) if output.status.success() => {
                parse_seconds(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(Ok(output)) => {
                debug!("ffprobe terminó con {}", output.status);
                None
            }
            Ok(Err(e)) => {
                warn!("No se pudo ejecutar ffprobe: {}", e);
                None
            }
            Err(_) => {
                warn!("ffprobe tardó demasiado para {}", url);
                None
            }
        }
    }
}

fn parse_seconds(stdout: &str) -> Option<Duration> {
    let seconds: f64 = stdout.trim().parse().ok()?;
    if seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Splits the last path segment into `(stem, extension)`.
fn file_parts(link: &str) -> (String, String) {
    let name = Url::parse(link)
        .ok()
        .and_then(|url| url.path_segments()?.last().map(str::to_string))
        .unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_ascii_lowercase()),
        _ => (name, String::new()),
    }
}

/// Cliente de URL directa
pub struct DirectUrlClient {
    probe: Arc<dyn MediaProbe>,
}

impl DirectUrlClient {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self { probe }
    }

    /// Validates the extension and probes the duration.
    pub async fn resolve(&self, link: &str) -> MusicResult<Track> {
        let (stem, ext) = file_parts(link);
        if !FILE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(MusicError::UnsupportedFormat {
                extension: if ext.is_empty() { "(ninguno)".into() } else { format!(".{}", ext) },
            });
        }

        let duration = self.probe.duration(link).await.ok_or(MusicError::ProbeFailure)?;
        debug!("📁 Archivo {} de {:?}", link, duration);
        Ok(Track::file(format!("{} - {}", ext, stem), link, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn probes_supported_files() {
        let mut probe = MockMediaProbe::new();
        probe
            .expect_duration()
            .with(eq("https://cdn.example.com/music/song.mp3"))
            .times(1)
            .returning(|_| Some(Duration::from_secs_f64(183.4)));

        let track = DirectUrlClient::new(Arc::new(probe))
            .resolve("https://cdn.example.com/music/song.mp3")
            .await
            .unwrap();
        assert_eq!(track.title(), "mp3 - song");
        assert_eq!(track.duration().as_secs(), 183);
        assert_eq!(track.stream_url(), Some("https://cdn.example.com/music/song.mp3"));
    }

    #[tokio::test]
    async fn rejects_unknown_extensions_without_probing() {
        let mut probe = MockMediaProbe::new();
        probe.expect_duration().times(0);

        let err = DirectUrlClient::new(Arc::new(probe))
            .resolve("https://example.com/notes.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::UnsupportedFormat { ref extension } if extension == ".txt"));
    }

    #[tokio::test]
    async fn probe_failure_is_reported() {
        let mut probe = MockMediaProbe::new();
        probe.expect_duration().returning(|_| None);

        let result = DirectUrlClient::new(Arc::new(probe))
            .resolve("https://example.com/a/track.flac?token=1")
            .await;
        assert!(matches!(result, Err(MusicError::ProbeFailure)));
    }

    #[test]
    fn splits_file_names() {
        assert_eq!(file_parts("https://x.com/a/b.song.OGG"), ("b.song".into(), "ogg".into()));
        assert_eq!(file_parts("https://x.com/"), (String::new(), String::new()));
        assert_eq!(file_parts("https://x.com/.hidden"), (".hidden".into(), String::new()));
        assert_eq!(
            file_parts("https://cdn.discordapp.com/attachments/1/2/mix.FLAC?ex=1&hm=2"),
            ("mix".into(), "flac".into())
        );
    }

    #[test]
    fn parses_ffprobe_output() {
        assert_eq!(parse_seconds("12.5\n"), Some(Duration::from_millis(12500)));
        assert_eq!(parse_seconds("N/A"), None);
        assert_eq!(parse_seconds("0.000"), None);
        assert_eq!(parse_seconds("1e30"), None);
        assert_eq!(parse_seconds("inf"), None);
        assert_eq!(parse_seconds("NaN"), None);
    }
}
