use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use super::VideoPlatform;
use crate::audio::track::{Collection, Track};

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    ytdlp_path: String,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
    url: Option<String>,
    #[serde(default)]
    formats: Vec<Format>,
    #[serde(default)]
    entries: Vec<YtDlpInfo>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: Option<String>,
    ext: Option<String>,
    manifest_url: Option<String>,
}

impl YtDlpInfo {
    /// Última miniatura listada (la de mayor resolución)
    fn best_thumbnail(&self) -> Option<String> {
        self.thumbnail
            .clone()
            .or_else(|| self.thumbnails.last().map(|t| t.url.clone()))
    }

    fn duration(&self) -> Duration {
        self.duration
            .filter(|d| *d > 0.0)
            .and_then(|d| Duration::try_from_secs_f64(d).ok())
            .unwrap_or_default()
    }

    /// Flat entries only carry `url`; full extractions carry `webpage_url`.
    fn page_url(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.url.as_deref())
    }

    fn into_track(self) -> Option<Track> {
        let title = self.title.clone()?;
        let page_url = self.page_url()?.to_string();
        let thumbnail = self.best_thumbnail();
        Some(Track::youtube(title, page_url, self.duration()).with_thumbnail(thumbnail))
    }

    /// Prefers the last direct (non-manifest) m4a format, falling back to the
    /// URL yt-dlp picked for the requested format.
    fn stream_url(&self) -> Option<&str> {
        self.formats
            .iter()
            .rev()
            .filter(|f| f.manifest_url.is_none())
            .find(|f| f.ext.as_deref() == Some("m4a"))
            .and_then(|f| f.url.as_deref())
            .or(self.url.as_deref())
    }
}

impl YouTubeClient {
    pub fn new(ytdlp_path: String, timeout: Duration) -> Self {
        Self {
            ytdlp_path,
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Ejecuta yt-dlp y devuelve su salida estándar
    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = timeout(
            self.timeout,
            Command::new(&self.ytdlp_path).args(args).arg("--no-warnings").output(),
        )
        .await
        .context("yt-dlp tardó demasiado")?
        .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn info(&self, args: &[&str]) -> Result<YtDlpInfo> {
        let stdout = self.run(args).await?;
        serde_json::from_str(&stdout).context("Error al parsear respuesta de yt-dlp")
    }
}

/// Lista completa; el límite de la cola decide si cabe
const PLAYLIST_ARGS: [&str; 2] = ["--flat-playlist", "--dump-single-json"];

/// `https://www.youtube.com/playlist?list=<id>` for any URL carrying a list id.
fn playlist_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).context("URL de playlist inválida")?;
    let list = parsed
        .query_pairs()
        .find(|(key, _)| key == "list")
        .map(|(_, value)| value.into_owned())
        .context("La URL no contiene una playlist")?;
    Ok(format!("https://www.youtube.com/playlist?list={}", list))
}

fn parse_lines(stdout: &str) -> Vec<Track> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .filter_map(YtDlpInfo::into_track)
        .collect()
}

fn playlist_from_info(info: YtDlpInfo, url: &str) -> Result<(Vec<Track>, Collection)> {
    let mut collection = Collection::new(
        info.title.clone().unwrap_or_else(|| "Playlist".to_string()),
        info.page_url().unwrap_or(url).to_string(),
        info.best_thumbnail(),
    );

    let mut tracks = Vec::with_capacity(info.entries.len());
    for entry in info.entries {
        // Videos privados o eliminados no traen duración
        if entry.duration.is_none() {
            continue;
        }
        if let Some(track) = entry.into_track() {
            collection.count(&track);
            tracks.push(track);
        }
    }

    if tracks.is_empty() {
        anyhow::bail!("La playlist no tiene videos disponibles");
    }
    Ok((tracks, collection))
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    /// Busca videos en YouTube
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run(&["--dump-json", "--flat-playlist", "--skip-download", &search_query])
            .await?;
        Ok(parse_lines(&stdout))
    }

    async fn video(&self, url: &str) -> Result<Track> {
        debug!("📊 Obteniendo info de: {}", url);
        let info = self
            .info(&["--no-playlist", "--dump-json", "--skip-download", url])
            .await?;
        info.into_track().context("yt-dlp no devolvió título")
    }

    async fn playlist(&self, url: &str) -> Result<(Vec<Track>, Collection)> {
        let url = playlist_url(url)?;
        info!("📋 Obteniendo playlist: {}", url);
        let info = self.info(&[PLAYLIST_ARGS[0], PLAYLIST_ARGS[1], &url]).await?;
        playlist_from_info(info, &url)
    }

    async fn stream_url(&self, video_url: &str) -> Result<String> {
        debug!("🎵 Obteniendo URL de stream para: {}", video_url);
        let info = self
            .info(&["--no-playlist", "-f", "bestaudio/best", "--dump-json", video_url])
            .await?;
        info.stream_url()
            .map(str::to_string)
            .context("No se pudo obtener URL de stream")
    }
}
