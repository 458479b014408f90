//! # Sources
//!
//! Turns what a user typed into tracks.
//!
//! [`Resolver::resolve`] classifies the query ([`QueryKind`]) and hands it to
//! the matching provider. Stream URLs are not part of resolution: the guild
//! player asks for them through [`StreamResolver`] right before a track
//! starts, since video-platform stream URLs expire.

pub mod direct_url;
pub mod spotify;
pub mod youtube;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::audio::session::StreamResolver;
use crate::audio::track::{Collection, Track, TrackKind};
use crate::config::Config;
use crate::error::{MusicError, MusicResult};

pub use direct_url::{DirectUrlClient, FfprobeProbe, MediaProbe};
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Video platform used for searches, videos, playlists and audio streams.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>>;

    async fn video(&self, url: &str) -> Result<Track>;

    async fn playlist(&self, url: &str) -> Result<(Vec<Track>, Collection)>;

    /// URL de audio reproducible para un video
    async fn stream_url(&self, video_url: &str) -> Result<String>;
}

/// Streaming-service metadata (no audio).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicCatalog: Send + Sync {
    async fn track(&self, reference: &str) -> Result<Track>;

    async fn playlist(&self, reference: &str) -> Result<(Vec<Track>, Collection)>;

    async fn album(&self, reference: &str) -> Result<(Vec<Track>, Collection)>;
}

/// Query shapes, in dispatch precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    SpotifyTrack,
    SpotifyPlaylist,
    SpotifyAlbum,
    YouTubePlaylist,
    YouTubeVideo,
    DirectFile,
    Search,
}

const YOUTUBE_HOSTS: [&str; 5] = [
    "www.youtube.com",
    "youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        if let Some(rest) = query.strip_prefix("spotify:") {
            return Self::spotify_kind(rest.split(':').next().unwrap_or_default());
        }

        let Ok(url) = Url::parse(query) else {
            return QueryKind::Search;
        };
        if url.scheme() != "https" {
            return QueryKind::Search;
        }

        match url.host_str() {
            Some("open.spotify.com") => {
                // Los enlaces localizados llevan un prefijo "intl-xx"
                let kind = url
                    .path_segments()
                    .and_then(|mut segments| segments.find(|s| !s.starts_with("intl-")))
                    .unwrap_or_default();
                Self::spotify_kind(kind)
            }
            Some(host) if YOUTUBE_HOSTS.contains(&host) => {
                if url.query_pairs().any(|(key, _)| key == "list") {
                    QueryKind::YouTubePlaylist
                } else {
                    QueryKind::YouTubeVideo
                }
            }
            _ => QueryKind::DirectFile,
        }
    }

    fn spotify_kind(kind: &str) -> Self {
        match kind {
            "track" => QueryKind::SpotifyTrack,
            "playlist" => QueryKind::SpotifyPlaylist,
            "album" => QueryKind::SpotifyAlbum,
            // Artistas, podcasts, etc.: se tratan como enlace genérico
            _ => QueryKind::DirectFile,
        }
    }
}

/// Result of resolving one query.
#[derive(Debug, Default)]
pub struct Resolved {
    pub tracks: Vec<Track>,
    pub collection: Option<Collection>,
}

impl Resolved {
    fn single(track: Track) -> Self {
        Self {
            tracks: vec![track],
            collection: None,
        }
    }

    fn collection((tracks, collection): (Vec<Track>, Collection)) -> Self {
        Self {
            tracks,
            collection: Some(collection),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Resolvedor de consultas para todas las fuentes
pub struct Resolver {
    videos: Arc<dyn VideoPlatform>,
    catalog: Option<Arc<dyn MusicCatalog>>,
    files: DirectUrlClient,
}

impl Resolver {
    pub fn new(
        videos: Arc<dyn VideoPlatform>,
        catalog: Option<Arc<dyn MusicCatalog>>,
        files: DirectUrlClient,
    ) -> Self {
        Self {
            videos,
            catalog,
            files,
        }
    }

    /// Builds the production resolver (yt-dlp, Spotify Web API, ffprobe).
    pub fn from_config(config: &Config) -> Result<Self> {
        let videos = Arc::new(YouTubeClient::new(config.ytdlp_path.clone(), config.http_timeout()));

        let catalog = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => {
                let client = SpotifyClient::new(id.clone(), secret.clone(), config.http_timeout())
                    .context("Error al crear cliente de Spotify")?;
                Some(Arc::new(client) as Arc<dyn MusicCatalog>)
            }
            _ => {
                info!("ℹ️ Spotify no configurado, sus enlaces no estarán disponibles");
                None
            }
        };

        let probe = Arc::new(FfprobeProbe::new(config.ffprobe_path.clone(), config.http_timeout()));
        Ok(Self::new(videos, catalog, DirectUrlClient::new(probe)))
    }

    /// Resolves a query into tracks and, for playlists and albums, the
    /// collection summary.
    ///
    /// Single-track failures come back as an empty result. Collection
    /// failures and invalid direct links are errors.
    pub async fn resolve(&self, query: &str) -> MusicResult<Resolved> {
        let query = query.trim();
        let kind = QueryKind::classify(query);
        debug!("🔍 Resolviendo {:?}: {}", kind, query);

        let resolved = match kind {
            QueryKind::SpotifyTrack => match &self.catalog {
                Some(catalog) => Self::single_or_empty(catalog.track(query).await, query),
                None => Resolved::default(),
            },
            QueryKind::SpotifyPlaylist => {
                Resolved::collection(Self::collection(self.catalog()?.playlist(query).await)?)
            }
            QueryKind::SpotifyAlbum => {
                Resolved::collection(Self::collection(self.catalog()?.album(query).await)?)
            }
            QueryKind::YouTubePlaylist => {
                Resolved::collection(Self::collection(self.videos.playlist(query).await)?)
            }
            QueryKind::YouTubeVideo => Self::single_or_empty(self.videos.video(query).await, query),
            QueryKind::DirectFile => Resolved::single(self.files.resolve(query).await?),
            QueryKind::Search => {
                let top = self
                    .videos
                    .search(query, 1)
                    .await
                    .and_then(|results| results.into_iter().next().context("sin resultados"));
                Self::single_or_empty(top, query)
            }
        };

        if let Some(collection) = &resolved.collection {
            info!(
                "📋 Colección {} con {} canciones",
                collection.title, collection.track_count
            );
        }
        Ok(resolved)
    }

    /// Top `limit` video matches for a free-text query.
    pub async fn search(&self, query: &str, limit: usize) -> MusicResult<Vec<Track>> {
        match self.videos.search(query.trim(), limit).await {
            Ok(results) if !results.is_empty() => Ok(results),
            Ok(_) => Err(MusicError::NoMatch),
            Err(e) => {
                warn!("Búsqueda fallida para '{}': {:#}", query, e);
                Err(MusicError::NoMatch)
            }
        }
    }

    fn catalog(&self) -> MusicResult<&Arc<dyn MusicCatalog>> {
        self.catalog
            .as_ref()
            .ok_or_else(|| MusicError::CollectionFailure("Spotify no está configurado".into()))
    }

    fn single_or_empty(result: Result<Track>, query: &str) -> Resolved {
        match result {
            Ok(track) => Resolved::single(track),
            Err(e) => {
                warn!("⚠️ No se pudo resolver '{}': {:#}", query, e);
                Resolved::default()
            }
        }
    }

    fn collection(result: Result<(Vec<Track>, Collection)>) -> MusicResult<(Vec<Track>, Collection)> {
        result.map_err(|e| MusicError::CollectionFailure(format!("{:#}", e)))
    }
}

#[async_trait]
impl StreamResolver for Resolver {
    async fn resolve_stream(&self, track: &mut Track) -> Result<()> {
        match track.kind() {
            TrackKind::YouTube => {
                let video_url = track.video_url().context("Track sin URL de video")?.to_string();
                let stream_url = self.videos.stream_url(&video_url).await?;
                track.set_stream(stream_url, None);
            }
            TrackKind::Spotify => {
                // El audio sale del mejor resultado en la plataforma de video
                let found = self
                    .videos
                    .search(track.title(), 1)
                    .await?
                    .into_iter()
                    .next()
                    .with_context(|| format!("Sin coincidencias para {}", track.title()))?;
                let video_url = found.video_url().context("Resultado sin URL de video")?.to_string();
                let stream_url = self.videos.stream_url(&video_url).await?;
                track.set_stream(stream_url, Some(video_url));
            }
            TrackKind::File => anyhow::bail!("El archivo no tiene URL"),
        }
        debug!("🎯 Stream resuelto para {}", track.title());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::direct_url::MockMediaProbe;
    use mockall::predicate::eq;
    use std::time::Duration;

    fn video(title: &str) -> Track {
        Track::youtube(title, format!("https://www.youtube.com/watch?v={}", title), Duration::from_secs(120))
    }

    fn resolver(videos: MockVideoPlatform, catalog: Option<MockMusicCatalog>) -> Resolver {
        Resolver::new(
            Arc::new(videos),
            catalog.map(|c| Arc::new(c) as Arc<dyn MusicCatalog>),
            DirectUrlClient::new(Arc::new(MockMediaProbe::new())),
        )
    }

    #[test]
    fn classifies_queries_by_precedence() {
        let cases = [
            ("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC", QueryKind::SpotifyTrack),
            ("spotify:track:4uLU6hMCjMI75M1A2tKUQC", QueryKind::SpotifyTrack),
            ("https://open.spotify.com/intl-es/playlist/37i9dQZF1DX", QueryKind::SpotifyPlaylist),
            ("spotify:album:1ATL5GLyefJaxhQzSPVrLX", QueryKind::SpotifyAlbum),
            ("https://www.youtube.com/playlist?list=PL123", QueryKind::YouTubePlaylist),
            ("https://www.youtube.com/watch?v=abc&list=PL123", QueryKind::YouTubePlaylist),
            ("https://youtu.be/abc", QueryKind::YouTubeVideo),
            ("https://www.youtube.com/watch?v=abc", QueryKind::YouTubeVideo),
            ("https://cdn.example.com/song.mp3", QueryKind::DirectFile),
            (
                "https://cdn.discordapp.com/attachments/1/2/song.ogg?ex=6650&is=664f&hm=ab12&",
                QueryKind::DirectFile,
            ),
            ("http://cdn.example.com/song.mp3", QueryKind::Search),
            ("lofi beats", QueryKind::Search),
        ];
        for (query, expected) in cases {
            assert_eq!(QueryKind::classify(query), expected, "{}", query);
        }
    }

    #[tokio::test]
    async fn free_text_returns_top_match() {
        let mut videos = MockVideoPlatform::new();
        videos
            .expect_search()
            .with(eq("lofi beats"), eq(1))
            .times(1)
            .returning(|_, _| Ok(vec![video("lofi")]));

        let resolved = resolver(videos, None).resolve("  lofi beats ").await.unwrap();
        assert_eq!(resolved.tracks.len(), 1);
        assert_eq!(resolved.tracks[0].title(), "lofi");
        assert!(resolved.collection.is_none());
    }

    #[tokio::test]
    async fn single_track_failure_is_empty() {
        let mut videos = MockVideoPlatform::new();
        videos
            .expect_video()
            .returning(|_| Err(anyhow::anyhow!("video no disponible")));

        let resolved = resolver(videos, None).resolve("https://youtu.be/gone").await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn collection_failure_is_an_error() {
        let mut videos = MockVideoPlatform::new();
        videos
            .expect_playlist()
            .returning(|_| Err(anyhow::anyhow!("playlist privada")));

        let result = resolver(videos, None)
            .resolve("https://www.youtube.com/playlist?list=PL1")
            .await;
        assert!(matches!(result, Err(MusicError::CollectionFailure(_))));
    }

    #[tokio::test]
    async fn spotify_without_credentials() {
        let r = resolver(MockVideoPlatform::new(), None);
        assert!(r.resolve("spotify:track:1").await.unwrap().is_empty());
        assert!(matches!(
            r.resolve("spotify:playlist:1").await,
            Err(MusicError::CollectionFailure(_))
        ));
    }

    #[tokio::test]
    async fn spotify_album_is_a_collection() {
        let mut catalog = MockMusicCatalog::new();
        catalog.expect_album().returning(|_| {
            let tracks = vec![
                Track::spotify("Artist - One", None, Duration::from_secs(100)),
                Track::spotify("Artist - Two", None, Duration::from_secs(50)),
            ];
            let mut collection = Collection::new("Album".into(), "https://open.spotify.com/album/1".into(), None);
            tracks.iter().for_each(|t| collection.count(t));
            Ok((tracks, collection))
        });

        let resolved = resolver(MockVideoPlatform::new(), Some(catalog))
            .resolve("https://open.spotify.com/album/1")
            .await
            .unwrap();
        let collection = resolved.collection.unwrap();
        assert_eq!(collection.track_count, 2);
        assert_eq!(collection.duration, Duration::from_secs(150));
    }

    #[tokio::test]
    async fn spotify_stream_comes_from_video_search() {
        let mut videos = MockVideoPlatform::new();
        videos
            .expect_search()
            .with(eq("Artist - Song"), eq(1))
            .returning(|_, _| Ok(vec![video("match")]));
        videos
            .expect_stream_url()
            .with(eq("https://www.youtube.com/watch?v=match"))
            .returning(|_| Ok("https://cdn/match.m4a".to_string()));

        let mut track = Track::spotify("Artist - Song", Some("https://open.spotify.com/track/1".into()), Duration::ZERO);
        resolver(videos, None).resolve_stream(&mut track).await.unwrap();
        assert_eq!(track.stream_url(), Some("https://cdn/match.m4a"));
        assert_eq!(track.video_url(), Some("https://www.youtube.com/watch?v=match"));
    }

    #[tokio::test]
    async fn search_without_results_is_no_match() {
        let mut videos = MockVideoPlatform::new();
        videos.expect_search().returning(|_, _| Ok(Vec::new()));
        assert!(matches!(
            resolver(videos, None).search("nada", 5).await,
            Err(MusicError::NoMatch)
        ));
    }
}
