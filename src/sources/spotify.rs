//! Spotify Web API client (client-credentials flow).
//!
//! Only metadata comes from Spotify; audio for these tracks is found on the
//! video platform when they are about to play.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use super::MusicCatalog;
use crate::audio::track::{Collection, Track};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    duration_ms: u64,
    album: Option<AlbumRef>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    // Null para pistas locales o no disponibles
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyCollection<T> {
    name: String,
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    images: Option<Vec<Image>>,
    tracks: Paging<T>,
}

/// Kind and id parsed from a Spotify URL or URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyRef {
    pub kind: String,
    pub id: String,
}

impl SpotifyRef {
    /// Accepts `https://open.spotify.com/[intl-xx/]<kind>/<id>` and `spotify:<kind>:<id>`.
    pub fn parse(reference: &str) -> Option<Self> {
        let (kind, id) = if let Some(rest) = reference.strip_prefix("spotify:") {
            let mut parts = rest.split(':');
            (parts.next()?.to_string(), parts.next()?.to_string())
        } else {
            let url = Url::parse(reference).ok()?;
            let mut segments = url.path_segments()?.filter(|s| !s.is_empty() && !s.starts_with("intl-"));
            (segments.next()?.to_string(), segments.next()?.to_string())
        };
        (!id.is_empty()).then_some(Self { kind, id })
    }
}

fn track_title(track: &SpotifyTrack) -> String {
    match track.artists.first() {
        Some(artist) => format!("{} - {}", artist.name, track.name),
        None => track.name.clone(),
    }
}

fn to_track(track: SpotifyTrack, fallback_thumbnail: Option<&str>) -> Track {
    let thumbnail = track
        .album
        .as_ref()
        .and_then(|album| album.images.first())
        .map(|image| image.url.clone())
        .or_else(|| fallback_thumbnail.map(str::to_string));
    Track::spotify(
        track_title(&track),
        track.external_urls.spotify.clone(),
        Duration::from_millis(track.duration_ms),
    )
    .with_thumbnail(thumbnail)
}

fn first_image(images: &Option<Vec<Image>>) -> Option<String> {
    images.as_ref()?.first().map(|image| image.url.clone())
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    /// Token de acceso, renovado un minuto antes de expirar
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let auth = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()
            .context("Spotify rechazó las credenciales")?
            .json()
            .await?;

        let lifetime = Duration::from_secs(response.expires_in.saturating_sub(60));
        *cached = Some(AccessToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        let value = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Error de la API de Spotify en {}", url))?
            .json()
            .await?;
        Ok(value)
    }

    fn reference(reference: &str, expected: &str) -> Result<SpotifyRef> {
        let parsed = SpotifyRef::parse(reference).with_context(|| format!("Referencia de Spotify inválida: {}", reference))?;
        if parsed.kind != expected {
            anyhow::bail!("Se esperaba un {} de Spotify, no {}", expected, parsed.kind);
        }
        Ok(parsed)
    }

    /// Follows `next` links until the listing is exhausted.
    async fn drain<T: DeserializeOwned>(&self, first: Paging<T>) -> Result<Vec<T>> {
        let mut items = first.items;
        let mut next = first.next;
        while let Some(url) = next {
            let page: Paging<T> = self.get(&url).await?;
            items.extend(page.items);
            next = page.next;
        }
        Ok(items)
    }

    fn collection(name: String, urls: ExternalUrls, thumbnail: Option<String>, fallback_url: &str) -> Collection {
        Collection::new(name, urls.spotify.unwrap_or_else(|| fallback_url.to_string()), thumbnail)
    }
}

#[async_trait]
impl MusicCatalog for SpotifyClient {
    async fn track(&self, reference: &str) -> Result<Track> {
        let SpotifyRef { id, .. } = Self::reference(reference, "track")?;
        let track: SpotifyTrack = self.get(&format!("{}/tracks/{}", API_BASE, id)).await?;
        Ok(to_track(track, None))
    }

    async fn playlist(&self, reference: &str) -> Result<(Vec<Track>, Collection)> {
        let SpotifyRef { id, .. } = Self::reference(reference, "playlist")?;
        let playlist: SpotifyCollection<PlaylistItem> = self.get(&format!("{}/playlists/{}", API_BASE, id)).await?;

        let thumbnail = first_image(&playlist.images);
        let mut collection = Self::collection(playlist.name, playlist.external_urls, thumbnail, reference);
        let items = self.drain(playlist.tracks).await?;

        let tracks: Vec<Track> = items
            .into_iter()
            .filter_map(|item| item.track)
            .map(|track| to_track(track, None))
            .inspect(|track| collection.count(track))
            .collect();
        info!("🎧 Playlist de Spotify: {} ({} canciones)", collection.title, tracks.len());
        Ok((tracks, collection))
    }

    async fn album(&self, reference: &str) -> Result<(Vec<Track>, Collection)> {
        let SpotifyRef { id, .. } = Self::reference(reference, "album")?;
        let album: SpotifyCollection<SpotifyTrack> = self.get(&format!("{}/albums/{}", API_BASE, id)).await?;

        let thumbnail = first_image(&album.images);
        let mut collection = Self::collection(album.name, album.external_urls, thumbnail.clone(), reference);
        let items = self.drain(album.tracks).await?;

        // Las pistas de un álbum no traen imágenes propias
        let tracks: Vec<Track> = items
            .into_iter()
            .map(|track| to_track(track, thumbnail.as_deref()))
            .inspect(|track| collection.count(track))
            .collect();
        info!("💿 Álbum de Spotify: {} ({} canciones)", collection.title, tracks.len());
        Ok((tracks, collection))
    }
}
