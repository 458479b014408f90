//! # Tracks
//!
//! Value objects produced by the resolver and consumed by the guild player.
//!
//! A [`Track`] carries its provider references, a lazily resolved stream URL
//! and its own progress bookkeeping. Elapsed playback time is
//! `now - started_at + offset`: while the track plays `started_at` is set and
//! time accrues from it; while paused (or before it starts) `started_at` is
//! `None` and `offset` alone is authoritative.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{MusicError, MusicResult};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Identidad única de cada track creado en el proceso
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u64);

impl TrackId {
    fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Proveedor de origen de un track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Spotify,
    YouTube,
    File,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Spotify => "spotify",
            TrackKind::YouTube => "youtube",
            TrackKind::File => "file",
        }
    }
}

/// Descriptor of the audio handed to a voice session.
///
/// The session opens `url` itself; `start_at` asks it to begin playback at
/// that offset instead of the start of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub url: String,
    pub start_at: Duration,
}

impl AudioSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            start_at: Duration::ZERO,
        }
    }

    pub fn starting_at(url: impl Into<String>, start_at: Duration) -> Self {
        Self {
            url: url.into(),
            start_at,
        }
    }
}

/// How a track obtains its audio when it reaches the head of the queue.
#[derive(Debug)]
pub enum Playable {
    /// Resolve (or reuse) the stream URL right before playing.
    NeedsResolution,
    /// Single-use source built by a seek or replay.
    Prepared(AudioSource),
    /// The prepared source was used, or this copy was replaced by one.
    Consumed,
}

/// Representa una canción en la cola
#[derive(Debug)]
pub struct Track {
    id: TrackId,
    kind: TrackKind,
    title: String,
    thumbnail: Option<String>,
    duration: Duration,
    video_url: Option<String>,
    spotify_url: Option<String>,
    stream_url: Option<String>,
    playable: Playable,
    started_at: Option<Instant>,
    offset: Duration,
}

impl Track {
    fn new(kind: TrackKind, title: String, duration: Duration) -> Self {
        Self {
            id: TrackId::next(),
            kind,
            title,
            thumbnail: None,
            duration,
            video_url: None,
            spotify_url: None,
            stream_url: None,
            playable: Playable::NeedsResolution,
            started_at: None,
            offset: Duration::ZERO,
        }
    }

    pub fn youtube(title: impl Into<String>, video_url: impl Into<String>, duration: Duration) -> Self {
        let mut track = Self::new(TrackKind::YouTube, title.into(), duration);
        track.video_url = Some(video_url.into());
        track
    }

    pub fn spotify(title: impl Into<String>, spotify_url: Option<String>, duration: Duration) -> Self {
        let mut track = Self::new(TrackKind::Spotify, title.into(), duration);
        track.spotify_url = spotify_url;
        track
    }

    /// Direct links already point at the audio, so the stream URL is known.
    pub fn file(title: impl Into<String>, url: impl Into<String>, duration: Duration) -> Self {
        let mut track = Self::new(TrackKind::File, title.into(), duration);
        track.stream_url = Some(url.into());
        track
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_stream_url(mut self, stream_url: String) -> Self {
        self.stream_url = Some(stream_url);
        self
    }

    // Getters
    pub fn id(&self) -> TrackId {
        self.id
    }
    pub fn kind(&self) -> TrackKind {
        self.kind
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }
    pub fn spotify_url(&self) -> Option<&str> {
        self.spotify_url.as_deref()
    }
    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }
    pub fn playable(&self) -> &Playable {
        &self.playable
    }

    /// Enlace principal: YouTube, luego Spotify, luego el archivo
    pub fn link(&self) -> &str {
        self.video_url
            .as_deref()
            .or(self.spotify_url.as_deref())
            .or(self.stream_url.as_deref())
            .unwrap_or_default()
    }

    /// Records the result of stream resolution.
    ///
    /// Spotify tracks learn their video URL here too, since their audio comes
    /// from the best video-platform match.
    pub fn set_stream(&mut self, stream_url: String, video_url: Option<String>) {
        self.stream_url = Some(stream_url);
        if video_url.is_some() {
            self.video_url = video_url;
        }
    }

    /// Hands out the pre-built source, leaving the track consumed.
    pub fn take_prepared(&mut self) -> Option<AudioSource> {
        match std::mem::replace(&mut self.playable, Playable::Consumed) {
            Playable::Prepared(source) => Some(source),
            other => {
                self.playable = other;
                None
            }
        }
    }

    /// Only tracks that can resolve their audio again are recycled by loop modes.
    pub fn is_reloopable(&self) -> bool {
        matches!(self.playable, Playable::NeedsResolution)
    }

    /// Marca la copia actual como reemplazada (seek, replay, stop)
    pub fn retire(&mut self) {
        self.playable = Playable::Consumed;
    }

    /// Builds the copy that a seek puts back at the head of the queue.
    pub fn replay_from(&self, source: AudioSource) -> Track {
        let offset = source.start_at;
        self.copy_with(Playable::Prepared(source), offset)
    }

    /// Fresh copy from the beginning that still takes part in loop modes.
    pub fn restart_copy(&self) -> Track {
        self.copy_with(Playable::NeedsResolution, Duration::ZERO)
    }

    fn copy_with(&self, playable: Playable, offset: Duration) -> Track {
        Track {
            id: TrackId::next(),
            kind: self.kind,
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            duration: self.duration,
            video_url: self.video_url.clone(),
            spotify_url: self.spotify_url.clone(),
            stream_url: self.stream_url.clone(),
            playable,
            started_at: None,
            offset,
        }
    }

    /// Reinicia el progreso antes de volver a la cola
    pub fn rewind(&mut self) {
        self.started_at = None;
        self.offset = Duration::ZERO;
    }

    pub fn begin_at(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// Freezes progress. Calling it again while frozen changes nothing.
    pub fn pause_at(&mut self, now: Instant) {
        self.offset = self.elapsed_at(now);
        self.started_at = None;
    }

    pub fn resume_at(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(started) => now.saturating_duration_since(started) + self.offset,
            None => self.offset,
        }
    }

    pub fn begin(&mut self) {
        self.begin_at(Instant::now());
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    pub fn is_frozen(&self) -> bool {
        self.started_at.is_none()
    }

    /// Tiempo restante hasta el final de la canción
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed())
    }

    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id,
            kind: self.kind,
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            duration: self.duration,
            link: self.link().to_string(),
            video_url: self.video_url.clone(),
            spotify_url: self.spotify_url.clone(),
            elapsed: self.elapsed(),
            paused: self.is_frozen(),
        }
    }
}

/// Snapshot of a track handed outside the guild player.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub id: TrackId,
    pub kind: TrackKind,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Duration,
    pub link: String,
    pub video_url: Option<String>,
    pub spotify_url: Option<String>,
    pub elapsed: Duration,
    pub paused: bool,
}

impl TrackInfo {
    /// Barra de progreso para el embed de "now playing"
    pub fn progress_bar(&self, width: usize) -> String {
        let ratio = if self.duration.is_zero() {
            0.0
        } else {
            (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
        };
        let filled = (ratio * width as f64).round() as usize;
        format!("{}🔘{}", "▬".repeat(filled), "▬".repeat(width - filled))
    }

    pub fn progress_label(&self) -> String {
        format!("{}/{}", format_duration(self.elapsed), format_duration(self.duration))
    }

    /// Enlaces de cada proveedor, separados por " | "
    pub fn links(&self) -> Option<String> {
        if self.kind == TrackKind::File {
            return Some(format!("[Url]({})", self.link));
        }
        let links: Vec<String> = [("YouTube", &self.video_url), ("Spotify", &self.spotify_url)]
            .into_iter()
            .filter_map(|(name, url)| url.as_ref().map(|url| format!("[{}]({})", name, url)))
            .collect();
        (!links.is_empty()).then(|| links.join(" | "))
    }
}

/// Playlist or album metadata, used once for the "collection added" notice.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub duration: Duration,
    pub track_count: usize,
}

impl Collection {
    pub fn new(title: String, url: String, thumbnail: Option<String>) -> Self {
        Self {
            title,
            url,
            thumbnail,
            duration: Duration::ZERO,
            track_count: 0,
        }
    }

    /// Acumula un track de la colección
    pub fn count(&mut self, track: &Track) {
        self.duration += track.duration();
        self.track_count += 1;
    }
}

/// Formats `1:02:03`, dropping the hour when it is zero (`3:05`).
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Parses `[hh:]mm:ss` (or plain seconds) into a duration.
pub fn parse_timestamp(input: &str) -> MusicResult<Duration> {
    let invalid = || MusicError::InvalidTimestamp(input.to_string());
    let parts: Vec<&str> = input.trim().split(':').collect();
    if parts.len() > 3 {
        return Err(invalid());
    }

    let mut seconds = 0u64;
    for (part, factor) in parts.iter().rev().zip([1u64, 60, 3600]) {
        let value: u64 = part.trim().parse().map_err(|_| invalid())?;
        seconds = value
            .checked_mul(factor)
            .and_then(|part| seconds.checked_add(part))
            .ok_or_else(invalid)?;
    }
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str) -> Track {
        Track::youtube(title, format!("https://www.youtube.com/watch?v={}", title), Duration::from_secs(200))
    }

    #[test]
    fn elapsed_accrues_only_while_playing() {
        let start = Instant::now();
        let mut t = track("a");
        assert_eq!(t.elapsed_at(start), Duration::ZERO);

        t.begin_at(start);
        assert_eq!(t.elapsed_at(start + Duration::from_secs(10)), Duration::from_secs(10));

        t.pause_at(start + Duration::from_secs(10));
        assert_eq!(t.elapsed_at(start + Duration::from_secs(50)), Duration::from_secs(10));

        t.resume_at(start + Duration::from_secs(50));
        assert_eq!(t.elapsed_at(start + Duration::from_secs(55)), Duration::from_secs(15));
    }

    #[test]
    fn pausing_twice_does_not_double_count() {
        let start = Instant::now();
        let mut t = track("a");
        t.begin_at(start);
        t.pause_at(start + Duration::from_secs(30));
        t.pause_at(start + Duration::from_secs(45));
        assert_eq!(t.elapsed_at(start + Duration::from_secs(60)), Duration::from_secs(30));
    }

    #[test]
    fn resume_while_playing_keeps_origin() {
        let start = Instant::now();
        let mut t = track("a");
        t.begin_at(start);
        t.resume_at(start + Duration::from_secs(20));
        assert_eq!(t.elapsed_at(start + Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[test]
    fn replay_copy_starts_from_seek_offset() {
        let mut original = track("a").with_stream_url("https://cdn/a.m4a".into());
        let copy = original.replay_from(AudioSource::starting_at("https://cdn/a.m4a", Duration::from_secs(90)));
        original.retire();

        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.elapsed_at(Instant::now()), Duration::from_secs(90));
        assert!(!copy.is_reloopable());
        assert!(!original.is_reloopable());
    }

    #[test]
    fn prepared_source_is_single_use() {
        let original = track("a");
        let mut copy = original.replay_from(AudioSource::new("https://cdn/a.m4a"));
        assert!(copy.take_prepared().is_some());
        assert!(copy.take_prepared().is_none());
        assert!(matches!(copy.playable(), Playable::Consumed));
    }

    #[test]
    fn restart_copy_keeps_cached_stream_and_loops() {
        let original = track("a").with_stream_url("https://cdn/a.m4a".into());
        let copy = original.restart_copy();
        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.stream_url(), Some("https://cdn/a.m4a"));
        assert!(copy.is_reloopable());
    }

    #[test]
    fn take_prepared_leaves_lazy_tracks_untouched() {
        let mut t = track("a");
        assert!(t.take_prepared().is_none());
        assert!(t.is_reloopable());
    }

    #[test]
    fn link_prefers_video_then_spotify_then_file() {
        let mut sp = Track::spotify("x", Some("https://open.spotify.com/track/1".into()), Duration::ZERO);
        assert_eq!(sp.link(), "https://open.spotify.com/track/1");
        sp.set_stream("https://cdn/x".into(), Some("https://youtu.be/x".into()));
        assert_eq!(sp.link(), "https://youtu.be/x");

        let file = Track::file("mp3 - song", "https://host/song.mp3", Duration::from_secs(3));
        assert_eq!(file.link(), "https://host/song.mp3");
        assert_eq!(file.info().links().as_deref(), Some("[Url](https://host/song.mp3)"));
    }

    #[test]
    fn collection_accumulates_members() {
        let mut collection = Collection::new("mix".into(), "https://x".into(), None);
        collection.count(&track("a"));
        collection.count(&track("b"));
        assert_eq!(collection.track_count, 2);
        assert_eq!(collection.duration, Duration::from_secs(400));
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
        assert_eq!(format_duration(Duration::ZERO), "0:00");
    }

    #[test]
    fn parses_timestamps() {
        assert_eq!(parse_timestamp("01:30").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timestamp("1:00:05").unwrap(), Duration::from_secs(3605));
        assert_eq!(parse_timestamp("42").unwrap(), Duration::from_secs(42));
        assert!(matches!(parse_timestamp("1:2:3:4"), Err(MusicError::InvalidTimestamp(_))));
        assert!(matches!(parse_timestamp("ab:10"), Err(MusicError::InvalidTimestamp(_))));
        assert!(matches!(parse_timestamp(""), Err(MusicError::InvalidTimestamp(_))));
        assert!(matches!(parse_timestamp("1::2"), Err(MusicError::InvalidTimestamp(_))));
        assert!(matches!(
            parse_timestamp("18446744073709551615:00"),
            Err(MusicError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_timestamp("5124095576030431:00:16"),
            Err(MusicError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn progress_bar_is_clamped() {
        let mut info = track("a").info();
        info.elapsed = Duration::from_secs(500);
        let bar = info.progress_bar(10);
        assert_eq!(bar.chars().filter(|c| *c == '▬').count(), 10);
        assert!(bar.ends_with('🔘'));
        assert_eq!(info.progress_label(), "8:20/3:20");
    }
}
