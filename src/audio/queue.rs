use rand::seq::SliceRandom;
use std::{collections::VecDeque, ops::Range, time::Duration};
use tracing::{debug, info};

use crate::audio::track::{Track, TrackInfo};
use crate::error::{MusicError, MusicResult};

/// Modo de repetición por servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Disabled,
    Song,
    Queue,
}

impl LoopMode {
    /// Ciclo del comando `loop` sin argumentos: queue → song → disabled
    pub fn next(self) -> Self {
        match self {
            LoopMode::Disabled => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Song,
            LoopMode::Song => LoopMode::Disabled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Disabled => "disabled",
            LoopMode::Song => "song",
            LoopMode::Queue => "queue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "disabled" | "off" | "disable" => Some(LoopMode::Disabled),
            "song" | "track" => Some(LoopMode::Song),
            "queue" | "q" => Some(LoopMode::Queue),
            _ => None,
        }
    }
}

/// Ordered list of upcoming tracks for one guild.
///
/// Never holds the track that is currently playing; the guild player owns
/// that one separately. All indices are 0-based.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega tracks al final de la cola
    pub fn append(&mut self, tracks: Vec<Track>) -> MusicResult<usize> {
        if self.items.len() + tracks.len() > self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }
        let added = tracks.len();
        self.items.extend(tracks);
        info!("➕ Agregadas {} canciones a la cola ({} en total)", added, self.items.len());
        Ok(added)
    }

    /// Recycled and reinserted tracks bypass the size limit; they were already counted.
    pub fn push_back(&mut self, track: Track) {
        self.items.push_back(track);
    }

    pub fn push_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn pop_front(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    pub fn remove(&mut self, index: usize) -> MusicResult<Track> {
        self.ensure_not_empty()?;
        let len = self.items.len();
        let track = self
            .items
            .remove(index)
            .ok_or(MusicError::IndexOutOfRange { index, len })?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(track)
    }

    /// Removes `range` (half-open). The end is clamped to the queue length.
    pub fn remove_range(&mut self, range: Range<usize>) -> MusicResult<usize> {
        self.ensure_not_empty()?;
        let len = self.items.len();
        let end = range.end.min(len);
        if range.start >= end {
            return Err(MusicError::IndexOutOfRange { index: range.start, len });
        }
        self.items.drain(range.start..end);
        debug!("❌ Eliminadas posiciones {}..{}", range.start, end);
        Ok(end - range.start)
    }

    pub fn remove_last(&mut self) -> MusicResult<Track> {
        self.items.pop_back().ok_or(MusicError::EmptyQueue)
    }

    /// Moves the track at `from` so it ends up at `to`, indexed after removal.
    /// A `to` past the end places the track last.
    pub fn move_track(&mut self, from: usize, to: usize) -> MusicResult<()> {
        let track = self.remove(from)?;
        let to = to.min(self.items.len());
        self.items.insert(to, track);
        debug!("📍 Track movido de posición {} a {}", from, to);
        Ok(())
    }

    pub fn move_last_to_front(&mut self) -> MusicResult<()> {
        let track = self.remove_last()?;
        self.items.push_front(track);
        Ok(())
    }

    pub fn swap(&mut self, first: usize, second: usize) -> MusicResult<()> {
        self.ensure_not_empty()?;
        let len = self.items.len();
        for index in [first, second] {
            if index >= len {
                return Err(MusicError::IndexOutOfRange { index, len });
            }
        }
        self.items.swap(first, second);
        Ok(())
    }

    pub fn reverse(&mut self) -> MusicResult<()> {
        self.ensure_not_empty()?;
        self.items.make_contiguous().reverse();
        Ok(())
    }

    /// Mezcla la cola (permutación uniforme)
    pub fn shuffle(&mut self) -> MusicResult<()> {
        self.ensure_not_empty()?;
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada");
        Ok(())
    }

    /// Limpia la cola
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    /// Drops the first `count` tracks, keeping at least the last one.
    pub fn skip(&mut self, count: usize) -> usize {
        let skipped = count.min(self.items.len().saturating_sub(1));
        self.items.drain(..skipped);
        skipped
    }

    pub fn get(&self, index: usize) -> MusicResult<&Track> {
        self.ensure_not_empty()?;
        self.items.get(index).ok_or(MusicError::IndexOutOfRange {
            index,
            len: self.items.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(Track::duration).sum()
    }

    pub fn snapshot(&self) -> Vec<TrackInfo> {
        self.items.iter().map(Track::info).collect()
    }

    fn ensure_not_empty(&self) -> MusicResult<()> {
        if self.items.is_empty() {
            Err(MusicError::EmptyQueue)
        } else {
            Ok(())
        }
    }
}

/// Página de la cola para el comando `queue`
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<TrackInfo>,
    /// 1-based position of the first item on this page.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl QueuePage {
    /// Pages wrap around: below 1 shows the last page, past the end shows the first.
    pub fn build(items: Vec<TrackInfo>, page: i64, per_page: usize) -> Self {
        let total_items = items.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let current_page = if page < 1 {
            total_pages
        } else if page as usize > total_pages {
            1
        } else {
            page as usize
        };
        let start = (current_page - 1) * per_page;

        QueuePage {
            items: items.into_iter().skip(start).take(per_page).collect(),
            first_position: start + 1,
            current_page,
            total_pages,
            total_items,
        }
    }
}
