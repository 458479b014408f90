use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{
    player::{EnqueueReport, PlayerSnapshot},
    queue::{LoopMode, QueuePage},
    track::{format_duration, Collection, Track, TrackInfo},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Sagiri";

/// Ancho de la barra de progreso
const PROGRESS_WIDTH: usize = 18;

fn duration_label(info: &TrackInfo) -> String {
    if info.duration.is_zero() {
        "🔴 En vivo".to_string()
    } else {
        format_duration(info.duration)
    }
}

fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Disabled => "Desactivado",
        LoopMode::Queue => "🔁 Cola",
        LoopMode::Song => "🔂 Canción",
    }
}

fn with_track_art(mut embed: CreateEmbed, info: &TrackInfo) -> CreateEmbed {
    if let Some(thumbnail) = &info.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if !info.link.is_empty() {
        embed = embed.url(&info.link);
    }
    embed
}

/// Aviso automático cuando empieza una canción
pub fn now_playing(info: &TrackInfo) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", info.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(info), true)
        .field("🔗 Fuente", info.kind.as_str(), true);

    if let Some(links) = info.links() {
        embed = embed.field("Enlaces", links, false);
    }

    with_track_art(embed, info)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Respuesta de /nowplaying, con progreso y estado del reproductor
pub fn now_playing_detail(info: &TrackInfo, snapshot: &PlayerSnapshot) -> CreateEmbed {
    let status = if info.paused { "⏸️ Pausado" } else { "▶️ Reproduciendo" };
    let mut embed = CreateEmbed::default()
        .title(status)
        .description(format!(
            "**{}**\n\n{}\n`{}`",
            info.title,
            info.progress_bar(PROGRESS_WIDTH),
            info.progress_label()
        ))
        .color(if info.paused { colors::WARNING_ORANGE } else { colors::MUSIC_PURPLE })
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .field("🔁 Loop", loop_label(snapshot.loop_mode), true)
        .field("📜 En cola", snapshot.queue.len().to_string(), true);

    if let Some(links) = info.links() {
        embed = embed.field("Enlaces", links, false);
    }

    with_track_art(embed, info)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn track_added(info: &TrackInfo, report: &EnqueueReport) -> CreateEmbed {
    let (title, color) = if report.started {
        ("▶️ Reproduciendo", colors::SUCCESS_GREEN)
    } else {
        ("✅ Canción Agregada", colors::INFO_BLUE)
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", info.title))
        .color(color)
        .field("⏱️ Duración", duration_label(info), true);

    if !report.started {
        embed = embed
            .field("📍 Posición", report.position.to_string(), true)
            .field("⏳ Se reproduce en", format_duration(report.wait), true);
    }

    with_track_art(embed, info)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Resumen de una playlist o álbum agregado
pub fn collection_added(collection: &Collection, report: &EnqueueReport) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Colección Agregada")
        .description(format!("**[{}]({})**", collection.title, collection.url))
        .color(colors::MUSIC_PURPLE)
        .field("🎵 Canciones", report.added.to_string(), true)
        .field("⏱️ Duración total", format_duration(collection.duration), true);

    if !report.started {
        embed = embed.field("📍 Desde la posición", report.position.to_string(), true);
    }
    if report.added < collection.track_count {
        embed = embed.field(
            "⚠️ Aviso",
            format!("Solo se agregaron {} de {} canciones", report.added, collection.track_count),
            false,
        );
    }
    if let Some(thumbnail) = &collection.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con la cola de reproducción
pub fn queue(page: &QueuePage, snapshot: &PlayerSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📜 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            "🎵 Sonando",
            format!("**{}** `[{}]`", current.title, current.progress_label()),
            false,
        );
    }

    let mut listing = String::new();
    for (offset, item) in page.items.iter().enumerate() {
        listing.push_str(&format!(
            "**{}**. {} `[{}]`\n",
            page.first_position + offset,
            item.title,
            duration_label(item)
        ));
    }
    embed = embed.field("Próximas canciones", listing, false);

    let mut info = format!(
        "**Total:** {} canciones • **Duración:** {}",
        page.total_items,
        format_duration(snapshot.queue_duration)
    );
    if snapshot.loop_mode != LoopMode::Disabled {
        info.push_str(&format!(" • {}", loop_label(snapshot.loop_mode)));
    }
    embed = embed.field("Información", info, false);

    embed
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Sagiri",
            page.current_page, page.total_pages
        )))
        .timestamp(Timestamp::now())
}

/// Información de una canción en la cola (posición 1-based)
pub fn song_info(info: &TrackInfo, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("ℹ️ Canción #{}", position))
        .description(format!("**{}**", info.title))
        .color(colors::NEUTRAL_GRAY)
        .field("⏱️ Duración", duration_label(info), true)
        .field("🔗 Fuente", info.kind.as_str(), true);

    if let Some(links) = info.links() {
        embed = embed.field("Enlaces", links, false);
    }

    with_track_art(embed, info).footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea embed con resultados de búsqueda
pub fn search_results(query: &str, results: &[Track]) -> CreateEmbed {
    let mut listing = String::new();
    for (i, track) in results.iter().enumerate() {
        listing.push_str(&format!(
            "**{}**. {} `[{}]`\n",
            i + 1,
            track.title(),
            format_duration(track.duration())
        ));
    }

    CreateEmbed::default()
        .title("🔍 Resultados de Búsqueda")
        .description(format!("Búsqueda: **{}**\nSelecciona una canción del menú inferior:", query))
        .color(colors::INFO_BLUE)
        .field("Canciones Encontradas", listing, false)
}

/// Crea un embed de error
pub fn error(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con el volumen actual
pub fn volume(percent: f32) -> CreateEmbed {
    let status_emoji = if percent == 0.0 {
        "🔈"
    } else if percent <= 50.0 {
        "🔉"
    } else {
        "🔊"
    };

    CreateEmbed::default()
        .title(format!("{} Control de Volumen", status_emoji))
        .description(format!("**Volumen actual: {}%**", percent))
        .field("📊 Nivel", volume_bar(percent), false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Usa /volume <nivel> para ajustar (0-200)"))
        .timestamp(Timestamp::now())
}

/// Barra visual de volumen; 200% llena los 20 segmentos
fn volume_bar(percent: f32) -> String {
    let segments = 20;
    let filled = ((percent / 200.0) * segments as f32).round().clamp(0.0, segments as f32) as usize;
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}
