use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        player::QueueOp,
        queue::LoopMode,
        registry::GuildHandle,
        track::{format_duration, parse_timestamp},
    },
    bot::{notifier::ChannelNotifier, SagiriBot},
    error::{MusicError, MusicResult},
    ui::{
        buttons::{self, ComponentAction},
        embeds,
    },
};

/// Respuesta de un comando
enum Reply {
    Content(String),
    Embed(CreateEmbed, Vec<CreateActionRow>),
}

impl Reply {
    fn embed(embed: CreateEmbed) -> Self {
        Reply::Embed(embed, Vec::new())
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &SagiriBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let handle = bot.registry.ensure(guild_id);
    match command.data.name.as_str() {
        // Comandos lentos: responden después de resolver la consulta
        "play" | "playfile" | "search" => {
            command.defer(&ctx.http).await?;
            let reply = match command.data.name.as_str() {
                "play" => play(ctx, &command, bot, &handle).await,
                "playfile" => play_file(ctx, &command, bot, &handle).await,
                _ => search(&command, bot).await,
            };
            edit_with(ctx, &command, reply).await
        }
        name => {
            let reply = run(ctx, &command, name, &handle).await;
            respond_with(ctx, &command, reply).await
        }
    }
}

async fn run(ctx: &Context, command: &CommandInteraction, name: &str, handle: &GuildHandle) -> MusicResult<Reply> {
    match name {
        "pause" => {
            handle.pause().await?;
            Ok(Reply::Content("⏸️ Reproducción pausada".into()))
        }
        "resume" => {
            handle.resume().await?;
            Ok(Reply::Content("▶️ Reproducción reanudada".into()))
        }
        "skip" => {
            let amount = int_option(command, "amount").map(to_count);
            let skipped = handle.skip(amount).await?;
            Ok(Reply::Content(if skipped > 1 {
                format!("⏭️ Saltadas {} canciones", skipped)
            } else {
                "⏭️ Canción saltada".into()
            }))
        }
        "stop" => {
            handle.stop().await?;
            Ok(Reply::Content("⏹️ Reproducción detenida y cola limpiada".into()))
        }
        "replay" => {
            handle.replay().await?;
            Ok(Reply::Content("🔄 Reiniciando la canción".into()))
        }
        "seek" => {
            let timestamp = str_option(command, "timestamp").unwrap_or_default();
            let position = parse_timestamp(timestamp)?;
            handle.seek(position).await?;
            Ok(Reply::Content(format!("⏩ Saltando a `{}`", format_duration(position))))
        }
        "queue" => queue_page(handle, int_option(command, "page").unwrap_or(1)).await,
        "nowplaying" => {
            let snapshot = handle.snapshot().await?;
            let current = snapshot.current.as_ref().ok_or(MusicError::NotPlaying)?;
            Ok(Reply::embed(embeds::now_playing_detail(current, &snapshot)))
        }
        "songinfo" => match int_option(command, "position") {
            Some(position) => {
                let info = handle.track_at(to_index(position)).await?;
                Ok(Reply::embed(embeds::song_info(&info, to_index(position) + 1)))
            }
            None => {
                let current = handle.current_track().await?.ok_or(MusicError::NotPlaying)?;
                Ok(Reply::embed(embeds::now_playing(&current)))
            }
        },
        "remove" => {
            let index = to_index(int_option(command, "position").unwrap_or(1));
            handle.edit(QueueOp::Remove(index)).await?;
            Ok(Reply::Content(format!("🗑️ Canción #{} eliminada de la cola", index + 1)))
        }
        "removerange" => {
            let start = int_option(command, "start").unwrap_or(1);
            let end = int_option(command, "end").unwrap_or(start);
            handle.edit(QueueOp::RemoveRange(one_based_range(start, end))).await?;
            Ok(Reply::Content(format!("🗑️ Canciones #{} a #{} eliminadas", start, end)))
        }
        "removelast" => {
            handle.edit(QueueOp::RemoveLast).await?;
            Ok(Reply::Content("🗑️ Última canción eliminada".into()))
        }
        "move" => {
            let from = to_index(int_option(command, "from").unwrap_or(1));
            let to = to_index(int_option(command, "to").unwrap_or(1));
            handle.edit(QueueOp::Move { from, to }).await?;
            Ok(Reply::Content(format!("📍 Canción movida de #{} a #{}", from + 1, to + 1)))
        }
        "movelast" => {
            handle.edit(QueueOp::MoveLast).await?;
            Ok(Reply::Content("📍 Última canción movida al inicio".into()))
        }
        "swap" => {
            let first = to_index(int_option(command, "first").unwrap_or(1));
            let second = to_index(int_option(command, "second").unwrap_or(1));
            handle.edit(QueueOp::Swap(first, second)).await?;
            Ok(Reply::Content(format!("🔃 Canciones #{} y #{} intercambiadas", first + 1, second + 1)))
        }
        "reverse" => {
            handle.edit(QueueOp::Reverse).await?;
            Ok(Reply::Content("🔃 Cola invertida".into()))
        }
        "shuffle" => {
            handle.edit(QueueOp::Shuffle).await?;
            Ok(Reply::Content("🔀 Cola mezclada".into()))
        }
        "clear" => {
            handle.edit(QueueOp::Clear).await?;
            Ok(Reply::Content("🗑️ Cola limpiada".into()))
        }
        "loop" => {
            let mode = str_option(command, "mode").and_then(LoopMode::parse);
            let mode = handle.set_loop(mode).await?;
            Ok(Reply::Content(match mode {
                LoopMode::Disabled => "➡️ Repetición desactivada".into(),
                LoopMode::Song => "🔂 Repitiendo la canción actual".into(),
                LoopMode::Queue => "🔁 Repitiendo la cola".into(),
            }))
        }
        "volume" => {
            let level = number_option(command, "level").map(|level| level as f32);
            let volume = handle.volume(level).await?;
            Ok(Reply::embed(embeds::volume(volume)))
        }
        "join" => {
            let guild_id = handle.guild_id();
            let channel = user_voice_channel(ctx, guild_id, command.user.id).ok_or(MusicError::NotInVoice)?;
            handle.connect(Some(channel)).await?;
            Ok(Reply::Content(format!("🔊 Conectado a <#{}>", channel)))
        }
        "leave" => {
            handle.leave().await?;
            Ok(Reply::Content("👋 Desconectado del canal de voz".into()))
        }
        _ => Ok(Reply::Content("❌ Comando no reconocido".into())),
    }
}

/// Resolves `query` and hands the tracks to the guild player, connecting to
/// the user's channel when there is no session yet.
async fn enqueue_query(
    ctx: &Context,
    bot: &SagiriBot,
    handle: &GuildHandle,
    user_id: UserId,
    text_channel: ChannelId,
    query: &str,
) -> MusicResult<CreateEmbed> {
    let channel = user_voice_channel(ctx, handle.guild_id(), user_id);
    // Evita resolver playlists enteras si no hay dónde reproducirlas
    if channel.is_none() && !handle.snapshot().await?.connected {
        return Err(MusicError::NotInVoice);
    }

    let resolved = bot.resolver.resolve(query).await?;
    let Some(first) = resolved.tracks.first().map(|track| track.info()) else {
        return Err(MusicError::NoMatch);
    };

    let notifier = Arc::new(ChannelNotifier::new(ctx.http.clone(), text_channel));
    let report = handle.play(resolved.tracks, channel, Some(notifier)).await?;
    info!("➕ {} canciones agregadas en guild {}", report.added, handle.guild_id());

    Ok(match &resolved.collection {
        Some(collection) => embeds::collection_added(collection, &report),
        None => embeds::track_added(&first, &report),
    })
}

async fn play(ctx: &Context, command: &CommandInteraction, bot: &SagiriBot, handle: &GuildHandle) -> MusicResult<Reply> {
    let query = str_option(command, "query").unwrap_or_default();
    if query.trim().is_empty() {
        return Err(MusicError::NoMatch);
    }
    let embed = enqueue_query(ctx, bot, handle, command.user.id, command.channel_id, query).await?;
    Ok(Reply::embed(embed))
}

/// Plays the attached file through the direct-link resolver.
async fn play_file(ctx: &Context, command: &CommandInteraction, bot: &SagiriBot, handle: &GuildHandle) -> MusicResult<Reply> {
    let url = attachment_url(command, "file").ok_or(MusicError::NoFile)?;
    info!("📁 Archivo adjunto por {}: {}", command.user.name, url);
    let embed = enqueue_query(ctx, bot, handle, command.user.id, command.channel_id, &url).await?;
    Ok(Reply::embed(embed))
}

async fn search(command: &CommandInteraction, bot: &SagiriBot) -> MusicResult<Reply> {
    let query = str_option(command, "query").unwrap_or_default();
    info!("🔍 Búsqueda iniciada por {}: {}", command.user.name, query);
    let results = bot.resolver.search(query, bot.config.search_limit).await?;
    Ok(Reply::Embed(
        embeds::search_results(query, &results),
        vec![CreateActionRow::SelectMenu(buttons::search_menu(&results))],
    ))
}

async fn queue_page(handle: &GuildHandle, page: i64) -> MusicResult<Reply> {
    let page = handle.queue_page(page).await?;
    let snapshot = handle.snapshot().await?;
    let components = buttons::queue_navigation(&page).into_iter().collect();
    Ok(Reply::Embed(embeds::queue(&page, &snapshot), components))
}

/// Maneja interacciones con componentes (botones, menús, etc.)
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &SagiriBot) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Componente {} usado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let handle = bot.registry.ensure(guild_id);
    match ComponentAction::parse(&component.data.custom_id) {
        Some(ComponentAction::QueuePage(page)) => {
            let message = match queue_page(&handle, page).await {
                Ok(Reply::Embed(embed, components)) => {
                    CreateInteractionResponseMessage::new().embed(embed).components(components)
                }
                Ok(Reply::Content(content)) => CreateInteractionResponseMessage::new().content(content),
                Err(e) => CreateInteractionResponseMessage::new()
                    .embed(embeds::error(&e.notice()))
                    .components(Vec::new()),
            };
            component
                .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
                .await?;
        }
        Some(ComponentAction::SearchSelection) => {
            let selected = match &component.data.kind {
                ComponentInteractionDataKind::StringSelect { values } => values.first().cloned(),
                _ => None,
            };
            let Some(url) = selected else {
                warn!("Selección de búsqueda sin valor");
                return Ok(());
            };

            component.defer(&ctx.http).await?;
            let edit = match enqueue_query(ctx, bot, &handle, component.user.id, component.channel_id, &url).await {
                Ok(embed) => EditInteractionResponse::new().embed(embed),
                Err(e) => EditInteractionResponse::new().embed(embeds::error(&e.notice())),
            };
            component
                .edit_response(&ctx.http, edit.components(Vec::new()))
                .await?;
        }
        None => {
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Componente no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

async fn respond_with(ctx: &Context, command: &CommandInteraction, reply: MusicResult<Reply>) -> Result<()> {
    let message = match reply {
        Ok(Reply::Content(content)) => CreateInteractionResponseMessage::new().content(content),
        Ok(Reply::Embed(embed, components)) => CreateInteractionResponseMessage::new()
            .embed(embed)
            .components(components),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(embeds::error(&e.notice()))
            .ephemeral(true),
    };
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn edit_with(ctx: &Context, command: &CommandInteraction, reply: MusicResult<Reply>) -> Result<()> {
    let edit = match reply {
        Ok(Reply::Content(content)) => EditInteractionResponse::new().content(content),
        Ok(Reply::Embed(embed, components)) => EditInteractionResponse::new().embed(embed).components(components),
        Err(e) => EditInteractionResponse::new().embed(embeds::error(&e.notice())),
    };
    command.edit_response(&ctx.http, edit).await?;
    Ok(())
}

fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn number_option(command: &CommandInteraction, name: &str) -> Option<f64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_f64())
}

fn attachment_url(command: &CommandInteraction, name: &str) -> Option<String> {
    let id = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| match opt.value {
            CommandDataOptionValue::Attachment(id) => Some(id),
            _ => None,
        })?;
    command.data.resolved.attachments.get(&id).map(|attachment| attachment.url.clone())
}

/// Posición 1-based del usuario a índice 0-based
fn to_index(position: i64) -> usize {
    usize::try_from(position.saturating_sub(1)).unwrap_or(0)
}

fn to_count(amount: i64) -> usize {
    usize::try_from(amount).unwrap_or(1).max(1)
}

/// `start..=end` (1-based, inclusive) as a 0-based half-open range.
fn one_based_range(start: i64, end: i64) -> std::ops::Range<usize> {
    to_index(start)..usize::try_from(end).unwrap_or(0)
}

/// Obtiene el canal de voz del usuario
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
