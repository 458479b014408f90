//! # Bot Module
//!
//! Discord side of Sagiri: slash command registration and handling, the
//! serenity event handler and the songbird/serenity implementations of the
//! player's voice and chat seams.
//!
//! ## Architecture
//!
//! [`SagiriBot`] implements Serenity's [`EventHandler`]. It keeps the guild
//! registry in sync with the guilds the bot is in and turns interactions
//! into requests on each guild's [`GuildHandle`](crate::audio::registry::GuildHandle).
//! Playback state never lives here; it belongs to the per-guild actor.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;
pub mod voice;

use crate::{audio::registry::GuildRegistry, config::Config, sources::Resolver};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: bot configuration (tokens, limits)
/// - `registry`: one player actor per guild
/// - `resolver`: turns `/play` queries into tracks
pub struct SagiriBot {
    pub config: Arc<Config>,
    pub registry: Arc<GuildRegistry>,
    pub resolver: Arc<Resolver>,
}

impl SagiriBot {
    pub fn new(config: Arc<Config>, registry: Arc<GuildRegistry>, resolver: Arc<Resolver>) -> Self {
        Self {
            config,
            registry,
            resolver,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set, commands are registered only in that guild
    /// (propagate in seconds, useful while developing); otherwise globally.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for SagiriBot {
    /// Registers commands and creates a player for every guild the bot is in.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        for guild in &ready.guilds {
            self.registry.ensure(guild.id);
        }

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        debug!("🏠 Guild disponible: {} ({})", guild.name, guild.id);
        self.registry.ensure(guild.id);
    }

    /// Tears the guild's player down when the bot leaves (or is removed from)
    /// a guild. Outages (`unavailable`) keep the player.
    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            warn!("⚠️ Guild {} no disponible temporalmente", incomplete.id);
            return;
        }
        if let Some(task) = self.registry.remove(incomplete.id) {
            if let Err(e) = task.await {
                error!("Error al detener reproductor de guild {}: {:?}", incomplete.id, e);
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Forwards the bot's own voice-state changes to the guild player: moves
    /// by other members, forced disconnects and the echoes of our own.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }
        let Some(handle) = new.guild_id.and_then(|guild_id| self.registry.get(guild_id)) else {
            return;
        };

        match new.channel_id {
            Some(channel) => handle.moved(channel),
            None => {
                let left = old.and_then(|state| state.channel_id);
                info!("🔌 Bot fuera de voz en guild {} (canal {:?})", handle.guild_id(), left);
                handle.disconnected(left);
            }
        }
    }
}
