use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        playfile_command(),
        search_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        replay_command(),
        seek_command(),
        queue_command(),
        nowplaying_command(),
        songinfo_command(),
        remove_command(),
        removerange_command(),
        removelast_command(),
        move_command(),
        movelast_command(),
        swap_command(),
        reverse_command(),
        shuffle_command(),
        clear_command(),
        loop_command(),
        volume_command(),
        join_command(),
        leave_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn position_option(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Integer, name, description)
        .min_int_value(1)
        .required(true)
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción, playlist o álbum")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL (YouTube, Spotify, archivo) o término de búsqueda",
            )
            .required(true),
        )
}

fn playfile_command() -> CreateCommand {
    CreateCommand::new("playfile")
        .description("Reproduce un archivo de audio adjunto")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Attachment,
                "file",
                "Archivo de audio (mp3, flac, ogg, wav, webm, mp4)",
            )
            .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Busca canciones y elige cuál reproducir")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Salta la canción actual o varias canciones")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "amount",
                "Cantidad de canciones a saltar (incluye la actual)",
            )
            .min_int_value(1),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn replay_command() -> CreateCommand {
    CreateCommand::new("replay").description("Reinicia la canción actual")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a una posición de la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "timestamp", "Posición en [hh:]mm:ss")
                .required(true),
        )
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Integer,
            "page",
            "Número de página",
        ))
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

fn songinfo_command() -> CreateCommand {
    CreateCommand::new("songinfo")
        .description("Información de la canción actual o de una en la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Elimina una canción de la cola")
        .add_option(position_option("position", "Posición en la cola"))
}

fn removerange_command() -> CreateCommand {
    CreateCommand::new("removerange")
        .description("Elimina un rango de canciones de la cola")
        .add_option(position_option("start", "Primera posición"))
        .add_option(position_option("end", "Última posición (incluida)"))
}

fn removelast_command() -> CreateCommand {
    CreateCommand::new("removelast").description("Elimina la última canción de la cola")
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción a otra posición")
        .add_option(position_option("from", "Posición actual"))
        .add_option(position_option("to", "Nueva posición"))
}

fn movelast_command() -> CreateCommand {
    CreateCommand::new("movelast").description("Mueve la última canción al inicio de la cola")
}

fn swap_command() -> CreateCommand {
    CreateCommand::new("swap")
        .description("Intercambia dos canciones de la cola")
        .add_option(position_option("first", "Primera posición"))
        .add_option(position_option("second", "Segunda posición"))
}

fn reverse_command() -> CreateCommand {
    CreateCommand::new("reverse").description("Invierte el orden de la cola")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivado", "disabled")
                .add_string_choice("Canción", "song")
                .add_string_choice("Cola", "queue"),
        )
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o ajusta el volumen")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "level", "Nivel de volumen (0-200)")
                .min_number_value(0.0)
                .max_number_value(200.0),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot y limpia la cola")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn command_names_are_unique() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|command| serde_json::to_value(command).unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().any(|name| name == "play"));
        assert!(names.iter().any(|name| name == "removerange"));
    }

    #[test]
    fn playfile_takes_a_required_attachment() {
        let command = serde_json::to_value(playfile_command()).unwrap();
        let option = &command["options"][0];
        assert_eq!(option["name"], "file");
        assert_eq!(option["type"], 11);
        assert_eq!(option["required"], true);
    }
}
