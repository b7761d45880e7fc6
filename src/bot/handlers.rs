use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{player::AudioPlayer, queue::MusicQueue, session::EnqueueOutcome},
    bot::MusicBot,
    error::{PlaybackError, ResolveError, SinkError, StateError},
    sources::lyrics::{parse_query, track_query},
    ui::{
        buttons::{self, button_ids},
        embeds,
    },
};

/// Acciones de control compartidas por comandos y botones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Skip,
    Stop,
}

impl ControlAction {
    fn from_button(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PAUSE => Some(Self::Pause),
            button_ids::RESUME => Some(Self::Resume),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "playlist" => handle_playlist(ctx, &command, bot, guild_id).await?,
        "pause" => handle_control(ctx, &command, bot, guild_id, ControlAction::Pause).await?,
        "resume" => handle_control(ctx, &command, bot, guild_id, ControlAction::Resume).await?,
        "skip" => handle_control(ctx, &command, bot, guild_id, ControlAction::Skip).await?,
        "stop" => handle_control(ctx, &command, bot, guild_id, ControlAction::Stop).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "lyrics" => handle_lyrics(ctx, &command, bot, guild_id).await?,
        "help" => {
            respond_embed(ctx, &command, embeds::create_help_embed(), Vec::new(), true).await?
        }
        _ => respond(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

/// Maneja los botones del reproductor
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let content = match ControlAction::from_button(&component.data.custom_id) {
        Some(action) => match apply_control(&bot.player, guild_id, action).await {
            Ok(message) => message.to_string(),
            Err(e) => user_message(&e),
        },
        None => "❌ Acción no reconocida".to_string(),
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

/// Aplica una acción de control sobre la sesión de la guild.
pub async fn apply_control(
    player: &AudioPlayer,
    guild_id: GuildId,
    action: ControlAction,
) -> Result<&'static str, PlaybackError> {
    let session = || player.session(guild_id).ok_or(StateError::NotConnected);

    match action {
        ControlAction::Pause if session()?.pause().await => Ok("⏸️ Reproducción pausada"),
        ControlAction::Pause => Err(StateError::NothingPlaying.into()),
        ControlAction::Resume if session()?.resume().await => Ok("▶️ Reproducción reanudada"),
        ControlAction::Resume => Err(StateError::NothingPaused.into()),
        ControlAction::Skip if session()?.skip().await => Ok("⏭️ Canción saltada"),
        ControlAction::Skip => Err(StateError::NothingPlaying.into()),
        ControlAction::Stop if player.stop(guild_id).await => {
            Ok("⏹️ Reproducción detenida, cola limpiada y desconectado")
        }
        ControlAction::Stop => Err(StateError::NotConnected.into()),
    }
}

/// Mensaje para el usuario según el tipo de fallo
pub fn user_message(error: &PlaybackError) -> String {
    let emoji = match error {
        PlaybackError::Resolve(ResolveError::NotFound(_)) => "🔍",
        PlaybackError::Resolve(ResolveError::Unavailable(_)) => "🚫",
        PlaybackError::Resolve(ResolveError::Transient(_)) => "⚠️",
        PlaybackError::Sink(_) => "🔌",
        PlaybackError::Validation(_) | PlaybackError::State(_) => "❌",
    };

    let mut message = error.to_string();
    if let Some(first) = message.get(..1) {
        let upper = first.to_uppercase();
        message.replace_range(..1, &upper);
    }

    match error {
        PlaybackError::Resolve(ResolveError::Transient(_)) => {
            format!("{} {}. Intenta de nuevo en unos segundos", emoji, message)
        }
        _ => format!("{} {}", emoji, message),
    }
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    defer(ctx, command).await?;

    let reply = match play_query(ctx, command, bot, guild_id, &query).await {
        Ok((embed, components)) => EditInteractionResponse::new().embed(embed).components(components),
        Err(e) => {
            warn!("⚠️ /play {} falló: {}", query, e);
            EditInteractionResponse::new().content(user_message(&e))
        }
    };

    command.edit_response(&ctx.http, reply).await?;
    Ok(())
}

async fn play_query(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
    query: &str,
) -> Result<(CreateEmbed, Vec<CreateActionRow>), PlaybackError> {
    let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;

    // Resolver antes de tocar la sesión
    let track = bot.player.resolver().resolve(query).await?;

    let session = bot
        .join_voice_channel(ctx, guild_id, channel_id)
        .await
        .map_err(|e| SinkError::Connection(e.to_string()))?;
    bot.reply_channels.insert(guild_id, command.channel_id);

    let reply = match session.enqueue(track.clone()).await? {
        EnqueueOutcome::StartedImmediately => (
            embeds::create_now_playing_embed(&track, false),
            buttons::create_player_buttons(),
        ),
        EnqueueOutcome::Queued { position } => {
            (embeds::create_track_added_embed(&track, position), Vec::new())
        }
    };
    Ok(reply)
}

async fn handle_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let url = option_str(command, "url")
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?
        .to_string();

    defer(ctx, command).await?;

    let embed = match load_playlist(ctx, command, bot, guild_id, &url).await {
        Ok((added, skipped)) => embeds::create_playlist_added_embed(added, skipped, &url),
        Err(e) => embeds::create_error_embed("Error al Cargar Playlist", &user_message(&e)),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

/// Devuelve (agregadas, omitidas)
async fn load_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
    url: &str,
) -> Result<(usize, usize), PlaybackError> {
    let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;

    let mut tracks = Vec::new();
    let mut skipped = 0;
    let mut last_error = None;
    for result in bot.player.resolver().resolve_batch(url).await {
        match result {
            Ok(track) => tracks.push(track),
            Err(e) => {
                skipped += 1;
                last_error = Some(e);
            }
        }
    }

    if tracks.is_empty() {
        return Err(last_error
            .unwrap_or_else(|| ResolveError::NotFound(url.to_string()))
            .into());
    }

    let session = bot
        .join_voice_channel(ctx, guild_id, channel_id)
        .await
        .map_err(|e| SinkError::Connection(e.to_string()))?;
    bot.reply_channels.insert(guild_id, command.channel_id);

    let mut added = 0;
    for result in session.enqueue_many(tracks).await {
        match result {
            Ok(_) => added += 1,
            Err(e) => {
                warn!("⚠️ Track de playlist no encolado: {}", e);
                skipped += 1;
            }
        }
    }

    info!("📋 Playlist en guild {}: {} agregadas, {} omitidas", guild_id, added, skipped);
    Ok((added, skipped))
}

async fn handle_control(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
    action: ControlAction,
) -> Result<()> {
    match apply_control(&bot.player, guild_id, action).await {
        Ok(message) => respond(ctx, command, message, false).await,
        Err(e) => respond(ctx, command, user_message(&e), true).await,
    }
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let page = option_i64(command, "page").unwrap_or(1).max(1) as usize;

    let queue_info = match bot.player.session(guild_id) {
        Some(session) => session.snapshot().await,
        None => MusicQueue::new().get_info(bot.config.session_settings().default_volume),
    };

    respond_embed(ctx, command, embeds::create_queue_embed(&queue_info, page), Vec::new(), false)
        .await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let current = match bot.player.session(guild_id) {
        Some(session) => session.now_playing().await,
        None => None,
    };

    match current {
        Some(track) => {
            respond_embed(
                ctx,
                command,
                embeds::create_now_playing_embed(&track, false),
                buttons::create_player_buttons(),
                false,
            )
            .await
        }
        None => {
            let error: PlaybackError = StateError::NothingPlaying.into();
            respond(ctx, command, user_message(&error), true).await
        }
    }
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let level = option_i64(command, "level")
        .ok_or_else(|| anyhow::anyhow!("Nivel no proporcionado"))?;

    let result = match bot.player.session(guild_id) {
        Some(session) => session.set_volume(level).await.map_err(PlaybackError::from),
        None => Err(StateError::NotConnected.into()),
    };

    match result {
        Ok(_) => respond(ctx, command, format!("🔊 Volumen ajustado a {}%", level), false).await,
        Err(e) => respond(ctx, command, user_message(&e), true).await,
    }
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let mode = option_str(command, "mode");

    let result = match bot.player.session(guild_id) {
        Some(session) => session.set_loop_mode(mode).await.map_err(PlaybackError::from),
        None => Err(StateError::NotConnected.into()),
    };

    match result {
        Ok(mode) => {
            let message = match mode.as_str() {
                "track" => "🔂 Repetir canción activado",
                "queue" => "🔁 Repetir cola activado",
                _ => "➡️ Repetición desactivada",
            };
            respond(ctx, command, message, false).await
        }
        Err(e) => respond(ctx, command, user_message(&e), true).await,
    }
}

async fn handle_lyrics(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let (artist, title) = match option_str(command, "query") {
        Some(query) => parse_query(query),
        None => {
            let current = match bot.player.session(guild_id) {
                Some(session) => session.now_playing().await,
                None => None,
            };
            match current {
                Some(track) => track_query(&track),
                None => {
                    let error: PlaybackError = StateError::NothingPlaying.into();
                    return respond(ctx, command, user_message(&error), true).await;
                }
            }
        }
    };

    let Some(artist) = artist else {
        return respond(ctx, command, "❌ Usa el formato `artista - título`", true).await;
    };

    defer(ctx, command).await?;

    let reply = match bot.lyrics.lyrics(&artist, &title).await {
        Ok(lyrics) => EditInteractionResponse::new()
            .embed(embeds::create_lyrics_embed(&artist, &title, &lyrics)),
        Err(e) => EditInteractionResponse::new().content(user_message(&e.into())),
    };

    command.edit_response(&ctx.http, reply).await?;
    Ok(())
}

// Funciones auxiliares

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;
    Ok(())
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    components: Vec<CreateActionRow>,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(components)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, StateError> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or(StateError::UserNotInVoice)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or(StateError::UserNotInVoice)
}
