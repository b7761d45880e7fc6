//! # Bot Module
//!
//! Discord front end of the bot.
//!
//! - Command registration and dispatch
//! - Voice connection management (one playback session per guild)
//! - Forwarding of session notices to the last channel a command came from
//! - Background maintenance tasks
//!
//! The bot never holds playback state itself: everything about what is
//! playing lives in the [`AudioPlayer`]'s sessions.

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{
        player::AudioPlayer,
        session::{PlaybackSession, SessionNotice},
        sink::{SongbirdSink, VoiceSink},
    },
    cache::ResolveCache,
    config::Config,
    sources::LyricsClient,
};
use events::ReplyChannels;

/// Handler principal de eventos de Discord.
pub struct MusicBot {
    config: Arc<Config>,
    cache: Arc<ResolveCache>,
    pub player: Arc<AudioPlayer>,
    pub lyrics: LyricsClient,
    /// Cliente HTTP compartido por las entradas de yt-dlp de songbird
    http: reqwest::Client,
    pub reply_channels: ReplyChannels,
    // Se toma una sola vez en `ready` para lanzar el reenvío de avisos
    notices: Mutex<Option<mpsc::UnboundedReceiver<SessionNotice>>>,
}

impl MusicBot {
    pub fn new(
        config: Config,
        cache: Arc<ResolveCache>,
        player: Arc<AudioPlayer>,
        notices: mpsc::UnboundedReceiver<SessionNotice>,
    ) -> Self {
        let lyrics = LyricsClient::new(config.lyrics_api_url.clone());

        Self {
            config: Arc::new(config),
            cache,
            player,
            lyrics,
            http: reqwest::Client::new(),
            reply_channels: Arc::new(DashMap::new()),
            notices: Mutex::new(Some(notices)),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Per-guild when `GUILD_ID` is set (instant propagation, for
    /// development), global otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
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

    /// Conecta al canal de voz y devuelve la sesión de la guild.
    ///
    /// Si ya hay una sesión abierta se reutiliza tal cual. Una sesión nueva
    /// restaura la cola guardada de la guild antes de devolverse.
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<PlaybackSession>> {
        if let Some(session) = self.player.session(guild_id) {
            return Ok(session);
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);

        let http = self.http.clone();
        let session = self
            .player
            .attach(guild_id, move |finished_tx| {
                Arc::new(SongbirdSink::new(guild_id, manager, call, http, finished_tx))
                    as Arc<dyn VoiceSink>
            })
            .await;

        Ok(session)
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite tras reconexiones; las tareas se lanzan una vez
        let Some(notices) = self.notices.lock().take() else {
            return;
        };

        tokio::spawn(events::forward_notices(
            ctx.http.clone(),
            self.player.clone(),
            self.reply_channels.clone(),
            notices,
        ));

        tokio::spawn(maintenance_tasks(self.cache.clone()));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Si alguien desconecta al bot del canal, la sesión se descarta sin
    /// tocar la conexión (ya no existe).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.player.discard(guild_id).await;
        }
    }
}

/// Mantenimiento periódico: limpia el cache de resoluciones cada hora.
async fn maintenance_tasks(cache: Arc<ResolveCache>) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));

    loop {
        interval.tick().await;
        cache.cleanup_old_entries();
        info!("🧹 Tareas de mantenimiento completadas");
    }
}
