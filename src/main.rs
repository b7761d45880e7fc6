use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod storage;
mod ui;

use crate::audio::player::AudioPlayer;
use crate::bot::MusicBot;
use crate::cache::{ResolveCache, RESOLVE_CACHE_CAPACITY};
use crate::config::Config;
use crate::sources::SourceManager;
use crate::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_session=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Session v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    // Inicializar almacenamiento JSON
    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);
    match storage.saved_guilds().await {
        Ok(guilds) => info!("💾 {} colas guardadas en disco", guilds.len()),
        Err(e) => warn!("⚠️ No se pudieron listar las colas guardadas: {:?}", e),
    }

    // Caché de resoluciones y resolvedor de tracks
    let cache = Arc::new(ResolveCache::new(
        RESOLVE_CACHE_CAPACITY,
        config.resolve_cache_ttl,
    ));
    let resolver = Arc::new(SourceManager::new(&config, cache.clone()));

    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let player = Arc::new(AudioPlayer::new(
        storage,
        resolver,
        config.session_settings(),
        notice_tx,
    ));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let token = config.discord_token.clone();
    let handler = MusicBot::new(config, cache, player.clone(), notice_rx);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        player.flush_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
