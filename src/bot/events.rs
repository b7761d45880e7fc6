use dashmap::DashMap;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{
    audio::{player::AudioPlayer, session::SessionNotice},
    ui::{buttons, embeds},
};

/// Último canal de texto donde se usó un comando de reproducción, por guild.
pub type ReplyChannels = Arc<DashMap<GuildId, ChannelId>>;

/// Mensaje a publicar para un aviso de sesión
pub struct NoticeMessage {
    pub embed: CreateEmbed,
    pub with_controls: bool,
}

pub fn notice_guild(notice: &SessionNotice) -> GuildId {
    match notice {
        SessionNotice::NowPlaying { guild_id, .. }
        | SessionNotice::LoopingTrack { guild_id, .. }
        | SessionNotice::PlaybackFailed { guild_id, .. }
        | SessionNotice::IdleDisconnected { guild_id } => *guild_id,
    }
}

pub fn notice_message(notice: &SessionNotice) -> NoticeMessage {
    match notice {
        SessionNotice::NowPlaying { track, .. } => NoticeMessage {
            embed: embeds::create_now_playing_embed(track, false),
            with_controls: true,
        },
        SessionNotice::LoopingTrack { track, .. } => NoticeMessage {
            embed: embeds::create_now_playing_embed(track, true),
            with_controls: true,
        },
        SessionNotice::PlaybackFailed { track, reason, .. } => NoticeMessage {
            embed: embeds::create_error_embed(
                "No se pudo reproducir",
                &format!("**{}** se omitió: {}", track.title, reason),
            ),
            with_controls: false,
        },
        SessionNotice::IdleDisconnected { .. } => NoticeMessage {
            embed: embeds::create_warning_embed(
                "Desconectado por inactividad",
                "La cola quedó vacía y no se agregó nada nuevo. Usa `/play` para volver a empezar.",
            ),
            with_controls: false,
        },
    }
}

/// Publica los avisos de todas las sesiones en el último canal de respuesta
/// de cada guild. Termina cuando se cierran todos los emisores.
pub async fn forward_notices(
    http: Arc<Http>,
    player: Arc<AudioPlayer>,
    reply_channels: ReplyChannels,
    mut notices: mpsc::UnboundedReceiver<SessionNotice>,
) {
    info!("📣 Reenvío de avisos de sesión iniciado");

    while let Some(notice) = notices.recv().await {
        let guild_id = notice_guild(&notice);

        if matches!(notice, SessionNotice::IdleDisconnected { .. }) {
            player.release(guild_id);
        }

        let Some(channel_id) = reply_channels.get(&guild_id).map(|c| *c) else {
            debug!("📭 Sin canal de respuesta para guild {}", guild_id);
            continue;
        };

        let message = notice_message(&notice);
        let mut create = CreateMessage::new().embed(message.embed);
        if message.with_controls {
            create = create.components(buttons::create_player_buttons());
        }

        if let Err(e) = channel_id.send_message(&http, create).await {
            error!("Error al enviar aviso a {}: {:?}", channel_id, e);
        }
    }

    debug!("🔚 Reenvío de avisos terminado");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Track;
    use pretty_assertions::assert_eq;

    fn title_of(message: &NoticeMessage) -> String {
        serde_json::to_value(&message.embed).unwrap()["title"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_notice_messages() {
        let guild_id = GuildId::new(5);
        let track = Track::new("Song", "https://example.com/song");

        let now = notice_message(&SessionNotice::NowPlaying {
            guild_id,
            track: track.clone(),
        });
        assert!(now.with_controls);
        assert_eq!(title_of(&now), "🎵 Reproduciendo Ahora");

        let looping = notice_message(&SessionNotice::LoopingTrack {
            guild_id,
            track: track.clone(),
        });
        assert_eq!(title_of(&looping), "🔂 Repitiendo");

        let failed = notice_message(&SessionNotice::PlaybackFailed {
            guild_id,
            track,
            reason: "sin audio".to_string(),
        });
        assert!(!failed.with_controls);
        assert_eq!(title_of(&failed), "❌ No se pudo reproducir");

        let idle = SessionNotice::IdleDisconnected { guild_id };
        assert_eq!(notice_guild(&idle), guild_id);
        assert!(!notice_message(&idle).with_controls);
    }
}
