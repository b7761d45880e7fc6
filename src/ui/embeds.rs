use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::{LoopMode, QueueInfo, QueuePage},
    sources::Track,
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
const STANDARD_FOOTER: &str = "🎵 Open Music Bot";

/// Canciones por página en `/queue`
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Límite de Discord para la descripción de un embed
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

fn duration_field(track: &Track) -> String {
    match track.duration() {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    }
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, looping: bool) -> CreateEmbed {
    let title = if looping {
        "🔂 Repitiendo"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &track.artist, true)
        .field("⏱️ Duración", duration_field(track), true)
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            track.title
        ))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &track.artist, true)
        .field("⏱️ Duración", duration_field(track), true)
        .field("📍 Posición", position.to_string(), true)
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando llegue su turno",
        ))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_added_embed(added: usize, skipped: usize, playlist_url: &str) -> CreateEmbed {
    let description = if added == 1 {
        "Se agregó **1 canción** de la playlist a la cola de reproducción".to_string()
    } else {
        format!(
            "Se agregaron **{} canciones** de la playlist a la cola de reproducción",
            added
        )
    };

    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("📊 Canciones agregadas", added.to_string(), true);

    if skipped > 0 {
        embed = embed.field("⚠️ Omitidas", skipped.to_string(), true);
    }

    if let Some(list_id) = playlist_id(playlist_url) {
        embed = embed.field("🆔 Playlist ID", format!("`{}`", list_id), true);
    }

    embed
        .footer(CreateEmbedFooter::new(
            "🎵 Usa /queue para ver todas las canciones",
        ))
        .timestamp(Timestamp::now())
}

fn playlist_id(playlist_url: &str) -> Option<&str> {
    let list_start = playlist_url.find("list=")?;
    let list_id = &playlist_url[list_start + 5..];
    list_id.split('&').next().filter(|id| !id.is_empty())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_info.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &queue_info.current {
        embed = embed.field(
            format!("{} Reproduciendo", loop_emoji(queue_info.loop_mode)),
            format!("**{}** - {}", current.title, current.artist),
            false,
        );
    }

    // Próximas canciones
    let queue_page = queue_info.get_page(page, QUEUE_PAGE_SIZE);
    if !queue_page.items.is_empty() {
        embed = embed.field("Próximas canciones", queue_lines(&queue_page), false);
    }

    embed = embed.field("Información", queue_summary(queue_info), false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Open Music Bot",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

fn loop_emoji(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Track => "🔂",
        LoopMode::Queue => "🔁",
        LoopMode::Off => "▶️",
    }
}

fn queue_lines(page: &QueuePage) -> String {
    page.items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let duration = item
                .duration()
                .map(|d| format!(" `[{}]`", format_duration(d)))
                .unwrap_or_default();
            format!(
                "**{}**. {} - {}{}",
                page.first_position + i,
                item.title,
                item.artist,
                duration
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn queue_summary(queue_info: &QueueInfo) -> String {
    let mut info = format!("**En cola:** {} canciones", queue_info.total_items);

    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_info.total_duration)
        ));
    }

    info.push_str(&format!(
        " • **Volumen:** {}%",
        (queue_info.volume * 100.0).round() as u32
    ));

    if queue_info.loop_mode != LoopMode::Off {
        info.push_str(&format!(
            " • {} **Repetición:** {}",
            loop_emoji(queue_info.loop_mode),
            queue_info.loop_mode
        ));
    }

    info
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Open Music Bot - Guía")
        .color(colors::INFO_BLUE)
        .description("Bot de música con cola persistente por servidor")
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o agrega a la cola\n\
            • `/playlist <url>` - Agrega una playlist completa\n\
            • `/pause` - Pausa la reproducción\n\
            • `/resume` - Reanuda la reproducción\n\
            • `/skip` - Salta la canción actual\n\
            • `/stop` - Detiene, limpia la cola y desconecta",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/nowplaying` - Muestra la canción actual\n\
            • `/loop [off|track|queue]` - Configura la repetición",
            false,
        )
        .field(
            "🎛️ Audio",
            "• `/volume <0-100>` - Ajusta el volumen\n\
            • `/lyrics [artista - título]` - Busca la letra",
            false,
        )
        .field(
            "🎵 Fuentes Soportadas",
            "• Búsquedas de texto\n\
            • YouTube / YouTube Music\n\
            • Spotify (enlaces de canciones)",
            false,
        )
        .footer(CreateEmbedFooter::new(
            "💡 La cola se guarda y se restaura al volver a conectar",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed con la letra de una canción
pub fn create_lyrics_embed(artist: &str, title: &str, lyrics: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("📝 {} - {}", artist, title))
        .description(truncate_lyrics(lyrics, EMBED_DESCRIPTION_LIMIT))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new("Letra: lyrics.ovh"))
        .timestamp(Timestamp::now())
}

/// Recorta a `limit` caracteres terminando en un salto de línea si se puede
fn truncate_lyrics(lyrics: &str, limit: usize) -> String {
    const MARKER: &str = "\n…";

    if lyrics.chars().count() <= limit {
        return lyrics.to_string();
    }

    let keep = limit.saturating_sub(MARKER.chars().count());
    let cut: String = lyrics.chars().take(keep).collect();
    let cut = match cut.rfind('\n') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}{}", cut, MARKER)
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::MusicQueue;
    use pretty_assertions::assert_eq;

    fn track(name: &str, seconds: u64) -> Track {
        Track::new(name, format!("https://example.com/{name}"))
            .with_artist("Artista")
            .with_duration(seconds)
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(354)), "5:54");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn test_queue_lines_number_from_page_offset() {
        let mut queue = MusicQueue::new();
        queue.start(track("actual", 60));
        for i in 1..=12 {
            queue.push(track(&format!("t{i}"), if i == 12 { 0 } else { 61 }));
        }

        let page = queue.get_info(0.5).get_page(2, QUEUE_PAGE_SIZE);
        assert_eq!(
            queue_lines(&page),
            "**11**. t11 - Artista `[1:01]`\n**12**. t12 - Artista"
        );
    }

    #[test]
    fn test_queue_summary() {
        let mut queue = MusicQueue::new();
        queue.start(track("a", 120));
        queue.push(track("b", 60));
        queue.set_loop_mode(LoopMode::Queue);

        assert_eq!(
            queue_summary(&queue.get_info(0.8)),
            "**En cola:** 1 canciones • **Duración:** 3:00 • **Volumen:** 80% • 🔁 **Repetición:** queue"
        );
    }

    #[test]
    fn test_lyrics_truncation() {
        assert_eq!(truncate_lyrics("corta", 100), "corta");

        let long = "linea uno\nlinea dos\nlinea tres";
        let cut = truncate_lyrics(long, 22);
        assert_eq!(cut, "linea uno\nlinea dos\n…");
        assert!(cut.chars().count() <= 22);
    }

    #[test]
    fn test_playlist_id() {
        assert_eq!(
            playlist_id("https://www.youtube.com/playlist?list=PL123&index=2"),
            Some("PL123")
        );
        assert_eq!(playlist_id("https://www.youtube.com/watch?v=x"), None);
    }

    #[test]
    fn test_now_playing_embed_marks_live() {
        let json = serde_json::to_value(create_now_playing_embed(&track("live", 0), false)).unwrap();
        assert_eq!(json["fields"][1]["value"], "🔴 En vivo");
    }
}
