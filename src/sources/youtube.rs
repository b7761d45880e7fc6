use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::Track;
use crate::error::ResolveError;

/// "Artista - Título" en títulos de video; acepta guion, en-dash o em-dash.
/// Si el patrón no compila, el artista sale del uploader.
static ARTIST_TITLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<artist>[^-–—]+?)\s+[-–—]\s+(?P<title>.+?)\s*$")
        .map_err(|e| warn!("⚠️ Patrón de artista inválido: {}", e))
        .ok()
});

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp (`--dump-single-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    artist: Option<String>,
    creator: Option<String>,
    uploader: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self {
            rate_limiter: Semaphore::new(3),
        }
    }

    pub fn is_youtube_host(url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| YOUTUBE_HOSTS.contains(&host.to_lowercase().as_str()))
    }

    /// Busca y devuelve el primer resultado
    pub async fn search(&self, query: &str) -> Result<Track, ResolveError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let info = self
            .dump_json(&["--dump-single-json", "--skip-download", "--no-warnings", &search_query])
            .await?;

        let first = info
            .entries
            .and_then(|entries| entries.into_iter().next())
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;

        info_to_track(first, query)
    }

    /// Obtiene información de una URL específica
    pub async fn extract(&self, url: &str) -> Result<Track, ResolveError> {
        debug!("📊 Obteniendo info de: {}", url);

        let mut info = self
            .dump_json(&[
                "--dump-single-json",
                "--no-playlist",
                "--skip-download",
                "--no-warnings",
                url,
            ])
            .await?;

        // Algunos extractores devuelven una lista aun con --no-playlist
        if let Some(first) = info.entries.take().and_then(|e| e.into_iter().next()) {
            info = first;
        }

        info_to_track(info, url)
    }

    /// URLs de los elementos de una playlist, como mucho `limit`
    pub async fn playlist_entries(&self, url: &str, limit: usize) -> Result<Vec<String>, ResolveError> {
        info!("📋 Obteniendo playlist: {}", url);

        let limit = limit.to_string();
        let info = self
            .dump_json(&[
                "--flat-playlist",
                "--dump-single-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                url,
            ])
            .await?;

        let entries: Vec<String> = info
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(entry_url)
            .collect();

        if entries.is_empty() {
            return Err(ResolveError::NotFound(url.to_string()));
        }
        Ok(entries)
    }

    async fn dump_json(&self, args: &[&str]) -> Result<YtDlpInfo, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Transient(e.to_string()))?;

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .map_err(|e| ResolveError::Transient(format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("⚠️ yt-dlp falló: {}", stderr.trim());
            return Err(classify_failure(&stderr));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            ResolveError::Transient(format!("Error al parsear respuesta de yt-dlp: {}", e))
        })
    }
}

/// Traduce el stderr de yt-dlp a un error del dominio.
fn classify_failure(stderr: &str) -> ResolveError {
    let lower = stderr.to_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("yt-dlp error")
        .trim()
        .to_string();

    const UNAVAILABLE: &[&str] = &[
        "private video",
        "video unavailable",
        "sign in to confirm your age",
        "age-restricted",
        "not available in your country",
        "blocked it in your country",
        "has been removed",
        "account associated with this video has been terminated",
    ];
    const NOT_FOUND: &[&str] = &["no video results", "unsupported url", "does not exist", "http error 404"];

    if UNAVAILABLE.iter().any(|pattern| lower.contains(pattern)) {
        ResolveError::Unavailable(message)
    } else if NOT_FOUND.iter().any(|pattern| lower.contains(pattern)) {
        ResolveError::NotFound(message)
    } else {
        ResolveError::Transient(message)
    }
}

/// Separa "Artista - Título" si el título tiene esa forma.
fn split_artist_title(title: &str) -> Option<(String, String)> {
    let caps = ARTIST_TITLE.as_ref()?.captures(title)?;
    Some((caps["artist"].to_string(), caps["title"].to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn entry_url(entry: YtDlpInfo) -> Option<String> {
    match (entry.url, entry.webpage_url, entry.id) {
        (Some(url), _, _) if url.starts_with("http") => Some(url),
        (_, Some(page), _) => Some(page),
        (_, _, Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
        _ => None,
    }
}

fn info_to_track(info: YtDlpInfo, query: &str) -> Result<Track, ResolveError> {
    let title = non_blank(info.title).ok_or_else(|| ResolveError::NotFound(query.to_string()))?;
    let url = non_blank(info.webpage_url)
        .or_else(|| non_blank(info.url))
        .unwrap_or_else(|| query.to_string());

    // Artista: metadata explícita, luego el título, luego el canal
    let artist = non_blank(info.artist)
        .or_else(|| non_blank(info.creator))
        .or_else(|| split_artist_title(&title).map(|(artist, _)| artist))
        .or_else(|| non_blank(info.uploader));

    let duration = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map_or(0, |d| d.round() as u64);

    let mut track = Track::new(title, url).with_duration(duration);
    if let Some(artist) = artist {
        track = track.with_artist(artist);
    }
    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::UNKNOWN_ARTIST;
    use pretty_assertions::assert_eq;

    fn info(json: &str) -> YtDlpInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_artist_pattern_compiles() {
        assert!(ARTIST_TITLE.is_some());
    }

    #[test]
    fn test_youtube_host_detection() {
        let is_yt = |s: &str| YouTubeClient::is_youtube_host(&Url::parse(s).unwrap());
        assert!(is_yt("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_yt("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_yt("https://music.youtube.com/watch?v=test"));
        assert!(!is_yt("https://example.com/video"));
        assert!(!is_yt("https://notyoutube.com/watch?v=x"));
    }

    #[test]
    fn test_failure_classification() {
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Private video. Sign in if you've been granted access"),
            ResolveError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Sign in to confirm your age"),
            ResolveError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: Unsupported URL: https://example.com"),
            ResolveError::NotFound(_)
        ));
        assert_eq!(
            classify_failure("WARNING: x\nERROR: Unable to download webpage: timed out\n"),
            ResolveError::Transient("ERROR: Unable to download webpage: timed out".to_string())
        );
    }

    #[test]
    fn test_artist_title_split() {
        assert_eq!(
            split_artist_title("Daft Punk - Get Lucky (Official Audio)"),
            Some(("Daft Punk".to_string(), "Get Lucky (Official Audio)".to_string()))
        );
        assert_eq!(
            split_artist_title("Rosalía – MALAMENTE"),
            Some(("Rosalía".to_string(), "MALAMENTE".to_string()))
        );
        assert_eq!(split_artist_title("Lofi beats to study"), None);
    }

    #[test]
    fn test_artist_fallback_order() {
        let track = info_to_track(
            info(r#"{"title":"A - B","artist":"Real","creator":"C","uploader":"U","webpage_url":"https://y/1"}"#),
            "q",
        )
        .unwrap();
        assert_eq!(track.artist, "Real");

        let track = info_to_track(
            info(r#"{"title":"A - B","creator":"C","uploader":"U"}"#),
            "q",
        )
        .unwrap();
        assert_eq!(track.artist, "C");

        let track = info_to_track(info(r#"{"title":"A - B","uploader":"U"}"#), "q").unwrap();
        assert_eq!(track.artist, "A");

        let track = info_to_track(info(r#"{"title":"Solo","uploader":"U"}"#), "q").unwrap();
        assert_eq!(track.artist, "U");

        let track = info_to_track(info(r#"{"title":"Solo","uploader":" "}"#), "q").unwrap();
        assert_eq!(track.artist, UNKNOWN_ARTIST);
    }

    #[test]
    fn test_info_to_track_fields() {
        let track = info_to_track(
            info(r#"{"title":"Song","webpage_url":"https://www.youtube.com/watch?v=x","duration":212.6}"#),
            "https://youtu.be/x",
        )
        .unwrap();
        assert_eq!(track.url, "https://www.youtube.com/watch?v=x");
        assert_eq!(track.duration, 213);

        // Directo: sin duración
        let live = info_to_track(info(r#"{"title":"Live","duration":null}"#), "https://y/live").unwrap();
        assert_eq!(live.duration, 0);
        assert_eq!(live.url, "https://y/live");

        assert!(matches!(
            info_to_track(info(r#"{"title":""}"#), "q"),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_playlist_entry_urls() {
        let playlist = info(
            r#"{"entries":[
                {"url":"https://www.youtube.com/watch?v=a","id":"a"},
                {"id":"b"},
                {"title":"sin url"}
            ]}"#,
        );
        let urls: Vec<String> = playlist
            .entries
            .unwrap()
            .into_iter()
            .filter_map(entry_url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/watch?v=a",
                "https://www.youtube.com/watch?v=b"
            ]
        );
    }
}
