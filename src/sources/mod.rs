pub mod lyrics;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

use crate::{cache::ResolveCache, config::Config, error::ResolveError};

pub use lyrics::LyricsClient;
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Artista por defecto cuando la metadata no permite deducirlo.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Track resuelto y reproducible.
///
/// Es también el registro que se persiste en disco: `title`, `url`,
/// `duration` (segundos, 0 para directos o duración desconocida) y `artist`.
/// La `url` sirve tanto para reproducir como para volver a resolver el track
/// al restaurar una cola.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub duration: u64,
    #[serde(default = "unknown_artist")]
    pub artist: String,
}

fn unknown_artist() -> String {
    UNKNOWN_ARTIST.to_string()
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration: 0,
            artist: unknown_artist(),
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        let artist = artist.into();
        if !artist.trim().is_empty() {
            self.artist = artist;
        }
        self
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = seconds;
        self
    }

    /// `None` para directos o fuentes sin duración conocida.
    pub fn duration(&self) -> Option<Duration> {
        (self.duration > 0).then(|| Duration::from_secs(self.duration))
    }
}

/// Contrato del resolvedor: convierte lo que escribe el usuario en tracks.
///
/// Las llamadas pueden tardar segundos (procesos externos, APIs HTTP), así que
/// nunca deben hacerse con el lock de una sesión tomado.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resuelve un enlace directo, una búsqueda o un enlace de otro servicio.
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError>;

    /// Resuelve una playlist elemento por elemento; un fallo no cancela el resto.
    async fn resolve_batch(&self, playlist: &str) -> Vec<Result<Track, ResolveError>>;
}

/// Qué tipo de consulta envió el usuario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Enlace de track de Spotify, con su ID.
    SpotifyTrack(String),
    /// Enlace de playlist del servicio de video.
    Playlist(String),
    /// Cualquier otro enlace http(s), se extrae directamente.
    Link(String),
    /// Texto libre.
    Search(String),
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        let query = query.trim();

        let Ok(url) = Url::parse(query) else {
            return Self::Search(query.to_string());
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Self::Search(query.to_string());
        }

        if let Some(id) = SpotifyClient::track_id(&url) {
            return Self::SpotifyTrack(id);
        }

        if YouTubeClient::is_youtube_host(&url) && url.path() == "/playlist" {
            return Self::Playlist(query.to_string());
        }

        Self::Link(query.to_string())
    }
}

/// Resolvedor principal: enruta cada consulta a la fuente que corresponde y
/// memoriza los resultados exitosos.
pub struct SourceManager {
    youtube: YouTubeClient,
    spotify: Option<SpotifyClient>,
    cache: Arc<ResolveCache>,
    max_playlist_size: usize,
}

impl SourceManager {
    pub fn new(config: &Config, cache: Arc<ResolveCache>) -> Self {
        let spotify = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => Some(SpotifyClient::new(id.clone(), secret.clone())),
            _ => {
                info!("🎧 Spotify sin credenciales, sus enlaces serán rechazados");
                None
            }
        };

        Self {
            youtube: YouTubeClient::new(),
            spotify,
            cache,
            max_playlist_size: config.max_playlist_size,
        }
    }

    async fn resolve_uncached(&self, query: &str) -> Result<Track, ResolveError> {
        match QueryKind::classify(query) {
            QueryKind::SpotifyTrack(id) => {
                let spotify = self.spotify.as_ref().ok_or_else(|| {
                    ResolveError::Unavailable("Spotify no está configurado".to_string())
                })?;
                let phrase = spotify.search_phrase(&id).await?;
                debug!("🎧 Spotify {} → búsqueda \"{}\"", id, phrase);
                self.youtube.search(&phrase).await
            }
            // Con /play sólo se toma el primer elemento de una playlist
            QueryKind::Playlist(url) => {
                let entries = self.youtube.playlist_entries(&url, 1).await?;
                let first = entries
                    .into_iter()
                    .next()
                    .ok_or_else(|| ResolveError::NotFound(url.clone()))?;
                self.youtube.extract(&first).await
            }
            QueryKind::Link(url) => self.youtube.extract(&url).await,
            QueryKind::Search(text) => self.youtube.search(&text).await,
        }
    }
}

#[async_trait]
impl TrackResolver for SourceManager {
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
        let key = query.trim().to_string();
        if key.is_empty() {
            return Err(ResolveError::NotFound(String::new()));
        }

        if let Some(track) = self.cache.get(&key) {
            debug!("💾 Cache hit: {}", key);
            return Ok(track);
        }

        let track = self.resolve_uncached(&key).await?;
        self.cache.insert(key, track.clone());
        Ok(track)
    }

    async fn resolve_batch(&self, playlist: &str) -> Vec<Result<Track, ResolveError>> {
        let entries = match self
            .youtube
            .playlist_entries(playlist.trim(), self.max_playlist_size)
            .await
        {
            Ok(entries) => entries,
            Err(e) => return vec![Err(e)],
        };

        info!("📋 Resolviendo {} elementos de playlist", entries.len());

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = self.resolve(&entry).await;
            if let Err(e) = &result {
                warn!("⚠️ Elemento de playlist omitido ({}): {}", entry, e);
            }
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_classification() {
        assert_eq!(
            QueryKind::classify("never gonna give you up"),
            QueryKind::Search("never gonna give you up".to_string())
        );
        assert_eq!(
            QueryKind::classify("https://youtu.be/dQw4w9WgXcQ"),
            QueryKind::Link("https://youtu.be/dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            QueryKind::classify("https://open.spotify.com/track/4cOdK2wGLETKBW3PvgPWqT?si=abc"),
            QueryKind::SpotifyTrack("4cOdK2wGLETKBW3PvgPWqT".to_string())
        );
        assert_eq!(
            QueryKind::classify("https://www.youtube.com/playlist?list=PL123"),
            QueryKind::Playlist("https://www.youtube.com/playlist?list=PL123".to_string())
        );
        // watch con list= se trata como un video suelto
        assert!(matches!(
            QueryKind::classify("https://www.youtube.com/watch?v=abc&list=PL123"),
            QueryKind::Link(_)
        ));
        assert!(matches!(QueryKind::classify("ftp://host/file.mp3"), QueryKind::Search(_)));
    }

    #[test]
    fn test_track_defaults() {
        let track = Track::new("Song", "https://example.com/a").with_artist("  ");
        assert_eq!(track.artist, UNKNOWN_ARTIST);
        assert_eq!(track.duration(), None);
        assert_eq!(
            track.with_duration(90).duration(),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn test_record_without_artist_deserializes() {
        let track: Track =
            serde_json::from_str(r#"{"title":"A","url":"https://x/a","duration":3}"#).unwrap();
        assert_eq!(track.artist, UNKNOWN_ARTIST);
        assert_eq!(track.duration, 3);
    }
}
