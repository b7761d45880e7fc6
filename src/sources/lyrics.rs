use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Track, UNKNOWN_ARTIST};
use crate::error::ResolveError;

/// Cliente del servicio de letras (API de lyrics.ovh).
pub struct LyricsClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LyricsResponse {
    lyrics: Option<String>,
}

impl LyricsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn lyrics(&self, artist: &str, title: &str) -> Result<String, ResolveError> {
        let url = self.lyrics_url(artist, title);
        debug!("📝 Buscando letra: {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::Transient(format!("Servicio de letras: {}", e)))?;

        let not_found = || ResolveError::NotFound(format!("{} - {}", artist, title));

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(not_found());
        }
        if !response.status().is_success() {
            return Err(ResolveError::Transient(format!(
                "Servicio de letras respondió {}",
                response.status()
            )));
        }

        let body: LyricsResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Transient(format!("Servicio de letras: {}", e)))?;

        body.lyrics
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(not_found)
    }

    fn lyrics_url(&self, artist: &str, title: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            urlencoding::encode(artist.trim()),
            urlencoding::encode(title.trim())
        )
    }
}

/// Interpreta `"artista - título"`. Sin separador, todo es el título.
pub fn parse_query(query: &str) -> (Option<String>, String) {
    match query.split_once(" - ") {
        Some((artist, title)) if !artist.trim().is_empty() && !title.trim().is_empty() => {
            (Some(artist.trim().to_string()), title.trim().to_string())
        }
        _ => (None, query.trim().to_string()),
    }
}

/// Artista y título de un track para buscar su letra.
pub fn track_query(track: &Track) -> (Option<String>, String) {
    if track.artist != UNKNOWN_ARTIST {
        return (Some(track.artist.clone()), track.title.clone());
    }
    parse_query(&track.title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_query("Queen - Bohemian Rhapsody"),
            (Some("Queen".to_string()), "Bohemian Rhapsody".to_string())
        );
        assert_eq!(parse_query("  yesterday "), (None, "yesterday".to_string()));
        assert_eq!(parse_query(" - nada"), (None, "- nada".to_string()));
    }

    #[test]
    fn test_track_query_prefers_known_artist() {
        let track = Track::new("Song 2", "https://x/1").with_artist("Blur");
        assert_eq!(track_query(&track), (Some("Blur".to_string()), "Song 2".to_string()));

        let track = Track::new("Blur - Song 2", "https://x/1");
        assert_eq!(track_query(&track), (Some("Blur".to_string()), "Song 2".to_string()));
    }

    #[test]
    fn test_lyrics_url_is_encoded() {
        let client = LyricsClient::new("https://api.lyrics.ovh/v1/");
        assert_eq!(
            client.lyrics_url("AC/DC", "Back in Black"),
            "https://api.lyrics.ovh/v1/AC%2FDC/Back%20in%20Black"
        );
    }

    #[test]
    fn test_response_without_lyrics_field() {
        let body: LyricsResponse = serde_json::from_str(r#"{"error":"No lyrics found"}"#).unwrap();
        assert!(body.lyrics.is_none());
    }
}
