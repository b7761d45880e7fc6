use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::ResolveError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Margen para renovar el token antes de que caduque
const TOKEN_MARGIN: Duration = Duration::from_secs(30);

/// Cliente mínimo de la Web API de Spotify (client credentials).
///
/// Sólo traduce un track a la frase de búsqueda `"<artista> - <título>"`; el
/// audio siempre sale del buscador de video.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// ID del track en un enlace `open.spotify.com/[intl-xx/]track/<id>`.
    pub fn track_id(url: &Url) -> Option<String> {
        if url.host_str() != Some("open.spotify.com") {
            return None;
        }

        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let mut kind = segments.next()?;
        if kind.starts_with("intl-") {
            kind = segments.next()?;
        }
        if kind != "track" {
            return None;
        }

        segments
            .next()
            .filter(|id| id.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_string)
    }

    /// Frase de búsqueda `"<artista> - <título>"` para un track.
    pub async fn search_phrase(&self, track_id: &str) -> Result<String, ResolveError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{}/tracks/{}", API_URL, track_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ResolveError::Transient(format!("Spotify: {}", e)))?;

        match response.status() {
            s if s.is_success() => {}
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::BAD_REQUEST => {
                return Err(ResolveError::NotFound(format!("Spotify track {}", track_id)));
            }
            s => return Err(ResolveError::Transient(format!("Spotify respondió {}", s))),
        }

        let track: SpotifyTrack = response
            .json()
            .await
            .map_err(|e| ResolveError::Transient(format!("Spotify: {}", e)))?;

        Ok(search_phrase(&track))
    }

    /// Token vigente; pide uno nuevo si no hay o está por caducar.
    async fn access_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ResolveError::Transient(format!("Spotify: {}", e)))?;

        if !response.status().is_success() {
            return Err(ResolveError::Unavailable(format!(
                "Spotify rechazó las credenciales ({})",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Transient(format!("Spotify: {}", e)))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_MARGIN);
        info!("🔑 Token de Spotify renovado (válido {:?})", lifetime);

        *cached = Some(AccessToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }
}

fn search_phrase(track: &SpotifyTrack) -> String {
    match track.artists.first() {
        Some(artist) => format!("{} - {}", artist.name, track.name),
        None => track.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> Option<String> {
        SpotifyClient::track_id(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_track_id_extraction() {
        assert_eq!(
            id("https://open.spotify.com/track/4cOdK2wGLETKBW3PvgPWqT"),
            Some("4cOdK2wGLETKBW3PvgPWqT".to_string())
        );
        assert_eq!(
            id("https://open.spotify.com/intl-es/track/4cOdK2wGLETKBW3PvgPWqT?si=1"),
            Some("4cOdK2wGLETKBW3PvgPWqT".to_string())
        );
        assert_eq!(id("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3"), None);
        assert_eq!(id("https://example.com/track/abc"), None);
    }

    #[test]
    fn test_search_phrase_uses_first_artist() {
        let track: SpotifyTrack = serde_json::from_str(
            r#"{"name":"Get Lucky","artists":[{"name":"Daft Punk"},{"name":"Pharrell Williams"}]}"#,
        )
        .unwrap();
        assert_eq!(search_phrase(&track), "Daft Punk - Get Lucky");

        let track: SpotifyTrack = serde_json::from_str(r#"{"name":"Untitled"}"#).unwrap();
        assert_eq!(search_phrase(&track), "Untitled");
    }
}
