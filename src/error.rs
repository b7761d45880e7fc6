//! Error taxonomy shared by the session, the resolvers and the voice sink.
//!
//! Command handlers and `main` keep working with [`anyhow::Result`]; the
//! typed errors here exist so the caller can tell *why* an operation failed
//! (bad input vs. nothing playing vs. the video host refusing a track).

use thiserror::Error;

/// Fallos al convertir una consulta del usuario en un track reproducible.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no se encontraron resultados para `{0}`")]
    NotFound(String),
    /// Privado, restringido por edad o bloqueado en la región.
    #[error("contenido no disponible: {0}")]
    Unavailable(String),
    #[error("fallo temporal al resolver: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("el volumen debe estar entre 0 y 100, recibido {0}")]
    VolumeOutOfRange(i64),
    #[error("modo de repetición inválido `{0}` (usa off, track o queue)")]
    InvalidLoopMode(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("no hay nada reproduciéndose")]
    NothingPlaying,
    #[error("no hay nada en pausa")]
    NothingPaused,
    #[error("el bot no está conectado a un canal de voz")]
    NotConnected,
    #[error("debes estar en un canal de voz")]
    UserNotInVoice,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("error de conexión de voz: {0}")]
    Connection(String),
    #[error("error controlando el track: {0}")]
    Control(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_umbrella_keeps_inner_message() {
        let err: PlaybackError = ValidationError::VolumeOutOfRange(101).into();
        assert_eq!(
            err.to_string(),
            "el volumen debe estar entre 0 y 100, recibido 101"
        );
        assert!(matches!(
            err,
            PlaybackError::Validation(ValidationError::VolumeOutOfRange(101))
        ));
    }
}
