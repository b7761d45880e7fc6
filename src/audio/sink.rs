use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{Input, YoutubeDl},
    tracks::{PlayMode, Track as AudioTrack, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::{error::SinkError, sources::Track};

/// Identifica una llamada concreta a [`VoiceSink::play`].
pub type PlayId = u64;

/// Aviso de fin de reproducción, natural o forzado por `stop_now`.
///
/// Se emite exactamente una vez por cada `play`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub play_id: PlayId,
    pub track: Track,
}

/// Destino de audio de una sesión.
///
/// La sesión sólo habla con el sink a través de esta interfaz; los avisos de
/// fin llegan por el canal que recibe la implementación al construirse.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn play(&self, track: &Track, volume: f32) -> Result<PlayId, SinkError>;
    async fn pause(&self) -> Result<(), SinkError>;
    async fn resume(&self) -> Result<(), SinkError>;
    async fn stop_now(&self) -> Result<(), SinkError>;
    async fn set_volume(&self, volume: f32) -> Result<(), SinkError>;
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
    async fn disconnect(&self) -> Result<(), SinkError>;
}

/// Sink respaldado por una llamada de voz de songbird.
pub struct SongbirdSink {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    current: SyncMutex<Option<TrackHandle>>,
    next_id: AtomicU64,
    finished_tx: mpsc::UnboundedSender<Finished>,
}

impl SongbirdSink {
    pub fn new(
        guild_id: GuildId,
        manager: Arc<Songbird>,
        call: Arc<Mutex<Call>>,
        http: reqwest::Client,
        finished_tx: mpsc::UnboundedSender<Finished>,
    ) -> Self {
        Self {
            guild_id,
            manager,
            call,
            http,
            current: SyncMutex::new(None),
            next_id: AtomicU64::new(0),
            finished_tx,
        }
    }

    fn handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.handle()?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn play(&self, track: &Track, volume: f32) -> Result<PlayId, SinkError> {
        let play_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let input: Input = YoutubeDl::new(self.http.clone(), track.url.clone()).into();

        // El volumen va en el track antes de que suene
        let handle = {
            let mut call = self.call.lock().await;
            call.play(AudioTrack::new(input).volume(volume))
        };

        // End y Error comparten la bandera: sólo el primero avisa
        let notifier = FinishedNotifier {
            play_id,
            track: track.clone(),
            fired: Arc::new(AtomicBool::new(false)),
            tx: self.finished_tx.clone(),
        };
        let handle = arm_or_stop(handle, |handle| {
            for event in [TrackEvent::End, TrackEvent::Error] {
                handle
                    .add_event(Event::Track(event), notifier.clone())
                    .map_err(|e| SinkError::Control(e.to_string()))?;
            }
            Ok(())
        })?;

        *self.current.lock() = Some(handle);
        info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title);
        Ok(play_id)
    }

    async fn pause(&self) -> Result<(), SinkError> {
        let handle = self.handle().ok_or_else(|| SinkError::Control("sin track".into()))?;
        handle.pause().map_err(|e| SinkError::Control(e.to_string()))
    }

    async fn resume(&self) -> Result<(), SinkError> {
        let handle = self.handle().ok_or_else(|| SinkError::Control("sin track".into()))?;
        handle.play().map_err(|e| SinkError::Control(e.to_string()))
    }

    async fn stop_now(&self) -> Result<(), SinkError> {
        match self.handle() {
            Some(handle) => handle.stop().map_err(|e| SinkError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        match self.handle() {
            Some(handle) => handle
                .set_volume(volume)
                .map_err(|e| SinkError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.current.lock().take();
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Control mínimo sobre un track que ya empezó a sonar.
trait StartedTrack {
    fn halt(&self) -> Result<(), SinkError>;
}

impl StartedTrack for TrackHandle {
    fn halt(&self) -> Result<(), SinkError> {
        self.stop().map_err(|e| SinkError::Control(e.to_string()))
    }
}

/// Aplica `arm` a un track recién iniciado. Si falla, el track se detiene
/// antes de devolver el error: sin él nadie podría pausarlo ni saltarlo.
fn arm_or_stop<H: StartedTrack>(
    handle: H,
    arm: impl FnOnce(&H) -> Result<(), SinkError>,
) -> Result<H, SinkError> {
    if let Err(e) = arm(&handle) {
        if let Err(stop_err) = handle.halt() {
            warn!("⚠️ No se pudo detener el track huérfano: {}", stop_err);
        }
        return Err(e);
    }
    Ok(handle)
}

/// Handler de songbird que convierte el fin de un track en un [`Finished`].
///
/// Corre en el hilo de eventos de songbird; no toca la sesión, sólo envía el
/// mensaje al bucle de control.
#[derive(Clone)]
struct FinishedNotifier {
    play_id: PlayId,
    track: Track,
    fired: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Finished>,
}

#[async_trait]
impl VoiceEventHandler for FinishedNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("❌ Error en track {}: {:?}", self.track.title, e);
                }
            }
        }

        if !self.fired.swap(true, Ordering::SeqCst) {
            debug!("⏹️ Track {} terminado (play {})", self.track.title, self.play_id);
            let _ = self.tx.send(Finished {
                play_id: self.play_id,
                track: self.track.clone(),
            });
        }

        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingTrack {
        halts: AtomicUsize,
    }

    impl StartedTrack for &RecordingTrack {
        fn halt(&self) -> Result<(), SinkError> {
            self.halts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failed_setup_stops_started_track() {
        let started = RecordingTrack::default();

        let result = arm_or_stop(&started, |_| {
            Err(SinkError::Control("track terminado".into()))
        });

        assert!(matches!(result, Err(SinkError::Control(_))));
        assert_eq!(started.halts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_successful_setup_keeps_track_running() {
        let started = RecordingTrack::default();

        let result = arm_or_stop(&started, |_| Ok(()));

        assert!(result.is_ok());
        assert_eq!(started.halts.load(Ordering::SeqCst), 0);
    }
}
