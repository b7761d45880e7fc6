//! Per-guild playback session.
//!
//! A [`PlaybackSession`] is the single source of truth for what is playing and
//! what is queued. Every mutating operation runs under one async mutex, and the
//! sink's end-of-track notifications are consumed by a dedicated control loop
//! that takes the same mutex, so a user `/skip` and a natural end of the same
//! track can never both advance the queue.
//!
//! Each call to the sink's `play` returns a [`PlayId`]; the session remembers
//! the one in flight and ignores completions for any other id.

use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    queue::{LoopMode, MusicQueue, QueueInfo, Transition},
    sink::{Finished, PlayId, VoiceSink},
};
use crate::{
    error::{PlaybackError, StateError, ValidationError},
    sources::Track,
    storage::SnapshotWriter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    StartedImmediately,
    /// Posición en la cola, 1 = siguiente.
    Queued { position: usize },
}

/// Avisos para la capa de Discord. Se emiten después de persistir.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    NowPlaying { guild_id: GuildId, track: Track },
    LoopingTrack { guild_id: GuildId, track: Track },
    PlaybackFailed { guild_id: GuildId, track: Track, reason: String },
    IdleDisconnected { guild_id: GuildId },
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub default_volume: f32,
    pub idle_timeout: Duration,
}

struct SessionState {
    queue: MusicQueue,
    volume: f32,
    in_flight: Option<PlayId>,
    idle_timer: Option<CancellationToken>,
}

pub struct PlaybackSession {
    guild_id: GuildId,
    sink: Arc<dyn VoiceSink>,
    snapshots: SnapshotWriter,
    notices: mpsc::UnboundedSender<SessionNotice>,
    idle_timeout: Duration,
    closed: AtomicBool,
    state: Mutex<SessionState>,
}

impl PlaybackSession {
    /// Crea la sesión y lanza su bucle de control sobre `finished_rx`.
    pub fn start(
        guild_id: GuildId,
        sink: Arc<dyn VoiceSink>,
        finished_rx: mpsc::UnboundedReceiver<Finished>,
        snapshots: SnapshotWriter,
        notices: mpsc::UnboundedSender<SessionNotice>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            guild_id,
            sink,
            snapshots,
            notices,
            idle_timeout: settings.idle_timeout,
            closed: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                queue: MusicQueue::new(),
                volume: settings.default_volume.clamp(0.0, 1.0),
                in_flight: None,
                idle_timer: None,
            }),
        });

        session.spawn_control_loop(finished_rx);
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn spawn_control_loop(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<Finished>) {
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(finished) = rx.recv().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.on_finished(finished.play_id).await;
                if session.is_closed() {
                    break;
                }
            }
            debug!("🔚 Bucle de control terminado");
        });
    }

    /// Reproduce de inmediato si el sink está libre; si no, agrega al final.
    ///
    /// Si el sink falla al arrancar, `current` y la cola quedan como estaban.
    pub async fn enqueue(&self, track: Track) -> Result<EnqueueOutcome, PlaybackError> {
        let mut state = self.state.lock().await;
        if self.is_closed() {
            return Err(StateError::NotConnected.into());
        }

        if state.queue.current().is_some() {
            let position = state.queue.push(track);
            self.persist(&state);
            return Ok(EnqueueOutcome::Queued { position });
        }

        let play_id = self.sink.play(&track, state.volume).await?;
        info!("▶️ Reproduciendo de inmediato: {}", track.title);
        state.queue.start(track);
        state.in_flight = Some(play_id);
        Self::cancel_idle_timer(&mut state);
        self.persist(&state);

        Ok(EnqueueOutcome::StartedImmediately)
    }

    /// Igual que `enqueue` repetido en orden; cada elemento falla por separado.
    pub async fn enqueue_many(
        &self,
        tracks: Vec<Track>,
    ) -> Vec<Result<EnqueueOutcome, PlaybackError>> {
        let mut results = Vec::with_capacity(tracks.len());
        for track in tracks {
            results.push(self.enqueue(track).await);
        }
        results
    }

    pub async fn pause(&self) -> bool {
        let state = self.state.lock().await;
        if state.in_flight.is_none() || !self.sink.is_playing().await {
            return false;
        }

        match self.sink.pause().await {
            Ok(()) => {
                info!("⏸️ Reproducción pausada");
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo pausar: {}", e);
                false
            }
        }
    }

    pub async fn resume(&self) -> bool {
        let state = self.state.lock().await;
        if state.in_flight.is_none() || !self.sink.is_paused().await {
            return false;
        }

        match self.sink.resume().await {
            Ok(()) => {
                info!("▶️ Reproducción reanudada");
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo reanudar: {}", e);
                false
            }
        }
    }

    /// Detiene el track en curso; el aviso de fin del sink dispara la misma
    /// transición que un final natural. Con loop de track eso significa que el
    /// mismo track vuelve a sonar.
    pub async fn skip(&self) -> bool {
        let state = self.state.lock().await;
        if state.in_flight.is_none() {
            return false;
        }
        if !(self.sink.is_playing().await || self.sink.is_paused().await) {
            return false;
        }

        match self.sink.stop_now().await {
            Ok(()) => {
                info!("⏭️ Track saltado");
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo saltar: {}", e);
                false
            }
        }
    }

    /// Limpia todo, detiene el audio y sale del canal de voz.
    pub async fn stop(&self) {
        self.shutdown(true).await;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    /// Como `stop`, pero la conexión de voz ya no existe.
    pub async fn discard(&self) {
        self.shutdown(false).await;
        info!("🔌 Sesión descartada en guild {}", self.guild_id);
    }

    async fn shutdown(&self, disconnect: bool) {
        let mut state = self.state.lock().await;
        self.closed.store(true, Ordering::SeqCst);

        state.queue.clear();
        state.in_flight = None;
        Self::cancel_idle_timer(&mut state);

        if let Err(e) = self.sink.stop_now().await {
            warn!("⚠️ Error deteniendo el sink: {}", e);
        }
        if disconnect {
            if let Err(e) = self.sink.disconnect().await {
                warn!("⚠️ Error desconectando: {}", e);
            }
        }

        self.persist(&state);
    }

    /// Ajusta el volumen (0-100). Se aplica en vivo si hay un track cargado y
    /// en cada track que arranque después.
    pub async fn set_volume(&self, percent: i64) -> Result<f32, ValidationError> {
        if !(0..=100).contains(&percent) {
            return Err(ValidationError::VolumeOutOfRange(percent));
        }
        let volume = percent as f32 / 100.0;

        let mut state = self.state.lock().await;
        state.volume = volume;
        if state.queue.current().is_some() {
            if let Err(e) = self.sink.set_volume(volume).await {
                warn!("⚠️ No se pudo aplicar el volumen en vivo: {}", e);
            }
        }

        info!("🔊 Volumen ajustado a {}%", percent);
        Ok(volume)
    }

    /// Sin modo, cicla off → track → queue → off.
    pub async fn set_loop_mode(&self, mode: Option<&str>) -> Result<LoopMode, ValidationError> {
        let requested = mode.map(str::parse::<LoopMode>).transpose()?;

        let mut state = self.state.lock().await;
        let mode = requested.unwrap_or_else(|| state.queue.loop_mode().next());
        state.queue.set_loop_mode(mode);
        Ok(mode)
    }

    pub async fn snapshot(&self) -> QueueInfo {
        let state = self.state.lock().await;
        state.queue.get_info(state.volume)
    }

    pub async fn now_playing(&self) -> Option<Track> {
        self.state.lock().await.queue.current().cloned()
    }

    /// Transición tras el fin de un track (natural o forzado).
    pub async fn on_finished(self: &Arc<Self>, play_id: PlayId) {
        let mut state = self.state.lock().await;
        if self.is_closed() || state.in_flight != Some(play_id) {
            debug!("🗑️ Fin de play {} ignorado (no está en curso)", play_id);
            return;
        }
        state.in_flight = None;

        let mut notices = Vec::new();
        // Cada track de la cola tiene como mucho una oportunidad
        let mut attempts = state.queue.len() + 1;

        loop {
            let (track, looping) = match state.queue.advance() {
                Transition::Replay(track) => (track, true),
                Transition::Advance(track) => (track, false),
                Transition::Drained => {
                    self.arm_idle_timer(&mut state);
                    break;
                }
            };

            match self.sink.play(&track, state.volume).await {
                Ok(id) => {
                    state.in_flight = Some(id);
                    let guild_id = self.guild_id;
                    notices.push(if looping {
                        SessionNotice::LoopingTrack { guild_id, track }
                    } else {
                        SessionNotice::NowPlaying { guild_id, track }
                    });
                    break;
                }
                Err(e) => {
                    error!("❌ Error al reproducir {}: {}", track.title, e);
                    state.queue.clear_current();
                    notices.push(SessionNotice::PlaybackFailed {
                        guild_id: self.guild_id,
                        track,
                        reason: e.to_string(),
                    });

                    attempts -= 1;
                    if attempts == 0 {
                        self.arm_idle_timer(&mut state);
                        break;
                    }
                }
            }
        }

        self.persist(&state);
        for notice in notices {
            self.notify(notice);
        }
    }

    fn arm_idle_timer(self: &Arc<Self>, state: &mut SessionState) {
        Self::cancel_idle_timer(state);

        let token = CancellationToken::new();
        let timer = token.clone();
        let weak: Weak<Self> = Arc::downgrade(self);
        let timeout = self.idle_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(session) = weak.upgrade() {
                        session.on_idle_timeout(&timer).await;
                    }
                }
            }
        });

        debug!("⏲️ Desconexión por inactividad en {:?}", timeout);
        state.idle_timer = Some(token);
    }

    fn cancel_idle_timer(state: &mut SessionState) {
        if let Some(token) = state.idle_timer.take() {
            token.cancel();
        }
    }

    async fn on_idle_timeout(&self, timer: &CancellationToken) {
        let mut state = self.state.lock().await;
        if timer.is_cancelled() || self.is_closed() || state.queue.current().is_some() {
            return;
        }

        info!("🚪 Desconectando por inactividad en guild {}", self.guild_id);
        self.closed.store(true, Ordering::SeqCst);
        state.idle_timer = None;
        state.queue.clear();

        if let Err(e) = self.sink.disconnect().await {
            warn!("⚠️ Error desconectando por inactividad: {}", e);
        }

        self.persist(&state);
        self.notify(SessionNotice::IdleDisconnected {
            guild_id: self.guild_id,
        });
    }

    /// Escritura de snapshot sin esperar al disco.
    fn persist(&self, state: &SessionState) {
        self.snapshots.submit(state.queue.snapshot());
    }

    fn notify(&self, notice: SessionNotice) {
        if self.notices.send(notice).is_err() {
            debug!("📭 Nadie escucha avisos de sesión");
        }
    }
}
