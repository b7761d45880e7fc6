use dashmap::{mapref::entry::Entry, DashMap, DashSet};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    session::{PlaybackSession, SessionNotice, SessionSettings},
    sink::{Finished, VoiceSink},
};
use crate::{
    sources::{Track, TrackResolver},
    storage::{JsonStorage, QueueSnapshot, SnapshotWriter},
};

/// Dueño de las sesiones de reproducción, una por guild.
///
/// Crea la sesión en la primera conexión de voz, restaura su cola guardada
/// y la descarta al detenerse o desconectarse.
pub struct AudioPlayer {
    sessions: DashMap<GuildId, Arc<PlaybackSession>>,
    // Un escritor por archivo durante toda la vida del proceso, así una sesión
    // nueva nunca compite con las escrituras pendientes de la anterior
    writers: DashMap<GuildId, SnapshotWriter>,
    // La cola guardada se lee una sola vez por proceso; después el estado en
    // memoria manda
    restored: DashSet<GuildId>,
    storage: Arc<JsonStorage>,
    resolver: Arc<dyn TrackResolver>,
    settings: SessionSettings,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl AudioPlayer {
    pub fn new(
        storage: Arc<JsonStorage>,
        resolver: Arc<dyn TrackResolver>,
        settings: SessionSettings,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            writers: DashMap::new(),
            restored: DashSet::new(),
            storage,
            resolver,
            settings,
            notices,
        }
    }

    pub fn resolver(&self) -> Arc<dyn TrackResolver> {
        self.resolver.clone()
    }

    /// Sesión activa de la guild, si existe.
    pub fn session(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions
            .get(&guild_id)
            .map(|s| s.clone())
            .filter(|s| !s.is_closed())
    }

    /// Devuelve la sesión activa o crea una nueva con el sink que construye
    /// `build_sink`. Una sesión nueva restaura primero la cola guardada.
    pub async fn attach<F>(&self, guild_id: GuildId, build_sink: F) -> Arc<PlaybackSession>
    where
        F: FnOnce(mpsc::UnboundedSender<Finished>) -> Arc<dyn VoiceSink>,
    {
        let session = match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_closed() => return entry.get().clone(),
            entry => {
                let session = self.create_session(guild_id, build_sink);
                match entry {
                    Entry::Occupied(mut occupied) => {
                        occupied.insert(session.clone());
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(session.clone());
                    }
                }
                session
            }
        };

        self.restore(&session).await;
        session
    }

    fn create_session<F>(&self, guild_id: GuildId, build_sink: F) -> Arc<PlaybackSession>
    where
        F: FnOnce(mpsc::UnboundedSender<Finished>) -> Arc<dyn VoiceSink>,
    {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let sink = build_sink(finished_tx);
        let writer = self.writer(guild_id);

        info!("🎛️ Nueva sesión de reproducción en guild {}", guild_id);
        PlaybackSession::start(
            guild_id,
            sink,
            finished_rx,
            writer,
            self.notices.clone(),
            self.settings,
        )
    }

    fn writer(&self, guild_id: GuildId) -> SnapshotWriter {
        self.writers
            .entry(guild_id)
            .or_insert_with(|| SnapshotWriter::spawn(self.storage.queue_store(guild_id.get())))
            .clone()
    }

    /// Vuelve a resolver la cola guardada y la carga en la sesión.
    async fn restore(&self, session: &Arc<PlaybackSession>) {
        let guild_id = session.guild_id();
        if !self.restored.insert(guild_id) {
            return;
        }

        // Lo pendiente de este escritor debe estar en disco antes de leer
        self.writer(guild_id).flush().await;
        let snapshot = self.storage.queue_store(guild_id.get()).load().await;
        if snapshot.is_empty() {
            return;
        }

        info!("♻️ Restaurando cola guardada de guild {}", guild_id);
        let tracks = restore_tracks(self.resolver.as_ref(), &snapshot).await;

        let restored = session
            .enqueue_many(tracks)
            .await
            .into_iter()
            .filter(|r| match r {
                Ok(_) => true,
                Err(e) => {
                    warn!("⚠️ Track restaurado no se pudo encolar: {}", e);
                    false
                }
            })
            .count();

        info!(
            "♻️ Restaurados {}/{} tracks en guild {}",
            restored,
            snapshot.records().count(),
            guild_id
        );
    }

    /// `/stop`: limpia y desconecta.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        match self.sessions.remove(&guild_id) {
            Some((_, session)) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    /// El bot fue desconectado del canal por fuera de los comandos.
    pub async fn discard(&self, guild_id: GuildId) {
        if let Some((_, session)) = self.sessions.remove(&guild_id) {
            if !session.is_closed() {
                session.discard().await;
            }
        }
    }

    /// Espera a que todas las colas pendientes queden escritas en disco.
    pub async fn flush_all(&self) {
        let writers: Vec<SnapshotWriter> = self.writers.iter().map(|w| w.value().clone()).collect();
        for writer in &writers {
            writer.flush().await;
        }
        debug!("💾 {} escritores de cola vaciados", writers.len());
    }

    /// Olvida una sesión que ya se cerró sola (desconexión por inactividad).
    pub fn release(&self, guild_id: GuildId) {
        if self
            .sessions
            .remove_if(&guild_id, |_, session| session.is_closed())
            .is_some()
        {
            debug!("🧹 Sesión cerrada liberada en guild {}", guild_id);
        }
    }
}

/// Re-resuelve cada registro guardado (el actual primero). Los que fallan se
/// descartan sin abortar el resto.
pub async fn restore_tracks(resolver: &dyn TrackResolver, snapshot: &QueueSnapshot) -> Vec<Track> {
    let mut tracks = Vec::new();
    for record in snapshot.records() {
        match resolver.resolve(&record.url).await {
            Ok(track) => tracks.push(track),
            Err(e) => debug!("🗑️ Registro {} descartado al restaurar: {}", record.url, e),
        }
    }
    tracks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::session::{
            tests::{track, FakeSink},
            EnqueueOutcome,
        },
        error::ResolveError,
        sources::MockTrackResolver,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings() -> SessionSettings {
        SessionSettings {
            default_volume: 0.5,
            idle_timeout: Duration::from_secs(180),
        }
    }

    fn echo_resolver(fail_url: Option<String>) -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(move |url| {
            if fail_url.as_deref() == Some(url) {
                Err(ResolveError::Unavailable("privado".into()))
            } else {
                let name = url.rsplit('/').next().unwrap_or(url);
                Ok(track(name))
            }
        });
        resolver
    }

    #[tokio::test]
    async fn test_restore_drops_unresolvable_records() {
        let snapshot = QueueSnapshot {
            current_song: Some(track("A")),
            queue: vec![track("B"), track("C")],
        };
        let resolver = echo_resolver(Some(track("B").url));

        let tracks = restore_tracks(&resolver, &snapshot).await;

        assert_eq!(tracks, vec![track("A"), track("C")]);
    }

    #[tokio::test]
    async fn test_attach_restores_saved_queue_once() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        storage
            .queue_store(9)
            .save(&QueueSnapshot {
                current_song: Some(track("A")),
                queue: vec![track("B")],
            })
            .await
            .unwrap();

        let (notice_tx, _notices) = mpsc::unbounded_channel();
        let player = AudioPlayer::new(storage, Arc::new(echo_resolver(None)), settings(), notice_tx);
        let guild_id = GuildId::new(9);

        let mut sink = None;
        let session = player
            .attach(guild_id, |tx| {
                let fake = FakeSink::new(tx);
                sink = Some(fake.clone());
                fake as Arc<dyn VoiceSink>
            })
            .await;
        let sink = sink.unwrap();

        assert_eq!(sink.played(), vec!["A"]);
        let info = session.snapshot().await;
        assert_eq!(info.current, Some(track("A")));
        assert_eq!(info.items, vec![track("B")]);

        // Segunda conexión: misma sesión, sin restaurar de nuevo
        let again = player
            .attach(guild_id, |_| panic!("no debe crear otro sink"))
            .await;
        assert!(Arc::ptr_eq(&session, &again));
        assert_eq!(
            again.enqueue(track("C")).await,
            Ok(EnqueueOutcome::Queued { position: 2 })
        );
    }

    #[tokio::test]
    async fn test_stop_removes_session() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let (notice_tx, _notices) = mpsc::unbounded_channel();
        let player = AudioPlayer::new(storage, Arc::new(echo_resolver(None)), settings(), notice_tx);
        let guild_id = GuildId::new(3);

        let session = player
            .attach(guild_id, |tx| FakeSink::new(tx) as Arc<dyn VoiceSink>)
            .await;
        session.enqueue(track("A")).await.unwrap();

        assert!(player.stop(guild_id).await);
        assert!(player.session(guild_id).is_none());
        assert!(!player.stop(guild_id).await);
    }

    #[tokio::test]
    async fn test_stopped_queue_is_not_restored_on_reconnect() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let (notice_tx, _notices) = mpsc::unbounded_channel();
        let player = AudioPlayer::new(
            storage.clone(),
            Arc::new(echo_resolver(None)),
            settings(),
            notice_tx,
        );
        let guild_id = GuildId::new(5);

        for _ in 0..10 {
            let session = player
                .attach(guild_id, |tx| FakeSink::new(tx) as Arc<dyn VoiceSink>)
                .await;
            session.enqueue(track("A")).await.unwrap();
            session.enqueue(track("B")).await.unwrap();

            assert!(player.stop(guild_id).await);
            let fresh = player
                .attach(guild_id, |tx| FakeSink::new(tx) as Arc<dyn VoiceSink>)
                .await;

            assert_eq!(fresh.now_playing().await, None);
            assert!(fresh.snapshot().await.items.is_empty());
            assert!(player.stop(guild_id).await);
        }

        player.flush_all().await;
        assert!(storage.queue_store(5).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_write_lands_before_first_restore() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        storage
            .queue_store(6)
            .save(&QueueSnapshot {
                current_song: Some(track("Old")),
                queue: vec![],
            })
            .await
            .unwrap();

        let (notice_tx, _notices) = mpsc::unbounded_channel();
        let player = AudioPlayer::new(storage, Arc::new(echo_resolver(None)), settings(), notice_tx);
        let guild_id = GuildId::new(6);

        // Escritura encolada que todavía no llegó al disco
        player.writer(guild_id).submit(QueueSnapshot {
            current_song: Some(track("New")),
            queue: vec![],
        });
        let session = player
            .attach(guild_id, |tx| FakeSink::new(tx) as Arc<dyn VoiceSink>)
            .await;

        assert_eq!(session.now_playing().await, Some(track("New")));
    }

    #[tokio::test]
    async fn test_release_only_drops_closed_sessions() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let (notice_tx, _notices) = mpsc::unbounded_channel();
        let player = AudioPlayer::new(storage, Arc::new(echo_resolver(None)), settings(), notice_tx);
        let guild_id = GuildId::new(4);

        let session = player
            .attach(guild_id, |tx| FakeSink::new(tx) as Arc<dyn VoiceSink>)
            .await;
        player.release(guild_id);
        assert!(player.session(guild_id).is_some());

        session.discard().await;
        player.release(guild_id);
        assert!(player.sessions.get(&guild_id).is_none());

        // Una conexión nueva crea otra sesión
        let fresh = player
            .attach(guild_id, |tx| FakeSink::new(tx) as Arc<dyn VoiceSink>)
            .await;
        assert!(!Arc::ptr_eq(&session, &fresh));
    }
}
