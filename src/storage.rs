use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{
    fs,
    sync::{mpsc, oneshot},
};
use tracing::{debug, info, warn};

use crate::sources::Track;

/// Copia durable de `(current, queue)` de una sesión.
///
/// Formato en disco:
/// `{"current_song": {title,url,duration,artist} | null, "queue": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub current_song: Option<Track>,
    pub queue: Vec<Track>,
}

impl QueueSnapshot {
    /// Registros en orden de reproducción: el actual primero.
    pub fn records(&self) -> impl Iterator<Item = &Track> {
        self.current_song.iter().chain(self.queue.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.current_song.is_none() && self.queue.is_empty()
    }
}

/// Un archivo de snapshot en disco.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Escribe el snapshot reemplazando el anterior de forma atómica
    /// (archivo temporal + rename, nunca se modifica en sitio).
    pub async fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Error escribiendo {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Error reemplazando {}", self.path.display()))?;

        Ok(())
    }

    /// Lee el snapshot. Un archivo ausente, vacío o corrupto equivale a un
    /// snapshot vacío: nunca bloquea el arranque.
    pub async fn load(&self) -> QueueSnapshot {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("📂 Sin snapshot en {}", self.path.display());
                return QueueSnapshot::default();
            }
            Err(e) => {
                warn!("⚠️ No se pudo leer {}: {}", self.path.display(), e);
                return QueueSnapshot::default();
            }
        };

        if content.trim().is_empty() {
            return QueueSnapshot::default();
        }

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("⚠️ Snapshot corrupto en {}, se ignora: {}", self.path.display(), e);
            QueueSnapshot::default()
        })
    }
}

enum WriterMessage {
    Write { version: u64, snapshot: QueueSnapshot },
    Flush(oneshot::Sender<()>),
}

/// Escritor único de snapshots para un archivo.
///
/// `submit` no espera al disco. Las escrituras se aplican en orden de versión
/// desde una sola tarea; si se acumulan varias, sólo se escribe la más nueva,
/// así una escritura vieja nunca pisa un estado posterior.
#[derive(Clone)]
pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<WriterMessage>,
    version: Arc<AtomicU64>,
}

impl SnapshotWriter {
    pub fn spawn(store: SnapshotStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, rx));

        Self {
            tx,
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Encola una escritura y devuelve su versión.
    pub fn submit(&self, snapshot: QueueSnapshot) -> u64 {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        if self.tx.send(WriterMessage::Write { version, snapshot }).is_err() {
            warn!("⚠️ Escritor de snapshots detenido, versión {} descartada", version);
        }
        version
    }

    /// Espera a que todo lo enviado antes de esta llamada esté en disco.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_writer(store: SnapshotStore, mut rx: mpsc::UnboundedReceiver<WriterMessage>) {
    let mut last_written = 0u64;

    while let Some(message) = rx.recv().await {
        let mut pending = None;
        let mut waiters = Vec::new();

        absorb(message, &mut pending, &mut waiters);
        while let Ok(message) = rx.try_recv() {
            absorb(message, &mut pending, &mut waiters);
        }

        if let Some((version, snapshot)) = pending {
            if version > last_written {
                match store.save(&snapshot).await {
                    Ok(()) => {
                        last_written = version;
                        debug!("💾 Snapshot v{} guardado en {}", version, store.path().display());
                    }
                    Err(e) => warn!("⚠️ Error guardando snapshot v{}: {:?}", version, e),
                }
            }
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

fn absorb(
    message: WriterMessage,
    pending: &mut Option<(u64, QueueSnapshot)>,
    waiters: &mut Vec<oneshot::Sender<()>>,
) {
    match message {
        WriterMessage::Write { version, snapshot } => {
            let newer = pending.as_ref().is_none_or(|(current, _)| version > *current);
            if newer {
                *pending = Some((version, snapshot));
            }
        }
        WriterMessage::Flush(waiter) => waiters.push(waiter),
    }
}

/// Directorio de datos del bot. Guarda un snapshot de cola por guild en
/// `<data_dir>/queues/guild_<id>.json`.
pub struct JsonStorage {
    data_dir: PathBuf,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(data_dir.join("queues")).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn queue_store(&self, guild_id: u64) -> SnapshotStore {
        SnapshotStore::new(
            self.data_dir
                .join("queues")
                .join(format!("guild_{}.json", guild_id)),
        )
    }

    /// Guilds con una cola guardada que no está vacía.
    pub async fn saved_guilds(&self) -> Result<Vec<u64>> {
        let mut files = fs::read_dir(self.data_dir.join("queues")).await?;
        let mut guilds = Vec::new();

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let Some(guild_id) = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };

            if !self.queue_store(guild_id).load().await.is_empty() {
                guilds.push(guild_id);
            }
        }

        guilds.sort_unstable();
        Ok(guilds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> QueueSnapshot {
        QueueSnapshot {
            current_song: Some(
                Track::new("Bohemian Rhapsody", "https://youtu.be/fJ9rUzIMcZQ")
                    .with_artist("Queen")
                    .with_duration(354),
            ),
            queue: vec![
                Track::new("Live stream", "https://youtu.be/live"),
                Track::new("Song 2", "https://youtu.be/SSbBvKaM6sk")
                    .with_artist("Blur")
                    .with_duration(122),
            ],
        }
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("q.json"));

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await, sample());

        // Sin archivo temporal residual
        assert!(!dir.path().join("q.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_uses_expected_field_names() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("q.json"));
        store.save(&sample()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["current_song"]["artist"], "Queen");
        assert_eq!(raw["current_song"]["duration"], 354);
        assert_eq!(raw["queue"][1]["url"], "https://youtu.be/SSbBvKaM6sk");

        store.save(&QueueSnapshot::default()).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw["current_song"].is_null());
    }

    #[tokio::test]
    async fn test_missing_empty_or_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();

        let missing = SnapshotStore::new(dir.path().join("missing.json"));
        assert_eq!(missing.load().await, QueueSnapshot::default());

        let empty_path = dir.path().join("empty.json");
        std::fs::write(&empty_path, "  \n").unwrap();
        assert_eq!(SnapshotStore::new(empty_path).load().await, QueueSnapshot::default());

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, r#"{"current_song": {"title": 3"#).unwrap();
        assert_eq!(SnapshotStore::new(corrupt_path).load().await, QueueSnapshot::default());
    }

    #[tokio::test]
    async fn test_writer_keeps_latest_state() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("q.json"));
        let writer = SnapshotWriter::spawn(store.clone());

        let mut expected = QueueSnapshot::default();
        for i in 0..50 {
            expected.queue.push(Track::new(format!("t{i}"), format!("https://x/{i}")));
            writer.submit(expected.clone());
        }
        writer.flush().await;

        assert_eq!(store.load().await, expected);
    }

    #[test]
    fn test_stale_version_is_not_absorbed() {
        let mut pending = Some((5, sample()));
        let mut waiters = Vec::new();
        absorb(
            WriterMessage::Write {
                version: 3,
                snapshot: QueueSnapshot::default(),
            },
            &mut pending,
            &mut waiters,
        );
        assert_eq!(pending, Some((5, sample())));
    }

    #[tokio::test]
    async fn test_saved_guilds_skips_empty_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        storage.queue_store(42).save(&sample()).await.unwrap();
        storage
            .queue_store(7)
            .save(&QueueSnapshot::default())
            .await
            .unwrap();
        std::fs::write(dir.path().join("queues").join("notes.txt"), "x").unwrap();

        assert_eq!(storage.saved_guilds().await.unwrap(), vec![42]);
    }
}
