use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use tracing::info;

use crate::{error::ValidationError, sources::Track, storage::QueueSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Orden de ciclo cuando el usuario no indica modo: off → track → queue → off.
    pub fn next(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::Queue => "queue",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "track" => Ok(LoopMode::Track),
            "queue" => Ok(LoopMode::Queue),
            _ => Err(ValidationError::InvalidLoopMode(s.to_string())),
        }
    }
}

/// Resultado de avanzar la cola cuando termina un track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Loop de track: se vuelve a reproducir el actual.
    Replay(Track),
    /// Se promovió la cabeza de la cola a track actual.
    Advance(Track),
    /// No queda nada; `current` pasa a `None`.
    Drained,
}

/// Estado puro de la cola: track actual, pendientes (FIFO) y modo de loop.
///
/// No sabe nada del sink ni de la persistencia; [`PlaybackSession`] es quien
/// lo protege y decide cuándo avanzar.
///
/// [`PlaybackSession`]: super::session::PlaybackSession
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn items(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.current.is_none()
    }

    /// Carga un track como actual. Sólo se usa cuando el sink está libre.
    pub fn start(&mut self, track: Track) {
        self.current = Some(track);
    }

    /// Agrega al final de la cola y devuelve su posición (1 = siguiente).
    pub fn push(&mut self, track: Track) -> usize {
        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
        self.items.len()
    }

    /// Elige qué suena después de que termine el actual.
    ///
    /// Con loop de track se repite el actual sin tocar la cola. Si no, se
    /// promueve la cabeza de la cola; con loop de cola el track promovido se
    /// vuelve a encolar al final. Sin nada pendiente, `current` queda vacío.
    pub fn advance(&mut self) -> Transition {
        if self.loop_mode == LoopMode::Track {
            if let Some(current) = &self.current {
                info!("🔂 Repitiendo track: {}", current.title);
                return Transition::Replay(current.clone());
            }
        }

        match self.items.pop_front() {
            Some(next) => {
                info!("➡️ Siguiente en cola: {}", next.title);
                if self.loop_mode == LoopMode::Queue {
                    self.items.push_back(next.clone());
                }
                self.current = Some(next.clone());
                Transition::Advance(next)
            }
            None => {
                info!("📭 Cola vacía, no hay siguiente track");
                self.current = None;
                Transition::Drained
            }
        }
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current = None;
        info!("🗑️ Cola limpiada");
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::Track => info!("🔂 Repetir canción activado"),
            LoopMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current_song: self.current.clone(),
            queue: self.items.iter().cloned().collect(),
        }
    }

    pub fn get_info(&self, volume: f32) -> QueueInfo {
        QueueInfo {
            current: self.current.clone(),
            items: self.items.iter().cloned().collect(),
            total_items: self.items.len(),
            loop_mode: self.loop_mode,
            volume,
            total_duration: self.calculate_total_duration(),
        }
    }

    fn calculate_total_duration(&self) -> Duration {
        self.current
            .iter()
            .chain(self.items.iter())
            .filter_map(Track::duration)
            .sum()
    }
}

/// Vista de sólo lectura para `/queue` y `/nowplaying`.
#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub total_items: usize,
    pub loop_mode: LoopMode,
    pub volume: f32,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página de la cola (las páginas empiezan en 1)
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.total_items.div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());

        QueuePage {
            items: self.items.get(start..end).map(<[Track]>::to_vec).unwrap_or_default(),
            first_position: start + 1,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
