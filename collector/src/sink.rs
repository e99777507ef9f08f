use std::sync::Mutex;
use tracing::{info, warn};

/// Destino de los mensajes que emite el collector (envío de job, modo degradado).
/// Se inyecta para no depender de loggers globales.
pub trait EventSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Sink por defecto: reenvía a `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn info(&self, message: &str) {
        info!(target: "collector", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "collector", "{}", message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
}

/// Sink que guarda los mensajes en memoria (útil en tests del host).
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(EventLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(EventLevel, String)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.filtered(EventLevel::Info)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.filtered(EventLevel::Warn)
    }

    fn filtered(&self, level: EventLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    fn push(&self, level: EventLevel, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((level, message.to_string()));
        }
    }
}

impl EventSink for MemorySink {
    fn info(&self, message: &str) {
        self.push(EventLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(EventLevel::Warn, message);
    }
}
