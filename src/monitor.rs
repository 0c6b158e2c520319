//! Pipeline event recording.
//!
//! A [`Monitor`] is created by the caller and handed to the code that reports
//! events; there is no process-wide instance. Events are kept in a bounded
//! buffer (oldest evicted first) until [`Monitor::flush`] or
//! [`Monitor::export_json`] drains them. Every event is also forwarded to the
//! `log` facade.

use std::{
    collections::{BTreeMap, VecDeque},
    io::Write,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{Level, debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EventLevel {
    fn log_level(self) -> Level {
        match self {
            EventLevel::Debug => Level::Debug,
            EventLevel::Info => Level::Info,
            EventLevel::Warn => Level::Warn,
            EventLevel::Error => Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub at: DateTime<Utc>,
    pub level: EventLevel,
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
struct Export<'a> {
    exported_at: DateTime<Utc>,
    dropped: u64,
    events: &'a [MonitorEvent],
}

#[derive(Debug)]
pub struct Monitor {
    capacity: usize,
    events: VecDeque<MonitorEvent>,
    dropped: u64,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MONITOR_CAPACITY)
    }
}

impl Monitor {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
            dropped: 0,
        }
    }

    pub fn record<I, K, V>(&mut self, level: EventLevel, kind: &str, message: String, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let fields = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value.to_string()))
            .collect::<BTreeMap<_, _>>();
        log::log!(target: "lead_ingest::monitor", level.log_level(), "[{kind}] {message}");
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(MonitorEvent {
            at: Utc::now(),
            level,
            kind: kind.to_string(),
            message,
            fields,
        });
    }

    pub fn info(&mut self, kind: &str, message: impl Into<String>) {
        self.record(EventLevel::Info, kind, message.into(), Vec::<(String, String)>::new());
    }

    pub fn warn(&mut self, kind: &str, message: impl Into<String>) {
        self.record(EventLevel::Warn, kind, message.into(), Vec::<(String, String)>::new());
    }

    pub fn error(&mut self, kind: &str, message: impl Into<String>) {
        self.record(EventLevel::Error, kind, message.into(), Vec::<(String, String)>::new());
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events evicted since the last flush.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn events(&self) -> impl Iterator<Item = &MonitorEvent> {
        self.events.iter()
    }

    /// Drains all buffered events and resets the eviction counter.
    pub fn flush(&mut self) -> Vec<MonitorEvent> {
        if self.dropped > 0 {
            warn!("Monitor evicted {} event(s) before flush", self.dropped);
        }
        self.dropped = 0;
        self.events.drain(..).collect()
    }

    /// Writes buffered events as a JSON document and drains the buffer.
    pub fn export_json<W: Write>(&mut self, writer: W) -> Result<usize> {
        let dropped = self.dropped;
        let events = self.flush();
        let export = Export {
            exported_at: Utc::now(),
            dropped,
            events: &events,
        };
        serde_json::to_writer_pretty(writer, &export).context("Writing monitor events")?;
        debug!("Exported {} monitor event(s)", events.len());
        info!(
            "Monitor export complete ({} event(s), {} dropped)",
            events.len(),
            dropped
        );
        Ok(events.len())
    }
}
