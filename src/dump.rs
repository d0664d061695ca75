//! Human and JSON rendering of a captured stream
//!
//! Used by the `ucdbg dump` command. This is a viewer for the raw records,
//! not an analyzer: it does not pair events or interpret lock order.

use crate::event::{Event, EventKind, Payload};
use crate::reader::ReaderStats;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// One-line text rendering of an event
pub fn format_text(event: &Event) -> String {
    match event.payload {
        Payload::Concurrency { kind, lock_id } => format!(
            "{:>20} tid={:<8} {:<12} lock=0x{:016x}",
            event.timestamp_ns,
            event.thread_id,
            kind.name(),
            lock_id
        ),
        Payload::Log { level, message_id } => format!(
            "{:>20} tid={:<8} {:<12} msg=#{}",
            event.timestamp_ns,
            event.thread_id,
            level.name(),
            message_id
        ),
    }
}

/// Write events one per line, as text or JSON lines
pub fn write_events<W: Write>(out: &mut W, events: &[Event], json: bool) -> io::Result<()> {
    for event in events {
        if json {
            serde_json::to_writer(&mut *out, event)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", format_text(event))?;
        }
    }
    Ok(())
}

/// Per-type record counts for a stream
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub by_type: BTreeMap<String, u64>,
    pub concurrency: u64,
    pub log: u64,
    pub threads: usize,
    pub locks: usize,
}

impl Summary {
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = Summary::default();
        let mut threads = std::collections::HashSet::new();
        let mut locks = std::collections::HashSet::new();

        for event in events {
            threads.insert(event.thread_id);
            let name = match event.payload {
                Payload::Concurrency { kind, lock_id } => {
                    if lock_id != 0 {
                        locks.insert(lock_id);
                    }
                    kind.name()
                }
                Payload::Log { level, .. } => level.name(),
            };
            match event.kind() {
                EventKind::Concurrency => summary.concurrency += 1,
                EventKind::Log => summary.log += 1,
            }
            *summary.by_type.entry(name.to_string()).or_default() += 1;
        }

        summary.threads = threads.len();
        summary.locks = locks.len();
        summary
    }

    pub fn write<W: Write>(&self, out: &mut W, stats: &ReaderStats) -> io::Result<()> {
        writeln!(out, "records:      {}", stats.records)?;
        writeln!(out, "skipped:      {}", stats.skipped)?;
        if stats.trailing_bytes > 0 {
            writeln!(out, "trailing:     {} bytes", stats.trailing_bytes)?;
        }
        writeln!(out, "concurrency:  {}", self.concurrency)?;
        writeln!(out, "log:          {}", self.log)?;
        writeln!(out, "threads:      {}", self.threads)?;
        writeln!(out, "locks:        {}", self.locks)?;
        for (name, count) in &self.by_type {
            writeln!(out, "  {name:<12} {count}")?;
        }
        Ok(())
    }
}
