//! Reading a captured record stream
//!
//! The consumer half of the wire contract. Records are read in 32-byte
//! chunks; a record this reader cannot interpret (newer format version,
//! unknown kind) is counted and skipped, never treated as the end of the
//! stream. A partial record at end of input is reported in
//! [`ReaderStats::trailing_bytes`].

use crate::error::{Result, TraceError};
use crate::event::{deserialize, peek_version, Event, EVENT_SIZE, MAX_SUPPORTED_VERSION};
use std::io::{ErrorKind, Read};

/// Counters collected while reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Records decoded and returned
    pub records: u64,
    /// Records skipped as unparseable
    pub skipped: u64,
    /// Bytes left over after the last full record
    pub trailing_bytes: usize,
}

/// Iterator over the events in a record stream
pub struct EventReader<R> {
    inner: R,
    stats: ReaderStats,
    done: bool,
}

impl<R: Read> EventReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            stats: ReaderStats::default(),
            done: false,
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Fill `buf` as far as possible; returns bytes read (< 32 only at EOF)
    fn fill(&mut self, buf: &mut [u8; EVENT_SIZE]) -> Result<usize> {
        let mut filled = 0;
        while filled < EVENT_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Next decodable event, skipping records this reader cannot parse
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        let mut buf = [0u8; EVENT_SIZE];
        while !self.done {
            let filled = self.fill(&mut buf)?;
            if filled < EVENT_SIZE {
                self.done = true;
                self.stats.trailing_bytes = filled;
                if filled > 0 {
                    tracing::debug!(filled, "partial record at end of stream");
                }
                break;
            }

            if let Some(version) = peek_version(&buf) {
                if version > MAX_SUPPORTED_VERSION {
                    self.skip(&TraceError::UnsupportedFormatVersion {
                        found: version,
                        max: MAX_SUPPORTED_VERSION,
                    });
                    continue;
                }
            }

            match deserialize(&buf) {
                Ok(event) => {
                    self.stats.records += 1;
                    return Ok(Some(event));
                }
                Err(e) if e.is_skippable() => self.skip(&e),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn skip(&mut self, reason: &TraceError) {
        self.stats.skipped += 1;
        tracing::debug!(%reason, skipped = self.stats.skipped, "skipping record");
    }

    /// Read every remaining event
    pub fn read_all(&mut self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event()? {
            events.push(event);
        }
        Ok(events)
    }
}

impl<R: Read> Iterator for EventReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// Decode every readable record in an in-memory stream
pub fn read_events(bytes: &[u8]) -> Result<(Vec<Event>, ReaderStats)> {
    let mut reader = EventReader::new(bytes);
    let events = reader.read_all()?;
    Ok((events, reader.stats()))
}
