//! Message interning for log events
//!
//! Log records carry a 32-bit string id instead of the text so they fit the
//! fixed record size. Ids are dense and start at 1; id 0 means "no message".
//! Interning takes a mutex, so hot loops should intern once and reuse the id
//! with [`crate::event_factory::make_log_event`].

use fnv::FnvHashMap;
use std::sync::Mutex;

/// Id reserved for "no message"
pub const NO_MESSAGE: u32 = 0;

#[derive(Default)]
struct Table {
    ids: FnvHashMap<String, u32>,
    strings: Vec<String>,
}

/// Process-local string interner
#[derive(Default)]
pub struct StringTable {
    inner: Mutex<Table>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `text`, assigning a new one on first sight
    pub fn intern(&self, text: &str) -> u32 {
        let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(&id) = table.ids.get(text) {
            return id;
        }

        let id = u32::try_from(table.strings.len() + 1).unwrap_or(NO_MESSAGE);
        if id == NO_MESSAGE {
            tracing::warn!("string table exhausted, logging without message");
            return NO_MESSAGE;
        }
        table.strings.push(text.to_owned());
        table.ids.insert(text.to_owned(), id);
        id
    }

    /// Text for a previously interned id
    pub fn resolve(&self, id: u32) -> Option<String> {
        if id == NO_MESSAGE {
            return None;
        }
        let table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        table.strings.get(id as usize - 1).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .strings
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All interned strings in id order (id = index + 1)
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .strings
            .clone()
    }
}
