//! Feature registries: ordered, versioned catalogs of tools, prompts,
//! resources, templates, and roots.
//!
//! Entries are keyed by identity (name, or URI for resources). Adding an
//! entry with an existing identity replaces it; removals of unknown
//! identities are silent. Listing is deterministic (identity order) and
//! paginated through opaque cursors. Every effective mutation bumps a
//! version counter and marks the registry dirty so the owner can schedule a
//! single debounced list-changed notification per window.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{SessionError, SessionResult};
use duplexmcp_protocol::ProtocolError;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// An ordered, versioned catalog of feature entries.
pub struct FeatureRegistry<E> {
    entries: RwLock<BTreeMap<String, E>>,
    version: AtomicU64,
    dirty: AtomicBool,
}

impl<E: Clone> Default for FeatureRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> FeatureRegistry<E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Insert or replace the entry with the given identity.
    ///
    /// Returns true, and marks the registry dirty, on every add (a replace is
    /// still a mutation the peer should hear about).
    pub fn add(&self, identity: impl Into<String>, entry: E) -> bool {
        self.entries.write().insert(identity.into(), entry);
        self.version.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(true, Ordering::SeqCst);
        true
    }

    /// Remove entries by identity; unknown identities are ignored.
    ///
    /// Returns true, and marks the registry dirty, only when at least one
    /// entry was actually removed.
    pub fn remove<I, S>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.entries.write();
        let mut removed = false;
        for identity in identities {
            removed |= entries.remove(identity.as_ref()).is_some();
        }
        drop(entries);
        if removed {
            self.version.fetch_add(1, Ordering::SeqCst);
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    /// Look up an entry by identity.
    pub fn get(&self, identity: &str) -> Option<E> {
        self.entries.read().get(identity).cloned()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Monotonic mutation counter.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Clear the dirty flag, returning whether it was set.
    ///
    /// The owner calls this when it fires the debounced list-changed
    /// notification; a false return means no mutation happened this window.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    /// Whether the registry mutated since the last notification.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// List one page of entries in identity order.
    ///
    /// `cursor` is an opaque token from a previous page; `None` starts from
    /// the beginning. Returns the page and the cursor for the next one
    /// (`None` when exhausted).
    pub fn list(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> SessionResult<(Vec<E>, Option<String>)> {
        let after = cursor.map(decode_cursor).transpose()?;
        let entries = self.entries.read();
        let page: Vec<(&String, &E)> = match &after {
            Some(last) => entries
                .range::<String, _>((
                    std::ops::Bound::Excluded(last.clone()),
                    std::ops::Bound::Unbounded,
                ))
                .take(page_size)
                .collect(),
            None => entries.iter().take(page_size).collect(),
        };
        let next_cursor = if page.len() == page_size {
            let last_key = page.last().map(|(k, _)| (*k).clone());
            // Only hand out a cursor when more entries actually follow.
            last_key.filter(|k| entries.range::<String, _>((
                std::ops::Bound::Excluded(k.clone()),
                std::ops::Bound::Unbounded,
            )).next().is_some())
            .map(|k| encode_cursor(&k))
        } else {
            None
        };
        Ok((page.into_iter().map(|(_, e)| e.clone()).collect(), next_cursor))
    }
}

fn encode_cursor(identity: &str) -> String {
    URL_SAFE_NO_PAD.encode(identity.as_bytes())
}

fn decode_cursor(cursor: &str) -> SessionResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.as_bytes())
        .map_err(|_| SessionError::Protocol(ProtocolError::InvalidParams("invalid cursor".into())))?;
    String::from_utf8(bytes)
        .map_err(|_| SessionError::Protocol(ProtocolError::InvalidParams("invalid cursor".into())))
}
