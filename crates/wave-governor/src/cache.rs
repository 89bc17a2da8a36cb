// crates/wave-governor/src/cache.rs
// ============================================================================
// Module: Context Governor
// Description: A per-session cache of named context entries bounded by an
//              estimated token budget, with pinning and strict LRU eviction.
// Purpose: Implement C4: bound the working-set size handed to a worker
//          invocation without losing story-declared "read these files
//          first" entries.
// Dependencies: wave-core (none directly; pure in-memory structure), thiserror
// ============================================================================

use std::collections::HashMap;

/// Estimated tokens per character, used to cost an entry's content without
/// invoking a tokenizer (§4.4: "≈1 token per 4 characters of content").
const CHARS_PER_TOKEN: usize = 4;

/// Estimates the token cost of `content`.
#[must_use]
pub fn estimate_tokens(content: &str) -> u64 {
    (content.len().div_ceil(CHARS_PER_TOKEN)) as u64
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    tokens: u64,
    pinned: bool,
    last_used: u64,
}

/// Error returned by a context governor operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernorError {
    /// Pinning this entry would exceed the cache's token cap.
    #[error("capacity exceeded: pinning {key} would require {needed} tokens, only {available} available")]
    CapacityExceeded {
        /// The key that could not be pinned.
        key: String,
        /// Tokens the pin would require.
        needed: u64,
        /// Tokens actually available (cap minus tokens already pinned).
        available: u64,
    },
    /// The requested key is not present in the cache.
    #[error("key {0} not found")]
    NotFound(String),
}

/// The default cap, in estimated tokens, for a session's context cache
/// (§4.4 default of 100,000 tokens).
pub const DEFAULT_CAP_TOKENS: u64 = 100_000;

/// A per-session LRU cache of named context entries with pinning.
///
/// # Invariants
/// - Total tokens resident never exceeds `cap_tokens` (§8 property 7).
/// - Pinned entries are never evicted by [`ContextGovernor::evict_to`].
#[derive(Debug, Clone)]
pub struct ContextGovernor {
    cap_tokens: u64,
    entries: HashMap<String, Entry>,
    clock: u64,
}

impl ContextGovernor {
    /// Builds an empty governor with the given token cap.
    #[must_use]
    pub fn new(cap_tokens: u64) -> Self {
        Self { cap_tokens, entries: HashMap::new(), clock: 0 }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Total estimated tokens currently resident.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.entries.values().map(|entry| entry.tokens).sum()
    }

    /// Inserts or overwrites an entry, evicting unpinned entries by LRU order
    /// until the new entry fits within the cap.
    ///
    /// # Errors
    /// Returns [`GovernorError::CapacityExceeded`] if the entry cannot fit
    /// even after evicting every unpinned entry.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), GovernorError> {
        let key = key.into();
        let value = value.into();
        let tokens = estimate_tokens(&value);

        let previous_tokens = self.entries.get(&key).map_or(0, |entry| entry.tokens);
        let budget_excluding_self = self.cap_tokens.saturating_sub(self.total_tokens().saturating_sub(previous_tokens));
        if tokens > budget_excluding_self {
            self.evict_to(self.cap_tokens.saturating_sub(tokens).min(self.cap_tokens));
        }

        let pinned_tokens: u64 = self.entries.values().filter(|entry| entry.pinned).map(|entry| entry.tokens).sum();
        let available = self.cap_tokens.saturating_sub(pinned_tokens);
        if tokens > available && !self.entries.get(&key).is_some_and(|entry| entry.pinned) {
            return Err(GovernorError::CapacityExceeded { key, needed: tokens, available });
        }

        let last_used = self.tick();
        let pinned = self.entries.get(&key).is_some_and(|entry| entry.pinned);
        self.entries.insert(key, Entry { value, tokens, pinned, last_used });
        Ok(())
    }

    /// Reads an entry, bumping its last-use timestamp.
    #[must_use]
    pub fn get(&mut self, key: &str) -> Option<&str> {
        let last_used = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_used = last_used;
        Some(entry.value.as_str())
    }

    /// Pins an entry so it is immune to eviction.
    ///
    /// # Errors
    /// Returns [`GovernorError::NotFound`] if `key` is not present, or
    /// [`GovernorError::CapacityExceeded`] if pinning it would make the
    /// cap impossible to satisfy given every other currently pinned entry.
    pub fn pin(&mut self, key: &str) -> Result<(), GovernorError> {
        let tokens = self.entries.get(key).ok_or_else(|| GovernorError::NotFound(key.to_string()))?.tokens;
        let pinned_tokens: u64 = self.entries.values().filter(|entry| entry.pinned).map(|entry| entry.tokens).sum();
        if pinned_tokens + tokens > self.cap_tokens {
            return Err(GovernorError::CapacityExceeded {
                key: key.to_string(),
                needed: tokens,
                available: self.cap_tokens.saturating_sub(pinned_tokens),
            });
        }
        if let Some(entry) = self.entries.get_mut(key) {
            entry.pinned = true;
        }
        Ok(())
    }

    /// Unpins an entry, making it eligible for LRU eviction again.
    pub fn unpin(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.pinned = false;
        }
    }

    /// Returns every key whose name contains `pattern`, as a lazy iterator
    /// over `(key, value)` pairs.
    pub fn retrieve<'a>(&'a self, pattern: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.contains(pattern))
            .map(|(key, entry)| (key.as_str(), entry.value.as_str()))
    }

    /// The set of keys currently pinned.
    #[must_use]
    pub fn pinned_keys(&self) -> Vec<String> {
        self.entries.iter().filter(|(_, entry)| entry.pinned).map(|(key, _)| key.clone()).collect()
    }

    /// Evicts unpinned entries in strict LRU order until total resident
    /// tokens is at or below `limit`.
    pub fn evict_to(&mut self, limit: u64) {
        while self.total_tokens() > limit {
            let victim = self
                .entries
                .iter()
                .filter(|(_, entry)| !entry.pinned)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn get_bumps_recency_so_it_survives_eviction() {
        let mut governor = ContextGovernor::new(8);
        governor.put("a", "aaaa").expect("fits");
        governor.put("b", "bbbb").expect("fits");
        governor.get("a");
        governor.put("c", "cccc").expect("evicts lru");
        assert!(governor.get("a").is_some());
        assert!(governor.get("b").is_none());
    }

    #[test]
    fn pinned_entries_survive_eviction() {
        let mut governor = ContextGovernor::new(8);
        governor.put("a", "aaaa").expect("fits");
        governor.pin("a").expect("fits pin budget");
        governor.put("b", "bbbb").expect("fits");
        governor.put("c", "cccc").expect("evicts b, not a");
        assert!(governor.get("a").is_some());
        assert!(governor.get("b").is_none());
    }

    #[test]
    fn pinning_beyond_cap_fails() {
        let mut governor = ContextGovernor::new(4);
        governor.put("a", "aaaaaaaaaaaaaaaa").expect("16 chars = 4 tokens, fits exactly");
        governor.pin("a").expect("consumes the entire cap");
        governor.put("b", "bbbb").expect_err("no budget left alongside pinned a");
    }

    #[test]
    fn total_tokens_never_exceeds_cap() {
        let mut governor = ContextGovernor::new(10);
        for i in 0..20 {
            let _ = governor.put(format!("key-{i}"), "0123456789");
        }
        assert!(governor.total_tokens() <= 10);
    }
}
