//! Memoisation primitives for the incremental pipeline.
//!
//! Each pipeline stage owns a memo cell. A cell remembers the last input it saw and the output computed
//! for it; when the next pass presents an equal input the cached output is returned and the stage's work is
//! skipped. Inputs compare structurally (token-level syntax equality, [`Fingerprint`]s), so whitespace and
//! comment edits never invalidate a stage.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quote::ToTokens;

use crate::error::PipelineError;

/// Hash of a syntax tree's token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint the tokens of `node`; insensitive to whitespace and non-doc comments.
    pub fn of_tokens<T: ToTokens + ?Sized>(node: &T) -> Self {
        Self::of_str(&node.to_token_stream().to_string())
    }

    pub fn of_str(text: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Order-sensitive combination of several fingerprints.
    pub fn combine<I: IntoIterator<Item = Fingerprint>>(parts: I) -> Self {
        let mut hasher = DefaultHasher::new();
        for part in parts {
            part.0.hash(&mut hasher);
        }
        Self(hasher.finish())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Hit/miss counters of one memo cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub hits: u64,
    pub misses: u64,
}

/// Single-entry memo: recomputes only when the input differs from the previous one.
#[derive(Debug)]
pub struct Memo<I, O> {
    entry: Option<(I, O)>,
    stats: StageStats,
}

impl<I, O> Default for Memo<I, O> {
    fn default() -> Self {
        Self {
            entry: None,
            stats: StageStats::default(),
        }
    }
}

impl<I: PartialEq, O: Clone> Memo<I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached output for an equal input, otherwise compute, cache and return a new one.
    pub fn get_or_compute(&mut self, input: I, compute: impl FnOnce(&I) -> O) -> O {
        if let Some((cached, output)) = &self.entry {
            if *cached == input {
                self.stats.hits += 1;
                return output.clone();
            }
        }
        self.stats.misses += 1;
        let output = compute(&input);
        self.entry = Some((input, output.clone()));
        output
    }

    /// The most recently computed output.
    pub fn peek(&self) -> Option<&O> {
        self.entry.as_ref().map(|(_, output)| output)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }
}

/// One memo entry per key, e.g. per source unit.
#[derive(Debug)]
pub struct KeyedMemo<K, I, O> {
    entries: HashMap<K, (I, O)>,
    stats: StageStats,
}

impl<K, I, O> Default for KeyedMemo<K, I, O> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            stats: StageStats::default(),
        }
    }
}

impl<K: Eq + Hash + Clone, I: PartialEq, O: Clone> KeyedMemo<K, I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, key: &K, input: I, compute: impl FnOnce(&I) -> O) -> O {
        if let Some((cached, output)) = self.entries.get(key) {
            if *cached == input {
                self.stats.hits += 1;
                return output.clone();
            }
        }
        self.stats.misses += 1;
        let output = compute(&input);
        self.entries.insert(key.clone(), (input, output.clone()));
        output
    }

    /// Drop entries whose key is not in `live`.
    pub fn retain_keys(&mut self, live: &HashSet<K>) {
        self.entries.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }
}

/// Shared flag a host sets to abandon a running pass.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(PipelineError::Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
