use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The key a lookup should use, together with its position in the pool.
/// The index is what the caller hands back to [`KeyRotator::advance_if_current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveKey<'a> {
    pub index: usize,
    pub key: &'a str,
}

/// Shared, lock-free cursor over a fixed pool of API keys
///
/// The cursor only ever moves forward. Once it passes the last key the pool
/// is exhausted for the rest of the run.
#[derive(Debug)]
pub struct KeyRotator {
    keys: Vec<String>,
    current: AtomicUsize,
}

impl KeyRotator {
    /// Create a rotator over the given keys. Blank entries are dropped.
    pub fn new<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(Into::into)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keys.is_empty() {
            anyhow::bail!("No API keys configured. Pass at least one with --key or --key-file.");
        }

        Ok(Self {
            keys,
            current: AtomicUsize::new(0),
        })
    }

    /// Key currently in use, or None once every key has been used up
    pub fn current_key(&self) -> Option<ActiveKey<'_>> {
        let index = self.current.load(Ordering::Acquire);
        self.keys.get(index).map(|key| ActiveKey {
            index,
            key: key.as_str(),
        })
    }

    /// Move to the next key, but only if nobody has moved past `observed_index` yet.
    /// Returns true when this call performed the switch.
    pub fn advance_if_current(&self, observed_index: usize) -> bool {
        if observed_index >= self.keys.len() {
            return false;
        }
        self.current
            .compare_exchange(
                observed_index,
                observed_index + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current.load(Ordering::Acquire) >= self.keys.len()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
