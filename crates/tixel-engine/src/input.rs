//! Shared key-state table.
//!
//! An external listener (usually on its own thread) reports raw presses and
//! releases through [`KeyTable::press`] / [`KeyTable::release`]. The table
//! turns them into edges for bound keys, fires the bound callbacks, and keeps
//! the current pressed state. The simulation never reads the live table
//! during a step; it takes a [`KeySnapshot`] under the lock at the start of
//! each fixed step and each frame, so a step sees one consistent view.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

/// Callback fired on a press or release edge. Runs on the reporting thread.
pub type KeyCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Binding {
    pressed: bool,
    on_press: Option<KeyCallback>,
    on_release: Option<KeyCallback>,
}

#[derive(Default)]
struct KeyState {
    bindings: HashMap<String, Binding>,
}

/// Cloneable handle to the shared key table.
#[derive(Clone, Default)]
pub struct KeyTable {
    inner: Arc<RwLock<KeyState>>,
}

impl fmt::Debug for KeyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTable")
            .field("pressed", &self.pressed_keys())
            .finish()
    }
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking key callback never runs under the lock, so a poisoned lock
    // still holds consistent data.
    fn read(&self) -> RwLockReadGuard<'_, KeyState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, KeyState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Track `key`, optionally with edge callbacks. Rebinding resets state.
    pub fn bind(
        &self,
        key: &str,
        on_press: Option<KeyCallback>,
        on_release: Option<KeyCallback>,
    ) -> &Self {
        self.write().bindings.insert(
            key.to_owned(),
            Binding {
                pressed: false,
                on_press,
                on_release,
            },
        );
        debug!(key, "key bound");
        self
    }

    pub fn unbind(&self, key: &str) {
        self.write().bindings.remove(key);
    }

    pub fn clear(&self) {
        self.write().bindings.clear();
    }

    /// Report a raw key-down. Returns `true` if this was a press edge on a
    /// bound key. Unbound keys and repeats are ignored.
    pub fn press(&self, key: &str) -> bool {
        let callback = {
            let mut state = self.write();
            match state.bindings.get_mut(key) {
                Some(binding) if !binding.pressed => {
                    binding.pressed = true;
                    Some(binding.on_press.clone())
                }
                _ => None,
            }
        };
        match callback {
            Some(cb) => {
                trace!(key, "press edge");
                if let Some(cb) = cb {
                    cb();
                }
                true
            }
            None => false,
        }
    }

    /// Report a raw key-up. Returns `true` if this was a release edge.
    pub fn release(&self, key: &str) -> bool {
        let callback = {
            let mut state = self.write();
            match state.bindings.get_mut(key) {
                Some(binding) if binding.pressed => {
                    binding.pressed = false;
                    Some(binding.on_release.clone())
                }
                _ => None,
            }
        };
        match callback {
            Some(cb) => {
                trace!(key, "release edge");
                if let Some(cb) = cb {
                    cb();
                }
                true
            }
            None => false,
        }
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.read().bindings.get(key).is_some_and(|b| b.pressed)
    }

    pub fn pressed_keys(&self) -> Vec<String> {
        self.snapshot().pressed.into_iter().collect()
    }

    /// Copy the pressed set under a single read lock.
    pub fn snapshot(&self) -> KeySnapshot {
        let state = self.read();
        KeySnapshot {
            pressed: state
                .bindings
                .iter()
                .filter(|(_, b)| b.pressed)
                .map(|(k, _)| k.clone())
                .collect(),
        }
    }
}

/// Immutable view of which keys were down when it was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    pressed: BTreeSet<String>,
}

impl KeySnapshot {
    pub fn is_pressed(&self, key: &str) -> bool {
        self.pressed.contains(key)
    }

    /// Pressed keys in sorted order.
    pub fn pressed(&self) -> impl Iterator<Item = &str> {
        self.pressed.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.pressed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
