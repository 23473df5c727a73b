//! Per-type instance pools.
//!
//! Every concrete preset type owns a pool that builds instances through the
//! type's factory in fixed batches and recycles them when callers are done.
//! Instances are handed out as [`PooledPreset`] guards; dropping the guard
//! resets the instance and returns it to the free list.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::descriptor::PresetFactory;
use crate::preset::Preset;

/// Counters describing a pool's lifetime activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances constructed so far.
    pub built: usize,
    /// Instances currently held by callers.
    pub in_use: usize,
    /// Instances waiting on the free list.
    pub free: usize,
    /// Times the pool ran dry and built a fresh batch.
    pub refills: usize,
}

struct PoolState {
    free: Vec<Box<dyn Preset>>,
    built: usize,
    in_use: usize,
    refills: usize,
}

struct PoolShared {
    type_name: String,
    factory: PresetFactory,
    refill_batch: usize,
    state: Mutex<PoolState>,
}

/// Recycling pool for one concrete preset type.
pub struct InstancePool {
    shared: Arc<PoolShared>,
}

impl InstancePool {
    pub(crate) fn new(type_name: &str, factory: PresetFactory, refill_batch: usize) -> Self {
        InstancePool {
            shared: Arc::new(PoolShared {
                type_name: type_name.to_string(),
                factory,
                refill_batch: refill_batch.max(1),
                state: Mutex::new(PoolState {
                    free: Vec::new(),
                    built: 0,
                    in_use: 0,
                    refills: 0,
                }),
            }),
        }
    }

    /// Takes an instance out of the pool, building a fresh batch if it is dry.
    pub fn acquire(&self) -> PooledPreset {
        let mut state = self.shared.state.lock().expect("preset pool lock poisoned");
        if state.free.is_empty() {
            for _ in 0..self.shared.refill_batch {
                state.free.push((self.shared.factory)());
            }
            state.built += self.shared.refill_batch;
            state.refills += 1;
            debug!(
                type_name = %self.shared.type_name,
                batch = self.shared.refill_batch,
                "refilled preset pool"
            );
        }
        let inst = state.free.pop().expect("refilled pool cannot be empty");
        state.in_use += 1;
        PooledPreset {
            inst: Some(inst),
            pool: Arc::clone(&self.shared),
        }
    }

    /// Current pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().expect("preset pool lock poisoned");
        PoolStats {
            built: state.built,
            in_use: state.in_use,
            free: state.free.len(),
            refills: state.refills,
        }
    }
}

impl fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("InstancePool")
            .field("type_name", &self.shared.type_name)
            .field("stats", &stats)
            .finish()
    }
}

/// Owning guard around a pooled preset instance.
///
/// Dereferences to [`dyn Preset`](Preset). On drop the instance is reset to
/// its freshly constructed state and returned to its pool.
pub struct PooledPreset {
    inst: Option<Box<dyn Preset>>,
    pool: Arc<PoolShared>,
}

impl Deref for PooledPreset {
    type Target = dyn Preset;

    fn deref(&self) -> &Self::Target {
        self.inst.as_deref().expect("pooled instance already released")
    }
}

impl DerefMut for PooledPreset {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inst.as_deref_mut().expect("pooled instance already released")
    }
}

impl Drop for PooledPreset {
    fn drop(&mut self) {
        if let Some(mut inst) = self.inst.take() {
            inst.reset();
            if let Ok(mut state) = self.pool.state.lock() {
                state.in_use -= 1;
                state.free.push(inst);
            }
        }
    }
}

impl fmt::Debug for PooledPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inst.as_deref() {
            Some(inst) => write!(
                f,
                "PooledPreset({} \"{}\")",
                inst.type_name(),
                inst.common().preset_name()
            ),
            None => write!(f, "PooledPreset(released)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::{CopySource, PresetCommon};
    use crate::stream::PropertyStream;

    #[derive(Debug, Clone, Default)]
    struct Pebble {
        common: PresetCommon,
        size: u32,
    }

    impl Pebble {
        fn read_preset_property(
            &mut self,
            name: &str,
            stream: &mut dyn PropertyStream,
            sources: &dyn CopySource,
        ) -> anyhow::Result<()> {
            crate::preset::read_base_property(self, name, stream, sources)
        }
    }

    crate::impl_preset!(Pebble, "Pebble");

    #[test]
    fn first_acquire_builds_one_batch() {
        let pool = InstancePool::new("Pebble", Pebble::new_boxed, 10);
        assert_eq!(pool.stats().built, 0);

        let guard = pool.acquire();
        let stats = pool.stats();
        assert_eq!(stats.built, 10);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.free, 9);
        assert_eq!(stats.refills, 1);
        drop(guard);

        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.free, 10);
    }

    #[test]
    fn released_instances_are_reused_without_refilling() {
        let pool = InstancePool::new("Pebble", Pebble::new_boxed, 10);

        let guards: Vec<_> = (0..7).map(|_| pool.acquire()).collect();
        assert_eq!(pool.stats().refills, 1);
        drop(guards);

        let guards: Vec<_> = (0..7).map(|_| pool.acquire()).collect();
        assert_eq!(pool.stats().refills, 1);
        assert_eq!(pool.stats().built, 10);
        drop(guards);
    }

    #[test]
    fn draining_the_batch_triggers_another_refill() {
        let pool = InstancePool::new("Pebble", Pebble::new_boxed, 4);

        let guards: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        let stats = pool.stats();
        assert_eq!(stats.refills, 2);
        assert_eq!(stats.built, 8);
        assert_eq!(stats.in_use, 5);
        drop(guards);
    }

    #[test]
    fn dropped_guards_hand_back_reset_instances() {
        let pool = InstancePool::new("Pebble", Pebble::new_boxed, 2);

        {
            let mut guard = pool.acquire();
            guard.common_mut().set_preset_name("Scuffed");
            if let Some(pebble) = guard.as_any_mut().downcast_mut::<Pebble>() {
                pebble.size = 99;
            }
        }

        // Drain the pool and check every instance came back clean.
        let guards: Vec<_> = (0..2).map(|_| pool.acquire()).collect();
        for guard in &guards {
            assert!(!guard.common().is_named());
            let pebble = guard.as_any().downcast_ref::<Pebble>().unwrap();
            assert_eq!(pebble.size, 0);
        }
    }
}
