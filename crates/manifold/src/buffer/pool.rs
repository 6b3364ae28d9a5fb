//! Size-classed free lists of spare byte arrays.
//!
//! Growing a scratch buffer during a decode is the hot allocation path, so
//! instead of reallocating, [`ByteBuf`](super::ByteBuf) trades arrays
//! through a [`BufferPool`]. The pool keeps a small slot table of spare
//! arrays per size class; concurrent callers are spread across slots by a
//! cheap per-thread hash so slot contention stays rare and a plain mutex
//! per slot is enough.
//!
//! Retention is opportunistic throughout: an array the pool declines to
//! cache is simply dropped, and a request the pool cannot serve from cache
//! is served by a fresh allocation. Neither is an error. The only failure
//! the pool can produce is a configured hard ceiling rejecting a request.

use std::{
    cell::Cell,
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash, Hasher},
    sync::{Arc, Mutex, OnceLock},
    thread,
};

use tracing::warn;

use crate::{error::PoolError, options::PoolOptions};

/// Size-classed free-list allocator for byte arrays.
///
/// Arrays handed out always have capacity at least the requested minimum.
/// Requests above the classed range bypass the pool; requests above the
/// configured ceiling fail with [`PoolError::CapacityExceeded`].
pub struct BufferPool {
    options: PoolOptions,
    /// `classes * slots` spare-array slots, row per class.
    slots: Vec<Mutex<Option<Box<[u8]>>>>,
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BufferPool {
    /// Creates a pool with the given options.
    #[must_use]
    pub fn new(options: PoolOptions) -> Self {
        let n = options.classes.max(1) * options.slots.max(1);
        let mut slots = Vec::with_capacity(n);
        slots.resize_with(n, || Mutex::new(None));
        Self { options, slots }
    }

    /// The process-wide default pool, assembled once from the environment.
    pub fn global() -> &'static Arc<BufferPool> {
        static GLOBAL: OnceLock<Arc<BufferPool>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(BufferPool::new(PoolOptions::from_env())))
    }

    /// The options this pool was built with.
    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Replaces `array` with one of capacity at least `min`, copying the
    /// first `live` bytes across; the displaced array is offered back to
    /// the pool. On error `array` is left untouched.
    ///
    /// # Errors
    ///
    /// [`PoolError::CapacityExceeded`] if a hard ceiling is configured and
    /// `min` exceeds it.
    pub fn acquire(
        &self,
        array: &mut Box<[u8]>,
        live: usize,
        min: usize,
    ) -> Result<(), PoolError> {
        debug_assert!(live <= array.len());
        let mut fresh = self.take(min)?;
        fresh[..live].copy_from_slice(&array[..live]);
        let old = std::mem::replace(array, fresh);
        self.release(old);
        Ok(())
    }

    /// Returns an array of capacity at least `min`, reusing a cached one
    /// when a suitable class holds one. Contents are unspecified; callers
    /// track their own live length.
    ///
    /// # Errors
    ///
    /// [`PoolError::CapacityExceeded`] if a hard ceiling is configured and
    /// `min` exceeds it.
    pub fn take(&self, min: usize) -> Result<Box<[u8]>, PoolError> {
        let ceiling = self.options.ceiling;
        if ceiling != 0 && min > ceiling {
            warn!(requested = min, ceiling, "pool ceiling exceeded");
            return Err(PoolError::CapacityExceeded { requested: min, ceiling });
        }
        if min == 0 {
            return Ok(Box::default());
        }
        if min > self.options.pooled_max() {
            // Above the classed range: allocate exactly, bypassing the pool.
            return Ok(vec![0u8; min].into_boxed_slice());
        }
        let class = (min - 1) / self.options.class_width;
        if let Some(cached) = self.slot(class, |slot| {
            if slot.as_ref().is_some_and(|a| a.len() >= min) { slot.take() } else { None }
        }) {
            return Ok(cached);
        }
        // Round up to the class boundary so the array re-enters this class.
        let size = (class + 1) * self.options.class_width;
        Ok(vec![0u8; size].into_boxed_slice())
    }

    /// Offers `array` back to the pool. A no-op (the array is dropped) if
    /// it fits no class or its slot is already occupied.
    pub fn release(&self, array: Box<[u8]>) {
        if array.is_empty() || array.len() > self.options.pooled_max() {
            return;
        }
        let class = (array.len() - 1) / self.options.class_width;
        self.slot(class, |slot| {
            if slot.is_none() {
                *slot = Some(array);
            }
        });
    }

    /// Trades a large array for whatever small one is cached, avoiding a
    /// shrink-copy on [`ByteBuf::clear`](super::ByteBuf::clear). Arrays no
    /// larger than one class width come straight back unchanged.
    #[must_use]
    pub fn exchange(&self, array: Box<[u8]>) -> Box<[u8]> {
        if array.len() <= self.options.class_width {
            return array;
        }
        self.release(array);
        self.slot(0, |slot| slot.take()).unwrap_or_default()
    }

    /// Runs `f` on the calling thread's slot within `class`.
    fn slot<T>(&self, class: usize, f: impl FnOnce(&mut Option<Box<[u8]>>) -> T) -> T {
        let slots = self.options.slots.max(1);
        let idx = class.min(self.options.classes.max(1) - 1) * slots + thread_slot() % slots;
        let mut guard = match self.slots[idx].lock() {
            Ok(g) => g,
            // A panic while holding the lock can only leave a spare array
            // behind; the slot content is always valid.
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

/// A cheap per-thread number used to spread callers across slots.
fn thread_slot() -> usize {
    thread_local! {
        static SLOT: Cell<usize> = const { Cell::new(usize::MAX) };
    }
    SLOT.with(|s| {
        let mut v = s.get();
        if v == usize::MAX {
            let mut hasher = RandomState::new().build_hasher();
            thread::current().id().hash(&mut hasher);
            v = hasher.finish() as usize;
            s.set(v);
        }
        v
    })
}
