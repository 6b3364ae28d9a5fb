//! Tunables for the buffer pool and the decoders.
//!
//! Both option structs follow the same pattern: plain fields with documented
//! defaults, a `Default` impl, and a `from_env()` constructor so deployments
//! can tune the pool and the per-buffer ceilings without recompiling. Unset
//! or unparsable environment variables fall back to the documented default.

use std::env;

/// Configuration for a [`BufferPool`](crate::BufferPool).
///
/// # Examples
///
/// ```rust
/// use manifold::PoolOptions;
///
/// let options = PoolOptions {
///     class_width: 2048,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolOptions {
    /// Width of each size class in bytes. An array of capacity `c` belongs
    /// to class `c / class_width` (capped to the last class).
    ///
    /// Environment variable: `MANIFOLD_POOL_CLASS_WIDTH`.
    ///
    /// # Default
    ///
    /// `1024`
    pub class_width: usize,

    /// Number of size classes. Arrays larger than
    /// `classes * class_width` bypass the pool entirely.
    ///
    /// Environment variable: `MANIFOLD_POOL_CLASSES`.
    ///
    /// # Default
    ///
    /// `8`
    pub classes: usize,

    /// Spare-array slots per size class. Concurrent callers are spread
    /// across slots by a cheap thread hash, so a handful is enough.
    ///
    /// Environment variable: `MANIFOLD_POOL_SLOTS`.
    ///
    /// # Default
    ///
    /// `4`
    pub slots: usize,

    /// Hard ceiling on any single allocation request, pooled or not.
    /// Requests above it fail with
    /// [`PoolError::CapacityExceeded`](crate::PoolError::CapacityExceeded)
    /// instead of allocating; `0` disables the ceiling.
    ///
    /// Environment variable: `MANIFOLD_POOL_CEILING`.
    ///
    /// # Default
    ///
    /// `0` (unlimited)
    pub ceiling: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self { class_width: 1024, classes: 8, slots: 4, ceiling: 0 }
    }
}

impl PoolOptions {
    /// Reads options from `MANIFOLD_POOL_*` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            class_width: env_usize("MANIFOLD_POOL_CLASS_WIDTH", defaults.class_width),
            classes: env_usize("MANIFOLD_POOL_CLASSES", defaults.classes),
            slots: env_usize("MANIFOLD_POOL_SLOTS", defaults.slots),
            ceiling: env_usize("MANIFOLD_POOL_CEILING", defaults.ceiling),
        }
    }

    /// Largest capacity the pool will cache; bigger requests bypass it.
    #[must_use]
    pub fn pooled_max(&self) -> usize {
        self.class_width.saturating_mul(self.classes)
    }
}

/// Per-decoder ceilings on the three scratch buffers.
///
/// Each limit bounds how much a single tag, key, or value may accumulate
/// before the decoder fails with a resource error. The limits exist to stop
/// hostile input from growing scratch buffers without bound; exceeding one
/// is reported as [`PoolError::CapacityExceeded`](crate::PoolError), never
/// as silent truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderOptions {
    /// Ceiling on an accumulated type/space tag, in bytes.
    ///
    /// Environment variable: `MANIFOLD_TAG_LIMIT`.
    ///
    /// # Default
    ///
    /// `256`
    pub tag_limit: usize,

    /// Ceiling on an accumulated key, in bytes.
    ///
    /// Environment variable: `MANIFOLD_KEY_LIMIT`.
    ///
    /// # Default
    ///
    /// `2048`
    pub key_limit: usize,

    /// Ceiling on an accumulated leaf value, in bytes.
    ///
    /// Environment variable: `MANIFOLD_VALUE_LIMIT`.
    ///
    /// # Default
    ///
    /// `8 MiB`
    pub value_limit: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            tag_limit: 256,
            key_limit: 2048,
            value_limit: 8 * 1024 * 1024,
        }
    }
}

impl DecoderOptions {
    /// Reads options from `MANIFOLD_*_LIMIT` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tag_limit: env_usize("MANIFOLD_TAG_LIMIT", defaults.tag_limit),
            key_limit: env_usize("MANIFOLD_KEY_LIMIT", defaults.key_limit),
            value_limit: env_usize("MANIFOLD_VALUE_LIMIT", defaults.value_limit),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = PoolOptions::default();
        assert_eq!(p.pooled_max(), 8192);
        let d = DecoderOptions::default();
        assert_eq!(d.tag_limit, 256);
        assert_eq!(d.value_limit, 8 * 1024 * 1024);
    }

    #[test]
    fn env_fallback_on_garbage() {
        // Unset and unparsable variables both yield the default.
        assert_eq!(env_usize("MANIFOLD_TEST_UNSET_VARIABLE", 7), 7);
        unsafe { env::set_var("MANIFOLD_TEST_GARBAGE", "not-a-number") };
        assert_eq!(env_usize("MANIFOLD_TEST_GARBAGE", 7), 7);
        unsafe { env::set_var("MANIFOLD_TEST_NUMERIC", " 42 ") };
        assert_eq!(env_usize("MANIFOLD_TEST_NUMERIC", 7), 42);
    }
}
