//! Process-wide tuning knobs.
//!
//! Values come from [`MatConfig::default`], optionally overridden by
//! environment variables the first time [`MatConfig::global`] is read.
//! An application may also [`install`](MatConfig::install) its own
//! configuration before the first buffer is created.
//!
//! # Environment Variables
//!
//! - `MAT_THREADS` - worker threads for element-wise kernels (1-256)
//! - `MAT_MALLOC_ALIGN` - host allocation alignment in bytes (power of two, 8-4096)
//! - `MAT_PARALLEL_MIN` - minimum element count before kernels go parallel
//!
//! # Usage
//!
//! ```rust
//! use mat_core::MatConfig;
//!
//! let cfg = MatConfig::global();
//! assert!(cfg.malloc_align.is_power_of_two());
//! assert!(cfg.threads >= 1);
//! ```

use std::env;
use std::sync::OnceLock;

/// Default worker count for element-wise kernels.
pub const DEFAULT_THREADS: usize = 8;

/// Default host allocation alignment (32 with AVX, else 16).
pub const DEFAULT_MALLOC_ALIGN: usize = if cfg!(target_feature = "avx") { 32 } else { 16 };

/// Extra bytes allocated past the end of every host block so vector loads
/// may read slightly beyond the last element.
pub const DEFAULT_MALLOC_OVERREAD: usize = 64;

/// Element count below which kernels run on the calling thread.
pub const DEFAULT_PARALLEL_MIN_LEN: usize = 32 * 1024;

static GLOBAL: OnceLock<MatConfig> = OnceLock::new();

/// Tuning knobs for allocation and parallel kernels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatConfig {
    /// Worker threads in the kernel pool.
    pub threads: usize,
    /// Alignment of host allocations in bytes.
    pub malloc_align: usize,
    /// Overread padding appended to host allocations.
    pub malloc_overread: usize,
    /// Minimum element count for parallel execution.
    pub parallel_min_len: usize,
}

impl Default for MatConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            malloc_align: DEFAULT_MALLOC_ALIGN,
            malloc_overread: DEFAULT_MALLOC_OVERREAD,
            parallel_min_len: DEFAULT_PARALLEL_MIN_LEN,
        }
    }
}

impl MatConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_usize("MAT_THREADS") {
            cfg.threads = n.clamp(1, 256);
        }
        if let Some(align) = env_usize("MAT_MALLOC_ALIGN") {
            if align.is_power_of_two() {
                cfg.malloc_align = align.clamp(8, 4096);
            }
        }
        if let Some(n) = env_usize("MAT_PARALLEL_MIN") {
            cfg.parallel_min_len = n.max(1);
        }
        cfg
    }

    /// Process-wide configuration, initialised from the environment.
    pub fn global() -> &'static MatConfig {
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Installs `self` as the process-wide configuration.
    ///
    /// Fails (returning the rejected config) once the global has been read
    /// or installed.
    pub fn install(self) -> std::result::Result<(), MatConfig> {
        GLOBAL.set(self)
    }

    /// Sets the worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the host allocation alignment; ignored unless a power of two.
    pub fn with_malloc_align(mut self, align: usize) -> Self {
        if align.is_power_of_two() {
            self.malloc_align = align;
        }
        self
    }

    /// Sets the parallel threshold.
    pub fn with_parallel_min_len(mut self, len: usize) -> Self {
        self.parallel_min_len = len.max(1);
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
