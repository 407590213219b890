//! Element-wise kernels on a bounded Rayon pool.
//!
//! Kernels run on the calling thread for short slices and on a dedicated
//! pool of [`MatConfig::threads`] workers otherwise. Work is split in
//! contiguous chunks, so every element is written by exactly one worker.
//!
//! # Example
//!
//! ```rust
//! use mat_core::parallel;
//!
//! let mut data = vec![1.0f32; 100_000];
//! parallel::for_each_mut(&mut data, |v| *v *= 2.0);
//! assert!(data.iter().all(|&v| v == 2.0));
//! ```

use std::sync::OnceLock;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::warn;

use crate::config::MatConfig;

static POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

/// Kernel thread pool, `None` if it could not be built.
///
/// Without a dedicated pool, kernels fall back to Rayon's global pool.
pub fn pool() -> Option<&'static ThreadPool> {
    POOL.get_or_init(|| {
        let threads = MatConfig::global().threads;
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mat-worker-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(threads, error = %e, "kernel pool unavailable, using global rayon pool");
                None
            }
        }
    })
    .as_ref()
}

fn chunk_len(len: usize) -> usize {
    let threads = MatConfig::global().threads.max(1);
    len.div_ceil(threads * 4).max(1024)
}

fn run<R: Send>(job: impl FnOnce() -> R + Send) -> R {
    match pool() {
        Some(pool) => pool.install(job),
        None => job(),
    }
}

fn is_small(len: usize) -> bool {
    len < MatConfig::global().parallel_min_len
}

/// Applies `f` to every element in place.
pub fn for_each_mut<T, F>(data: &mut [T], f: F)
where
    T: Send,
    F: Fn(&mut T) + Sync + Send,
{
    if is_small(data.len()) {
        data.iter_mut().for_each(f);
        return;
    }
    let chunk = chunk_len(data.len());
    run(|| {
        data.par_chunks_mut(chunk)
            .for_each(|part| part.iter_mut().for_each(&f));
    });
}

/// Writes `f(src[i])` into `dst[i]` for the common prefix of both slices.
pub fn map_into<T, U, F>(dst: &mut [T], src: &[U], f: F)
where
    T: Send,
    U: Sync,
    F: Fn(&U) -> T + Sync + Send,
{
    let n = dst.len().min(src.len());
    let (dst, src) = (&mut dst[..n], &src[..n]);
    if is_small(n) {
        dst.iter_mut().zip(src).for_each(|(d, s)| *d = f(s));
        return;
    }
    let chunk = chunk_len(n);
    run(|| {
        dst.par_chunks_mut(chunk)
            .zip(src.par_chunks(chunk))
            .for_each(|(d, s)| d.iter_mut().zip(s).for_each(|(d, s)| *d = f(s)));
    });
}

/// Updates `dst[i]` with `f(&mut dst[i], &src[i])` for the common prefix.
pub fn zip_mut<T, U, F>(dst: &mut [T], src: &[U], f: F)
where
    T: Send,
    U: Sync,
    F: Fn(&mut T, &U) + Sync + Send,
{
    let n = dst.len().min(src.len());
    let (dst, src) = (&mut dst[..n], &src[..n]);
    if is_small(n) {
        dst.iter_mut().zip(src).for_each(|(d, s)| f(d, s));
        return;
    }
    let chunk = chunk_len(n);
    run(|| {
        dst.par_chunks_mut(chunk)
            .zip(src.par_chunks(chunk))
            .for_each(|(d, s)| d.iter_mut().zip(s).for_each(|(d, s)| f(d, s)));
    });
}

/// Writes `f(a[i], b[i])` into `dst[i]` for the common prefix of all three.
pub fn zip_into<T, F>(dst: &mut [T], a: &[T], b: &[T], f: F)
where
    T: Send + Sync + Copy,
    F: Fn(T, T) -> T + Sync + Send,
{
    let n = dst.len().min(a.len()).min(b.len());
    let (dst, a, b) = (&mut dst[..n], &a[..n], &b[..n]);
    if is_small(n) {
        for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
            *d = f(x, y);
        }
        return;
    }
    let chunk = chunk_len(n);
    run(|| {
        dst.par_chunks_mut(chunk)
            .zip(a.par_chunks(chunk))
            .zip(b.par_chunks(chunk))
            .for_each(|((d, a), b)| {
                for ((d, &x), &y) in d.iter_mut().zip(a).zip(b) {
                    *d = f(x, y);
                }
            });
    });
}

/// Calls `f(row_index, row)` for every `row_len`-sized row of `data`.
pub fn for_each_row<T, F>(data: &mut [T], row_len: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if row_len == 0 {
        return;
    }
    if is_small(data.len()) {
        data.chunks_mut(row_len).enumerate().for_each(|(i, row)| f(i, row));
        return;
    }
    run(|| {
        data.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(i, row)| f(i, row));
    });
}
