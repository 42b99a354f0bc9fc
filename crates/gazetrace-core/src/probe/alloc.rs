//! Heap tracing through a counting global allocator.
//!
//! The library cannot choose the global allocator for its host, so tracing is
//! opt-in: a binary that wants `traced_mem_*` columns installs
//! [`TracingAllocator`]:
//!
//! ```no_run
//! use gazetrace_core::probe::TracingAllocator;
//!
//! #[global_allocator]
//! static ALLOC: TracingAllocator = TracingAllocator::system();
//! # fn main() {}
//! ```
//!
//! Without it, [`AllocProbe`] reports [`ProbeError::NotInstalled`] and the
//! columns stay empty. Counters are process-wide; the peak is the peak since
//! the first traced allocation, shared by all sessions.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{AllocReading, Probe};
use crate::error::ProbeError;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static CURRENT: AtomicU64 = AtomicU64::new(0);
static PEAK: AtomicU64 = AtomicU64::new(0);

/// Wraps another allocator and counts live heap bytes.
pub struct TracingAllocator<A = System> {
    inner: A,
}

impl TracingAllocator<System> {
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A> TracingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

fn record_alloc(size: usize) {
    INSTALLED.store(true, Ordering::Relaxed);
    let now = CURRENT.fetch_add(size as u64, Ordering::Relaxed) + size as u64;
    PEAK.fetch_max(now, Ordering::Relaxed);
}

fn record_dealloc(size: usize) {
    // Saturate: memory allocated before tracing started may be freed later.
    let _ = CURRENT.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
        Some(cur.saturating_sub(size as u64))
    });
}

// SAFETY: every method forwards to the inner allocator with the same
// arguments; the bookkeeping only touches atomics and never allocates.
unsafe impl<A: GlobalAlloc> GlobalAlloc for TracingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // SAFETY: caller upholds the `GlobalAlloc::alloc` contract.
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        // SAFETY: caller upholds the `GlobalAlloc::alloc_zeroed` contract.
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: caller upholds the `GlobalAlloc::dealloc` contract.
        unsafe { self.inner.dealloc(ptr, layout) };
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: caller upholds the `GlobalAlloc::realloc` contract.
        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

/// (current, peak) traced heap bytes, or `None` when no tracing allocator
/// has seen an allocation.
pub fn traced_memory() -> Option<(u64, u64)> {
    INSTALLED
        .load(Ordering::Relaxed)
        .then(|| (CURRENT.load(Ordering::Relaxed), PEAK.load(Ordering::Relaxed)))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllocProbe;

impl Probe<AllocReading> for AllocProbe {
    fn name(&self) -> &'static str {
        "alloc"
    }

    fn capture(&mut self) -> Result<AllocReading, ProbeError> {
        let (current_bytes, peak_bytes) = traced_memory().ok_or(ProbeError::NotInstalled)?;
        Ok(AllocReading {
            current_bytes,
            peak_bytes,
        })
    }
}
