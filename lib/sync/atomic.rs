//! Atomics, swapped for loom's under `cfg(loom)`.

#[cfg(loom)]
pub use loom::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(loom))]
pub use std::sync::atomic::{AtomicUsize, Ordering};
