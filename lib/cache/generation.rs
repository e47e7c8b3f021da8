//! Generation counters.
//!
//! An object is fresh when its stamp equals the counter for its state (present or missing)
//! and scope (default or custom). Invalidation bumps counters; nothing is swept. The four
//! counters start in disjoint ranges so a stamp taken under one never matches another.

/// Stamp no counter ever takes.
pub(crate) const STAMP_NEVER: u32 = 0;

/// Which custom-scope counters [`invalidate_custom`](crate::FsCache::invalidate_custom) bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomInvalidation {
    /// Only missing placeholders in custom subtrees go stale.
    MissingOnly,
    /// Everything in custom subtrees goes stale.
    Both,
}

#[derive(Debug, Clone)]
pub(crate) struct Generations {
    /// Indexed by `uses_custom`.
    present: [u32; 2],
    missing: [u32; 2],
}

fn bump(counter: &mut u32) {
    *counter = counter.wrapping_add(1);
    if *counter == STAMP_NEVER {
        *counter = 1;
    }
}

impl Generations {
    pub(crate) fn new() -> Self {
        Self {
            present: [1, 0x4000_0001],
            missing: [0x8000_0001, 0xc000_0001],
        }
    }

    pub(crate) fn current(&self, missing: bool, custom: bool) -> u32 {
        let scope = usize::from(custom);
        if missing {
            self.missing[scope]
        } else {
            self.present[scope]
        }
    }

    /// Bumps only the default scope. Custom subtrees are invalidated on their own.
    pub(crate) fn invalidate_missing(&mut self) {
        bump(&mut self.missing[0]);
    }

    pub(crate) fn invalidate_all(&mut self) {
        self.missing.iter_mut().for_each(bump);
        self.present.iter_mut().for_each(bump);
    }

    pub(crate) fn invalidate_custom(&mut self, mode: CustomInvalidation) {
        bump(&mut self.missing[1]);
        if mode == CustomInvalidation::Both {
            bump(&mut self.present[1]);
        }
    }
}
