//! Identity allocation for lambdas and arbitrary instances.
//!
//! Lambda and `ArbitraryInstance` identities are compared by id rather than by
//! structure, so ids must be unique for the whole process lifetime. A single
//! allocator hands them out; nothing else mints ids.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a lambda instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LambdaId(u64);

impl LambdaId {
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Identity of a skolem constant minted by evaluating `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ArbitraryId(u64);

impl ArbitraryId {
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Monotonic id allocator.
///
/// Only the process-wide instance returned by [`IdAllocator::global`] exists;
/// two allocators would hand out colliding ids.
pub struct IdAllocator {
    next_lambda: AtomicU64,
    next_instance: AtomicU64,
}

static GLOBAL: IdAllocator = IdAllocator::new();

impl IdAllocator {
    const fn new() -> Self {
        Self {
            next_lambda: AtomicU64::new(0),
            next_instance: AtomicU64::new(0),
        }
    }

    pub fn global() -> &'static IdAllocator {
        &GLOBAL
    }

    pub fn next_lambda(&self) -> LambdaId {
        LambdaId(self.next_lambda.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_instance(&self) -> ArbitraryId {
        ArbitraryId(self.next_instance.fetch_add(1, Ordering::Relaxed))
    }
}
