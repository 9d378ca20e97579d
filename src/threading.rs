// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide thread token budget.
//!
//! The color encoder fans out up to three concurrent plane encodes. Tokens
//! bound the process's total extra parallelism: nested or concurrent
//! encodes share one budget instead of each assuming the whole machine.
//! Tokens are returned on drop, so a panicking plane task cannot leak them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

static BUDGET: OnceLock<AtomicUsize> = OnceLock::new();
static ACTIVE_REGIONS: AtomicUsize = AtomicUsize::new(0);

fn budget() -> &'static AtomicUsize {
    BUDGET.get_or_init(|| {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        AtomicUsize::new(threads.saturating_sub(1))
    })
}

/// A batch of acquired thread tokens, released on drop.
#[derive(Debug)]
pub struct ThreadTokens {
    count: usize,
}

impl ThreadTokens {
    /// Take up to `max` tokens, or none at all if fewer than `min` are
    /// available right now.
    pub fn try_acquire_up_to(max: usize, min: usize) -> Option<ThreadTokens> {
        let budget = budget();
        let mut current = budget.load(Ordering::Relaxed);
        loop {
            let take = current.min(max);
            if take < min {
                return None;
            }
            match budget.compare_exchange_weak(current, current - take, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Some(ThreadTokens { count: take }),
                Err(observed) => current = observed,
            }
        }
    }

    /// Number of tokens held.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Drop for ThreadTokens {
    fn drop(&mut self) {
        budget().fetch_add(self.count, Ordering::AcqRel);
    }
}

/// Scoped gauge of plane tasks currently running in parallel regions.
#[derive(Debug)]
pub struct ParallelRegionGuard(());

impl ParallelRegionGuard {
    /// Mark this thread as inside a parallel plane encode.
    pub fn enter() -> ParallelRegionGuard {
        ACTIVE_REGIONS.fetch_add(1, Ordering::AcqRel);
        ParallelRegionGuard(())
    }
}

impl Drop for ParallelRegionGuard {
    fn drop(&mut self) {
        ACTIVE_REGIONS.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Plane tasks currently inside a parallel region.
pub fn active_parallel_regions() -> usize {
    ACTIVE_REGIONS.load(Ordering::Acquire)
}
