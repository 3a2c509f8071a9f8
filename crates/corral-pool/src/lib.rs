// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission-control execution pool and advisory run lock for the Corral
//! relay.
//!
//! All agent executions go through [`AgentPool`]: per-project FIFO queues
//! with concurrency 1, a global concurrency ceiling, memory-pressure
//! admission control, and idle-queue eviction. [`RunLock`] adds an advisory
//! per-project marker file so concurrent triggers collapse to a single run.

pub mod lock;
pub mod memory;
pub mod pool;

pub use lock::{RunLock, RunLockGuard};
pub use pool::{AgentPool, PoolResult};
