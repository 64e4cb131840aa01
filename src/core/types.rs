/*!
 * Core Types
 * Common types used across the engine
 */

/// Virtual CPU number
pub type CpuNum = u32;

/// Guest virtual address
pub type GuestVirtAddr = u64;

/// Guest physical address
pub type GuestPhysAddr = u64;

/// Monotonic timestamp in nanoseconds since engine start
pub type Timestamp = u64;

/// Subscription handle
///
/// Returned on registration, consumed by cancellation. Handles are
/// single-use: once cancelled they are permanently invalid.
pub type SubscriptionId = u64;
