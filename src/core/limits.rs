/*!
 * Engine Limits
 * Centralized capacity limits for the dispatch core
 */

/// Maximum subscriptions per dispatch key
/// Registration beyond this fails with ResourceExhausted
pub const MAX_SUBSCRIPTIONS_PER_KIND: usize = 1024;

/// Initial capacity of an output sink's record buffer
/// Sized so typical trap bursts never reallocate on the dispatch path
pub const OUTPUT_BUFFER_INITIAL: usize = 256;
