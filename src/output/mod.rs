/*!
 * Output Module
 * Persistence sinks for delivered event records
 */

mod manager;

// Re-export public API
pub use manager::{read_records, FileOutputManager};
