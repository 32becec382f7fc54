//! Hub configuration.

/// Configuration for a resource hub's pool.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Records per storage block (default: 64). Blocks are allocated whole
    /// and never move, so this trades slack for allocation frequency.
    pub block_capacity: usize,

    /// Blocks allocated up front (default: 1).
    pub preallocate_blocks: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            block_capacity: 64,
            preallocate_blocks: 1,
        }
    }
}

impl HubConfig {
    /// Small-footprint config for tests or constrained hosts.
    pub fn minimal() -> Self {
        Self {
            block_capacity: 8,
            preallocate_blocks: 0,
        }
    }
}
