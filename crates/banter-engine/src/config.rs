//! Engine tuning knobs.

/// Queue depths for the engine's internal channels.
///
/// The defaults are sized for a single messaging screen; there is no reason
/// to touch them outside of tests.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Command queue between handles and the engine task.
    pub command_buffer: usize,
    /// Broadcast capacity for UI updates; readers that fall this far behind
    /// see a lag error and re-read the snapshots.
    pub update_buffer: usize,
    /// Queue for resolved background work (send confirmations, fetches).
    pub task_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            update_buffer: 256,
            task_buffer: 64,
        }
    }
}
