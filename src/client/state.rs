use crate::infrastructure::TaskManager;

/// Mutable bookkeeping for a Gateway, kept behind one lock
pub struct ClientState {
    /// Reader and keep-alive tasks of the current connection
    pub task_manager: TaskManager,

    /// Whether the disconnect was manual (prevents auto-reconnect)
    pub was_manual_disconnect: bool,

    /// Bumped on every successful open; a reader only reports the close of its own connection
    pub generation: u64,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            was_manual_disconnect: false,
            generation: 0,
        }
    }

    /// Start a new connection generation, tearing down the previous one's tasks
    pub fn next_generation(&mut self) -> u64 {
        let stale = self.task_manager.active();
        if stale > 0 {
            tracing::debug!("Aborting {} task(s) of the previous connection", stale);
        }
        self.task_manager.abort_all();
        self.generation += 1;
        self.generation
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
