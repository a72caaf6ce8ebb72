//! Scheduler configuration.

/// Admission and rotation settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Global cap on concurrently running games.
    ///
    /// Default: 1000.
    pub max_parallel_games: usize,

    /// A session already in this many games is not picked for another.
    ///
    /// Default: 1.
    pub games_per_session: usize,

    /// Completed games after which a session must handshake again.
    /// 0 disables rotation.
    ///
    /// Default: 100.
    pub rehash_every: u32,

    /// Seed for pairing and round sampling. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_games: 1000,
            games_per_session: 1,
            rehash_every: 100,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_parallel_games, 1000);
        assert_eq!(config.games_per_session, 1);
        assert_eq!(config.rehash_every, 100);
        assert!(config.seed.is_none());
    }
}
