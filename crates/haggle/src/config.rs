//! Server configuration, read from flags or `HAGGLE_*` environment
//! variables.

use std::time::Duration;

use clap::Parser;
use haggle_negotiation::GeneratorConfig;
use haggle_scheduler::SchedulerConfig;
use haggle_session::SessionConfig;

/// Every knob of a Haggle server.
///
/// Each layer has its own config type; this struct is the flat,
/// command-line facing union of them.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "haggle-server", version, about = "Runs a negotiation arena")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "HAGGLE_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Leading zero bits a proof-of-work must have.
    #[arg(long, env = "HAGGLE_COMPLEXITY", default_value_t = 18)]
    pub complexity: u32,

    /// Seconds between proof-of-work verifier resets. Also the freshness
    /// window of a solved challenge.
    #[arg(long = "pow-reset", env = "HAGGLE_POW_RESET", default_value_t = 60)]
    pub pow_reset_secs: u64,

    /// Handshake deadline in milliseconds.
    #[arg(long = "handshake-timeout", env = "HAGGLE_HANDSHAKE_TIMEOUT", default_value_t = 60_000)]
    pub handshake_timeout_ms: u64,

    /// Deadline of each game call in milliseconds.
    #[arg(long = "timeout", env = "HAGGLE_TIMEOUT", default_value_t = 2_000)]
    pub timeout_ms: u64,

    /// Global cap on concurrently running games.
    #[arg(long = "parallel-games", env = "HAGGLE_PARALLEL_GAMES", default_value_t = 1000)]
    pub parallel_games: usize,

    /// Games a single session may play at once.
    #[arg(long, env = "HAGGLE_GAMES_PER_SESSION", default_value_t = 1)]
    pub games_per_session: usize,

    /// Games after which a session must handshake again. 0 disables it.
    #[arg(long, env = "HAGGLE_REHASH_EVERY", default_value_t = 100)]
    pub rehash_every: u32,

    /// Item types per game.
    #[arg(long, env = "HAGGLE_TYPES", default_value_t = 3)]
    pub types: u32,

    /// Minimum total units per game.
    #[arg(long, env = "HAGGLE_MIN_OBJ", default_value_t = 1)]
    pub min_obj: u32,

    /// Maximum total units per game.
    #[arg(long, env = "HAGGLE_MAX_OBJ", default_value_t = 6)]
    pub max_obj: u32,

    /// Worth of the whole pie to either side.
    #[arg(long, env = "HAGGLE_TOTAL", default_value_t = 10)]
    pub total: u32,

    /// Rounds per game.
    #[arg(long, env = "HAGGLE_MAX_ROUNDS", default_value_t = 5)]
    pub max_rounds: u32,

    /// Seed for pairing and game sampling.
    #[arg(long, env = "HAGGLE_SEED")]
    pub seed: Option<u64>,
}

impl ServerConfig {
    pub fn pow_reset(&self) -> Duration {
        Duration::from_secs(self.pow_reset_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            call_timeout: Duration::from_millis(self.timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_parallel_games: self.parallel_games,
            games_per_session: self.games_per_session,
            rehash_every: self.rehash_every,
            seed: self.seed,
        }
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            types: self.types,
            min_obj: self.min_obj,
            max_obj: self.max_obj,
            total: self.total,
            max_rounds: self.max_rounds,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            complexity: 18,
            pow_reset_secs: 60,
            handshake_timeout_ms: 60_000,
            timeout_ms: 2_000,
            parallel_games: 1000,
            games_per_session: 1,
            rehash_every: 100,
            types: 3,
            min_obj: 1,
            max_obj: 6,
            total: 10,
            max_rounds: 5,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default_matches_layers() {
        let config = ServerConfig::default();

        let session = config.session_config();
        assert_eq!(session.call_timeout, Duration::from_secs(2));
        assert_eq!(session.handshake_timeout, Duration::from_secs(60));

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.max_parallel_games, 1000);
        assert_eq!(scheduler.games_per_session, 1);
        assert_eq!(scheduler.rehash_every, 100);

        let generator = config.generator_config();
        assert_eq!(generator.types, 3);
        assert_eq!(generator.max_rounds, 5);
        assert_eq!(config.pow_reset(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "haggle-server",
            "--bind",
            "0.0.0.0:9000",
            "--complexity",
            "4",
            "--timeout",
            "500",
            "--rehash-every",
            "0",
            "--seed",
            "7",
        ])
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.complexity, 4);
        assert_eq!(config.session_config().call_timeout, Duration::from_millis(500));
        assert_eq!(config.scheduler_config().rehash_every, 0);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_parse_rejects_non_numeric_complexity() {
        let result = ServerConfig::try_parse_from(["haggle-server", "--complexity", "hard"]);
        assert!(result.is_err());
    }
}
