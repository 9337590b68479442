use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: IpAddr,
    pub server_port: u16,
    pub environment: Environment,
    pub log_level: String,
    pub static_dir: PathBuf,
    pub game: GameSettings,
}

/// Deployment environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Race and room constants shared by every room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Room capacity. A room at this size is hidden from the public list.
    pub max_users_per_room: usize,
    /// Countdown shown to players between race start and the first keystroke.
    pub seconds_before_start: u64,
    /// Length of the race itself.
    pub seconds_for_game: u64,
    /// Extra time the server waits for client timeout reports before closing a race.
    pub deadline_grace_seconds: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_users_per_room: 4,
            seconds_before_start: 10,
            seconds_for_game: 60,
            deadline_grace_seconds: 5,
        }
    }
}

impl GameSettings {
    /// Time from race start until the server closes the race on its own.
    #[must_use]
    pub const fn race_deadline(&self) -> Duration {
        Duration::from_secs(
            self.seconds_before_start + self.seconds_for_game + self.deadline_grace_seconds,
        )
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional with defaults: `SERVER_HOST`, `SERVER_PORT`, `ENVIRONMENT`, `LOG_LEVEL`,
    /// `STATIC_DIR`, `MAX_USERS_PER_ROOM`, `SECONDS_TIMER_BEFORE_START_GAME`,
    /// `SECONDS_FOR_GAME`, `RACE_DEADLINE_GRACE_SECONDS`.
    ///
    /// `PORT` overrides `SERVER_PORT`; in production the host defaults to `0.0.0.0`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the variables above is set to a value that does not parse,
    /// or if the room capacity is below two.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let environment = match std::env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .as_str()
        {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        };

        let server_port = std::env::var("PORT")
            .or_else(|_| std::env::var("SERVER_PORT"))
            .unwrap_or_else(|_| "3002".to_string())
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("SERVER_PORT / PORT must be a valid u16"))?;

        let default_host = if environment == Environment::Production {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        };

        let server_host = std::env::var("SERVER_HOST")
            .unwrap_or_else(|_| default_host.to_string())
            .parse::<IpAddr>()
            .map_err(|_| anyhow::anyhow!("SERVER_HOST must be a valid IP address"))?;

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let static_dir = std::env::var("STATIC_DIR")
            .map_or_else(|_| PathBuf::from("public"), PathBuf::from);

        let defaults = GameSettings::default();
        let game = GameSettings {
            max_users_per_room: env_or("MAX_USERS_PER_ROOM", defaults.max_users_per_room)?,
            seconds_before_start: env_or(
                "SECONDS_TIMER_BEFORE_START_GAME",
                defaults.seconds_before_start,
            )?,
            seconds_for_game: env_or("SECONDS_FOR_GAME", defaults.seconds_for_game)?,
            deadline_grace_seconds: env_or(
                "RACE_DEADLINE_GRACE_SECONDS",
                defaults.deadline_grace_seconds,
            )?,
        };

        if game.max_users_per_room < 2 {
            anyhow::bail!("MAX_USERS_PER_ROOM must be at least 2");
        }

        Ok(Self {
            server_host,
            server_port,
            environment,
            log_level,
            static_dir,
            game,
        })
    }

    /// Build the socket address for the server to bind to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_host, self.server_port)
    }
}

/// Read a numeric variable, falling back to `default` when it is unset.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    std::env::var(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} must be a non-negative integer"))
    })
}
