use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::hub::Hub;
use crate::lobby::Lobby;
use crate::texts::TextPool;

/// Shared application state available to all request handlers via Axum's `State` extractor.
///
/// All room state sits behind one mutex: an event handler holds it from validation until its
/// last broadcast is queued.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Config,
    pub lobby: Arc<Mutex<Lobby>>,
    pub hub: Hub,
    pub texts: TextPool,
}

impl AppState {
    /// Build empty state with the built-in text pool.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_texts(config, TextPool::default())
    }

    #[must_use]
    pub fn with_texts(config: Config, texts: TextPool) -> Self {
        let lobby = Lobby::new(config.game.clone(), texts.len());
        Self {
            config,
            lobby: Arc::new(Mutex::new(lobby)),
            hub: Hub::new(),
            texts,
        }
    }
}
