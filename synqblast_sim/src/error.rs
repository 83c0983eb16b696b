//! Harness errors.

use synqblast_core::{ActionError, ConfigError, SyncError};
use synqblast_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid sim config: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown peer index {0}")]
    UnknownPeer(usize),

    #[error("peer {peer} action rejected: {source}")]
    Action {
        peer: usize,
        #[source]
        source: ActionError,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("failed to write export: {0}")]
    Export(String),
}

impl SimError {
    pub fn action(peer: usize, source: ActionError) -> Self {
        Self::Action { peer, source }
    }
}
