use std::io;

use thiserror::Error;

use crate::storage::blob_store::BlobError;
use crate::upstream::UpstreamError;

/// Failure while translating one upstream event into IRC output.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("failed to write to IRC client: {0}")]
    Irc(#[from] io::Error),

    #[error("no idea what to do with notification type {0}")]
    UnknownNotificationType(String),

    #[error("failed to join {chat}: {source}")]
    Join {
        chat: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Failure setting up a gateway connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("client disconnected before logging in")]
    LoginAborted,

    #[error("could not connect to the messaging service: {0}")]
    Connect(#[from] UpstreamError),

    #[error("failed to write to IRC client: {0}")]
    Irc(#[from] io::Error),
}
