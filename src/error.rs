use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("connection error: {0}")]
    Connection(#[source] redis::RedisError),

    #[error("{op} {key} failed: {source}")]
    Transport {
        op: &'static str,
        key: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("key not exists")]
    KeyNotFound,

    #[error("key type not support: {0}")]
    UnsupportedType(String),

    #[error("{0}")]
    MalformedScan(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExportError {
    pub(crate) fn transport(op: &'static str, key: &[u8], source: redis::RedisError) -> Self {
        ExportError::Transport {
            op,
            key: String::from_utf8_lossy(key).into_owned(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
