use log::{info, warn};
use redis::{Client, Connection, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisResult};

use crate::error::{ExportError, Result};

/// Idle connections kept around between requests.
const MAX_IDLE: usize = 8;

/// Where and how to reach the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            db: 0,
        }
    }
}

impl ConnectionConfig {
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                // AUTH is only sent when a password is present
                username: self.password.as_ref().and(self.username.clone()),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

/// A small synchronous pool of store connections.
///
/// Every request borrows one connection, runs a single exchange on it and
/// hands it back. Idle connections are probed with `PING` before reuse.
pub struct ConnectionPool {
    client: Client,
    idle: Vec<Connection>,
}

impl ConnectionPool {
    /// Builds the client and dials the first connection, so bad addresses or
    /// credentials fail here rather than on the first key.
    pub fn open(config: &ConnectionConfig) -> Result<ConnectionPool> {
        let client = Client::open(config.connection_info()).map_err(ExportError::Connection)?;
        let first = client.get_connection().map_err(ExportError::Connection)?;
        info!(
            "connected to {}:{} db {}",
            config.host, config.port, config.db
        );

        Ok(ConnectionPool {
            client,
            idle: vec![first],
        })
    }

    /// Runs `f` on a pooled connection.
    ///
    /// Request errors are returned as-is so callers can attach the operation
    /// they were running; only dial failures map to `ExportError::Connection`.
    pub fn with_conn<T, F>(&mut self, f: F) -> Result<RedisResult<T>>
    where
        F: FnOnce(&mut Connection) -> RedisResult<T>,
    {
        let mut conn = self.checkout()?;
        let result = f(&mut conn);
        match &result {
            Err(e) if e.is_io_error() || e.is_connection_dropped() => {}
            _ => self.release(conn),
        }
        Ok(result)
    }

    /// Drops every idle connection.
    pub fn close_all(&mut self) {
        if !self.idle.is_empty() {
            info!("closing {} idle connection(s)", self.idle.len());
        }
        self.idle.clear();
    }

    fn checkout(&mut self) -> Result<Connection> {
        while let Some(mut conn) = self.idle.pop() {
            match redis::cmd("PING").query::<String>(&mut conn) {
                Ok(_) => return Ok(conn),
                Err(e) => warn!("discarding idle connection: {}", e),
            }
        }
        self.client.get_connection().map_err(ExportError::Connection)
    }

    fn release(&mut self, conn: Connection) {
        if self.idle.len() < MAX_IDLE {
            self.idle.push(conn);
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close_all();
    }
}
