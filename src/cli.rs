use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::pool::ConnectionConfig;

const USAGE_HINTS: &str = "\
Export example: redis-export -h 127.0.0.1 -p 6379 -k redisKey
Import example: cat output-file | redis-cli -h 127.0.0.1 -p 6379";

#[derive(Parser, Debug)]
#[command(name = "redis-export")]
#[command(version, about = "Export Redis keys as replayable restore commands")]
#[command(disable_help_flag = true, after_help = USAGE_HINTS)]
pub struct Cli {
    /// Redis host
    #[arg(short = 'h', default_value = "127.0.0.1")]
    pub host: String,

    /// Port
    #[arg(short = 'p', default_value_t = 6379)]
    pub port: u16,

    /// Username
    #[arg(short = 'u', default_value = "")]
    pub username: String,

    /// Password
    #[arg(short = 'P', default_value = "")]
    pub password: String,

    /// Database number
    #[arg(short = 'n', default_value_t = 0)]
    pub db: i64,

    /// Key name
    #[arg(short = 'k', default_value = "")]
    pub key: String,

    /// Match pattern for a full keyspace scan
    #[arg(short = 's', default_value = "")]
    pub scan: String,

    /// Directory for the bulk export file
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl Cli {
    /// True when at least one of `-k` or `-s` was given.
    pub fn selector_given(&self) -> bool {
        !self.key.is_empty() || !self.scan.is_empty()
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        fn non_empty(s: &str) -> Option<String> {
            (!s.is_empty()).then(|| s.to_string())
        }

        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: non_empty(&self.username),
            password: non_empty(&self.password),
            db: self.db,
        }
    }
}
