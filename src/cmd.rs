use std::fmt::{self, Write};

use crate::store::KeyValue;

// A restore command that redis-cli can replay to rebuild one key.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreCommand {
    Set { key: Vec<u8>, value: Vec<u8> },
    HMSet { key: Vec<u8>, fields: Vec<(Vec<u8>, Vec<u8>)> },
    // Values in fetch order; LPUSH replays them reversed.
    LPush { key: Vec<u8>, values: Vec<Vec<u8>> },
    SAdd { key: Vec<u8>, members: Vec<Vec<u8>> },
    // (member, score) in descending rank.
    ZAdd { key: Vec<u8>, entries: Vec<(Vec<u8>, String)> },
}

impl RestoreCommand {
    pub fn from_value(key: &[u8], value: KeyValue) -> RestoreCommand {
        let key = key.to_vec();
        match value {
            KeyValue::String(value) => RestoreCommand::Set { key, value },
            KeyValue::Hash(fields) => RestoreCommand::HMSet { key, fields },
            KeyValue::List(values) => RestoreCommand::LPush { key, values },
            KeyValue::Set(members) => RestoreCommand::SAdd { key, members },
            KeyValue::SortedSet(mut entries) => {
                entries.reverse();
                RestoreCommand::ZAdd { key, entries }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RestoreCommand::Set { .. } => "SET",
            RestoreCommand::HMSet { .. } => "HMSET",
            RestoreCommand::LPush { .. } => "LPUSH",
            RestoreCommand::SAdd { .. } => "SADD",
            RestoreCommand::ZAdd { .. } => "ZADD",
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            RestoreCommand::Set { key, .. }
            | RestoreCommand::HMSet { key, .. }
            | RestoreCommand::LPush { key, .. }
            | RestoreCommand::SAdd { key, .. }
            | RestoreCommand::ZAdd { key, .. } => key,
        }
    }
}

impl fmt::Display for RestoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = format!("{} {}", self.name(), token(self.key()));
        match self {
            RestoreCommand::Set { value, .. } => {
                line.push(' ');
                line.push_str(&quote(value));
            }
            RestoreCommand::HMSet { fields, .. } => {
                for (field, value) in fields {
                    write!(line, " {} {}", token(field), quote(value))?;
                }
            }
            RestoreCommand::LPush { values: items, .. }
            | RestoreCommand::SAdd { members: items, .. } => {
                for item in items {
                    line.push(' ');
                    line.push_str(&quote(item));
                }
            }
            RestoreCommand::ZAdd { entries, .. } => {
                for (member, score) in entries {
                    write!(line, " {} {}", score, quote(member))?;
                }
            }
        }
        f.write_str(&line)
    }
}

/// Wraps bytes in double quotes using escapes redis-cli understands.
///
/// Printable UTF-8 is kept as is; control bytes and invalid UTF-8 become
/// `\xHH`.
pub fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');

    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                escape_str(valid, &mut out);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // valid_up_to marks a UTF-8 boundary
                if let Ok(valid) = std::str::from_utf8(valid) {
                    escape_str(valid, &mut out);
                }
                let bad = e.error_len().unwrap_or(after.len());
                for b in &after[..bad] {
                    let _ = write!(out, "\\x{:02x}", b);
                }
                rest = &after[bad..];
            }
        }
    }

    out.push('"');
    out
}

fn escape_str(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

/// Key and field names go out bare when they already form one safe token.
pub fn token(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if is_bare(s) => s.to_string(),
        _ => quote(bytes),
    }
}

fn is_bare(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '"' && c != '\'' && c != '\\')
}
