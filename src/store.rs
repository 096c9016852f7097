use std::fmt;

use log::{debug, info};
use redis::Value;

use crate::error::{ExportError, Result};
use crate::pool::ConnectionPool;

/// COUNT hint sent with every SCAN call. The server treats it as advisory.
pub const SCAN_COUNT: usize = 100;

/// Cursor value that both starts and ends a scan.
pub const SCAN_START: &str = "0";

/// Type of a key as reported by `TYPE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
    SortedSet,
    Unsupported(String),
}

impl KeyType {
    pub fn parse(name: &str) -> KeyType {
        match name {
            "string" => KeyType::String,
            "hash" => KeyType::Hash,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::SortedSet,
            other => KeyType::Unsupported(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::SortedSet => "zset",
            KeyType::Unsupported(other) => other,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full value of a key, materialized in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    String(Vec<u8>),
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
    List(Vec<Vec<u8>>),
    Set(Vec<Vec<u8>>),
    /// `(member, score)` in ascending rank; the score is the literal reply text.
    SortedSet(Vec<(Vec<u8>, String)>),
}

impl KeyValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::String(_) => KeyType::String,
            KeyValue::Hash(_) => KeyType::Hash,
            KeyValue::List(_) => KeyType::List,
            KeyValue::Set(_) => KeyType::Set,
            KeyValue::SortedSet(_) => KeyType::SortedSet,
        }
    }

    /// Human-readable dump for debug logging.
    pub fn describe(&self, key: &[u8]) -> String {
        let key = String::from_utf8_lossy(key);

        fn lossy(bytes: &[u8]) -> String {
            String::from_utf8_lossy(bytes).into_owned()
        }
        fn join(items: &[Vec<u8>]) -> String {
            items.iter().map(|v| lossy(v)).collect::<Vec<_>>().join(" ")
        }

        match self {
            KeyValue::String(v) => format!("{} string value: {}", key, lossy(v)),
            KeyValue::Hash(pairs) => {
                let body = pairs
                    .iter()
                    .map(|(f, v)| format!("{}:{}", lossy(f), lossy(v)))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{} hash map: map[{}]", key, body)
            }
            KeyValue::List(items) => format!("{} list values: {}", key, join(items)),
            KeyValue::Set(items) => format!("{} set values: {}", key, join(items)),
            KeyValue::SortedSet(pairs) => {
                let body = pairs
                    .iter()
                    .map(|(m, s)| format!("{} {}", lossy(m), s))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{} sorted set values: [{}]", key, body)
            }
        }
    }
}

/// Read side of the store, one request per call.
pub trait KeySource {
    /// Never fails: any error counts as "does not exist".
    fn exists(&mut self, key: &[u8]) -> bool;

    fn key_type(&mut self, key: &[u8]) -> Result<KeyType>;

    fn get_string(&mut self, key: &[u8]) -> Result<Vec<u8>>;

    fn get_hash(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn get_list(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>>;

    fn get_set(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>>;

    fn get_sorted_set(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, String)>>;

    /// One SCAN page: returns the next cursor and the keys on this page.
    fn scan_page(&mut self, pattern: &str, cursor: &str) -> Result<(String, Vec<Vec<u8>>)>;

    /// Fetches the full value for a key of the given type.
    fn fetch(&mut self, key: &[u8], key_type: &KeyType) -> Result<KeyValue> {
        match key_type {
            KeyType::String => self.get_string(key).map(KeyValue::String),
            KeyType::Hash => self.get_hash(key).map(KeyValue::Hash),
            KeyType::List => self.get_list(key).map(KeyValue::List),
            KeyType::Set => self.get_set(key).map(KeyValue::Set),
            KeyType::SortedSet => self.get_sorted_set(key).map(KeyValue::SortedSet),
            KeyType::Unsupported(name) => Err(ExportError::UnsupportedType(name.clone())),
        }
    }
}

/// Walks the keyspace with SCAN until the cursor comes back to `"0"`.
///
/// Always sends at least one request. Keys are not deduplicated.
pub fn scan_keys<S: KeySource + ?Sized>(source: &mut S, pattern: &str) -> Result<Vec<Vec<u8>>> {
    let mut cursor = SCAN_START.to_string();
    let mut all_keys = Vec::new();

    loop {
        let (next, keys) = source.scan_page(pattern, &cursor)?;
        info!("scan {} cursor {} -> {} ({} keys)", pattern, cursor, next, keys.len());
        all_keys.extend(keys);
        cursor = next;
        if cursor == SCAN_START {
            break;
        }
    }

    Ok(all_keys)
}

/// Validates the shape of a SCAN reply: `[cursor, [key, ...]]`.
pub fn parse_scan_reply(reply: Value) -> Result<(String, Vec<Vec<u8>>)> {
    let mut parts = match reply {
        Value::Bulk(parts) if parts.len() == 2 => parts,
        _ => return Err(ExportError::MalformedScan("scan result error".to_string())),
    };

    let keys_part = parts.pop();
    let cursor = match parts.pop() {
        Some(Value::Data(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => return Err(ExportError::MalformedScan("scan result[0] error".to_string())),
    };

    let items = match keys_part {
        Some(Value::Bulk(items)) => items,
        _ => return Err(ExportError::MalformedScan("scan result[1] error".to_string())),
    };

    let mut keys = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            // key names are binary safe, keep the raw bytes
            Value::Data(bytes) => keys.push(bytes),
            _ => {
                return Err(ExportError::MalformedScan(format!(
                    "scan result[1][{}] error",
                    i
                )))
            }
        }
    }

    Ok((cursor, keys))
}

impl KeySource for ConnectionPool {
    fn exists(&mut self, key: &[u8]) -> bool {
        let reply = self
            .with_conn(|c| redis::cmd("EXISTS").arg(key).query::<bool>(c))
            .and_then(|r| r.map_err(|e| ExportError::transport("EXISTS", key, e)));
        match reply {
            Ok(exists) => exists,
            Err(e) => {
                debug!(
                    "EXISTS {} failed, treating as missing: {}",
                    String::from_utf8_lossy(key),
                    e
                );
                false
            }
        }
    }

    fn key_type(&mut self, key: &[u8]) -> Result<KeyType> {
        let name: String = self
            .with_conn(|c| redis::cmd("TYPE").arg(key).query(c))?
            .map_err(|e| ExportError::transport("TYPE", key, e))?;
        Ok(KeyType::parse(&name))
    }

    fn get_string(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_conn(|c| redis::cmd("GET").arg(key).query(c))?
            .map_err(|e| ExportError::transport("GET", key, e))
    }

    fn get_hash(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.with_conn(|c| redis::cmd("HGETALL").arg(key).query(c))?
            .map_err(|e| ExportError::transport("HGETALL", key, e))
    }

    fn get_list(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.with_conn(|c| redis::cmd("LRANGE").arg(key).arg(0).arg(-1).query(c))?
            .map_err(|e| ExportError::transport("LRANGE", key, e))
    }

    fn get_set(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.with_conn(|c| redis::cmd("SMEMBERS").arg(key).query(c))?
            .map_err(|e| ExportError::transport("SMEMBERS", key, e))
    }

    fn get_sorted_set(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, String)>> {
        self.with_conn(|c| {
            redis::cmd("ZRANGE")
                .arg(key)
                .arg(0)
                .arg(-1)
                .arg("WITHSCORES")
                .query(c)
        })?
        .map_err(|e| ExportError::transport("ZRANGE", key, e))
    }

    fn scan_page(&mut self, pattern: &str, cursor: &str) -> Result<(String, Vec<Vec<u8>>)> {
        let reply: Value = self
            .with_conn(|c| {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query(c)
            })?
            .map_err(|e| ExportError::transport("SCAN", pattern.as_bytes(), e))?;
        parse_scan_reply(reply)
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemorySource;
    use super::*;

    fn data(s: &str) -> Value {
        Value::Data(s.as_bytes().to_vec())
    }

    fn names(keys: &[&str]) -> Vec<Vec<u8>> {
        keys.iter().map(|k| k.as_bytes().to_vec()).collect()
    }

    #[test]
    fn parses_type_names() {
        assert_eq!(KeyType::parse("string"), KeyType::String);
        assert_eq!(KeyType::parse("hash"), KeyType::Hash);
        assert_eq!(KeyType::parse("list"), KeyType::List);
        assert_eq!(KeyType::parse("set"), KeyType::Set);
        assert_eq!(KeyType::parse("zset"), KeyType::SortedSet);
        assert_eq!(
            KeyType::parse("none"),
            KeyType::Unsupported("none".to_string())
        );
        assert_eq!(KeyType::parse("stream").to_string(), "stream");
    }

    #[test]
    fn fetch_rejects_unsupported_types() {
        let mut source = MemorySource::default();
        let err = source
            .fetch(b"k", &KeyType::Unsupported("stream".to_string()))
            .unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedType(ref t) if t == "stream"));
    }

    #[test]
    fn fetch_dispatches_by_type() {
        let mut source = MemorySource::default()
            .with("l", KeyValue::List(vec![b"a".to_vec(), b"b".to_vec()]));
        let value = source.fetch(b"l", &KeyType::List).unwrap();
        assert_eq!(value, KeyValue::List(vec![b"a".to_vec(), b"b".to_vec()]));
    }

    #[test]
    fn scan_always_issues_one_request() {
        let mut source = MemorySource::default().page("0", &["only"]);
        let keys = scan_keys(&mut source, "*").unwrap();
        assert_eq!(keys, names(&["only"]));
        assert_eq!(source.scan_calls, vec!["0".to_string()]);
    }

    #[test]
    fn scan_follows_cursor_until_zero() {
        let mut source = MemorySource::default()
            .page("17", &["a", "b"])
            .page::<&str>("9", &[])
            .page("0", &["c", "a"]);
        let keys = scan_keys(&mut source, "*").unwrap();
        // duplicates from the server are passed through
        assert_eq!(keys, names(&["a", "b", "c", "a"]));
        assert_eq!(source.scan_calls, vec!["0", "17", "9"]);
    }

    #[test]
    fn scan_error_discards_progress() {
        let mut source = MemorySource::default().page("5", &["a"]);
        source
            .pages
            .push_back(Err(ExportError::MalformedScan("scan result error".to_string())));
        let err = scan_keys(&mut source, "user:*").unwrap_err();
        assert!(matches!(err, ExportError::MalformedScan(_)));
    }

    #[test]
    fn parses_well_formed_scan_reply() {
        let reply = Value::Bulk(vec![data("42"), Value::Bulk(vec![data("a"), data("b")])]);
        let (cursor, keys) = parse_scan_reply(reply).unwrap();
        assert_eq!(cursor, "42");
        assert_eq!(keys, names(&["a", "b"]));
    }

    #[test]
    fn scan_keeps_binary_key_names_intact() {
        let reply = Value::Bulk(vec![
            data("0"),
            Value::Bulk(vec![Value::Data(vec![b'k', 0xff]), data("plain")]),
        ]);
        let (_, keys) = parse_scan_reply(reply).unwrap();
        assert_eq!(keys, vec![vec![b'k', 0xff], b"plain".to_vec()]);
    }

    #[test]
    fn rejects_scan_reply_of_wrong_length() {
        let reply = Value::Bulk(vec![data("0")]);
        let err = parse_scan_reply(reply).unwrap_err();
        assert_eq!(err.to_string(), "scan result error");

        let err = parse_scan_reply(Value::Nil).unwrap_err();
        assert_eq!(err.to_string(), "scan result error");
    }

    #[test]
    fn rejects_non_bulk_cursor() {
        let reply = Value::Bulk(vec![Value::Int(0), Value::Bulk(vec![])]);
        let err = parse_scan_reply(reply).unwrap_err();
        assert_eq!(err.to_string(), "scan result[0] error");
    }

    #[test]
    fn rejects_non_array_key_list() {
        let reply = Value::Bulk(vec![data("0"), data("a")]);
        let err = parse_scan_reply(reply).unwrap_err();
        assert_eq!(err.to_string(), "scan result[1] error");
    }

    #[test]
    fn reports_position_of_bad_key_entry() {
        let reply = Value::Bulk(vec![
            data("0"),
            Value::Bulk(vec![data("a"), data("b"), Value::Int(7)]),
        ]);
        let err = parse_scan_reply(reply).unwrap_err();
        assert_eq!(err.to_string(), "scan result[1][2] error");
    }

    #[test]
    fn describes_values_for_debug_output() {
        let value = KeyValue::String(b"hi there".to_vec());
        assert_eq!(value.describe(b"greeting"), "greeting string value: hi there");

        let value = KeyValue::SortedSet(vec![(b"m".to_vec(), "1.5".to_string())]);
        assert_eq!(value.describe(b"z"), "z sorted set values: [m 1.5]");
    }
}
