//! Exact-match backend on top of a remote key-value service.
//!
//! Lookups run on a worker thread so they can overlap with other work; the
//! finder waits for the reply at most `wait`. Any connectivity failure
//! disables the backend for the rest of the session.

use super::{Answer, CacheKey, Finder, FinderStats};
use crate::assignment::AssignmentRecord;
use crate::expr::serialize::{encode, Decoder, ExprRecord};
use crate::expr::ArrayCache;
use crate::util::polynomial_hash;
use anyhow::Result;
use log::{debug, trace, warn};
use redis::{Client, Commands, Connection, RedisResult};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;

//
// Public Interface
//

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis request failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store lock is poisoned")]
    Poisoned,
}

/// Minimal get/set service. Implementations are shared with lookup threads.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Redis server as store. The connection is opened lazily and reopened
/// after a failed command.
pub struct RedisStore {
    client: Client,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl RedisStore {
    pub fn open(
        address: &str,
        port: u16,
        database: u32,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let url = format!("redis://{}:{}/{}", address, port, database);
        let client = Client::open(url.as_str())?;

        Ok(Self {
            client,
            timeout,
            connection: Mutex::new(None),
        })
    }
}

impl KeyValueStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_connection(|connection| connection.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_connection(|connection| connection.set(key, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum KeyMode {
    /// Decimal polynomial hash over the structural hashes of the key.
    Hash,
    /// Serialized expressions, collision free but long.
    Structural,
}

pub struct RemoteFinder {
    store: Arc<dyn KeyValueStore>,
    arrays: ArrayCache,
    namespace: String,
    mode: KeyMode,
    wait: Duration,
    enabled: bool,
    pending: Option<PendingLookup>,
    stats: FinderStats,
}

impl RemoteFinder {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        arrays: &ArrayCache,
        namespace: &str,
        mode: KeyMode,
        wait: Duration,
    ) -> Self {
        Self {
            store,
            arrays: arrays.clone(),
            namespace: namespace.to_string(),
            mode,
            wait,
            enabled: true,
            pending: None,
            stats: FinderStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn lookup_key(&self, key: &CacheKey) -> String {
        match self.mode {
            KeyMode::Hash => format!("{}{}", self.namespace, polynomial_hash(key.hashes())),
            KeyMode::Structural => {
                let records: Vec<ExprRecord> = key.exprs().iter().map(encode).collect();
                match serde_json::to_string(&records) {
                    Ok(text) => format!("{}{}", self.namespace, text),
                    Err(e) => {
                        warn!("falling back to hashed remote key: {}", e);
                        format!("{}{}", self.namespace, polynomial_hash(key.hashes()))
                    }
                }
            }
        }
    }
}

impl Finder for RemoteFinder {
    fn name(&self) -> &str {
        "remote"
    }

    fn prefetch(&mut self, key: &CacheKey) {
        if !self.enabled || key.is_empty() {
            return;
        }
        let lookup = self.lookup_key(key);
        if matches!(&self.pending, Some(pending) if pending.key == lookup) {
            return;
        }

        let (sender, reply) = mpsc::channel();
        let store = Arc::clone(&self.store);
        let request = lookup.clone();
        thread::spawn(move || {
            // the receiver may have given up waiting already
            let _ = sender.send(store.get(&request));
        });
        trace!("started remote lookup of {}", lookup);
        self.pending = Some(PendingLookup { key: lookup, reply });
    }

    fn find(&mut self, key: &CacheKey) -> Option<Answer> {
        let found = self.lookup(key);
        self.stats.record(&found);
        found
    }

    fn insert(&mut self, key: &CacheKey, answer: &Answer) {
        if !self.enabled || key.is_empty() {
            return;
        }
        let lookup = self.lookup_key(key);
        let value = match serde_json::to_string(&AssignmentRecord::encode(answer.as_deref())) {
            Ok(value) => value,
            Err(e) => {
                warn!("cannot serialize answer for remote store: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(&lookup, &value) {
            self.disable(e);
        }
    }

    fn persist(&mut self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> FinderStats {
        self.stats
    }
}

//
// Private Implementation
//

struct PendingLookup {
    key: String,
    reply: Receiver<Result<Option<String>, StoreError>>,
}

impl RemoteFinder {
    fn lookup(&mut self, key: &CacheKey) -> Option<Answer> {
        if !self.enabled || key.is_empty() {
            return None;
        }
        self.prefetch(key);
        let pending = self.pending.take()?;

        match pending.reply.recv_timeout(self.wait) {
            Ok(Ok(Some(text))) => self.decode(&text),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                self.disable(e);
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!("remote lookup took longer than {:?}, treating as miss", self.wait);
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn decode(&self, text: &str) -> Option<Answer> {
        let decoded = serde_json::from_str::<AssignmentRecord>(text)
            .map_err(|e| e.to_string())
            .and_then(|record| {
                record
                    .decode(&Decoder::new(&self.arrays))
                    .map_err(|e| e.to_string())
            });
        match decoded {
            Ok(answer) => Some(answer.map(Rc::new)),
            Err(e) => {
                debug!("ignoring undecodable remote entry: {}", e);
                None
            }
        }
    }

    fn disable(&mut self, error: StoreError) {
        warn!("remote store unreachable, disabling it for this session: {}", error);
        self.enabled = false;
        self.pending = None;
    }
}

impl RedisStore {
    fn with_connection<T, F>(&self, command: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> RedisResult<T>,
    {
        let mut guard = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        let mut connection = match guard.take() {
            Some(connection) => connection,
            None => self.connect()?,
        };

        let result = command(&mut connection)?;
        *guard = Some(connection);
        Ok(result)
    }

    fn connect(&self) -> RedisResult<Connection> {
        let connection = self.client.get_connection_with_timeout(self.timeout)?;
        connection.set_read_timeout(Some(self.timeout))?;
        connection.set_write_timeout(Some(self.timeout))?;
        debug!("connected to redis at {:?}", self.client.get_connection_info().addr);
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::Assignment;
    use crate::expr::Expr;
    use std::io;
    use std::net::TcpListener;
    use std::str::FromStr;

    fn refused() -> StoreError {
        StoreError::Redis(io::Error::from(io::ErrorKind::ConnectionRefused).into())
    }

    struct UnreachableStore;

    impl KeyValueStore for UnreachableStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(refused())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(refused())
        }
    }

    struct SlowStore;

    impl KeyValueStore for SlowStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            thread::sleep(Duration::from_millis(500));
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn sample_key(arrays: &ArrayCache, name: &str) -> CacheKey {
        let x = Expr::read_at(&arrays.create_array(name, 1, None, Expr::INT32, Expr::INT8), 0);
        CacheKey::new(vec![Expr::eq(&x, &Expr::constant_u64(10, Expr::INT8))])
    }

    fn finder(store: Arc<dyn KeyValueStore>, arrays: &ArrayCache, mode: KeyMode) -> RemoteFinder {
        RemoteFinder::new(store, arrays, "test:", mode, Duration::from_secs(2))
    }

    #[test]
    fn answers_round_trip_through_the_store() {
        let arrays = ArrayCache::new();
        let store = Arc::new(MemoryStore::new());
        let key = sample_key(&arrays, "x");
        let x = arrays.create_array("x", 1, None, Expr::INT32, Expr::INT8);
        let model = Assignment::new(&[x], vec![vec![10]], true).unwrap();

        let mut writer = finder(store.clone(), &arrays, KeyMode::Hash);
        writer.insert(&key, &Some(Rc::new(model.clone())));
        assert_eq!(store.len(), 1);

        let mut reader = finder(store, &arrays, KeyMode::Hash);
        let found = reader.find(&key);
        assert_eq!(found.and_then(|a| a).as_deref(), Some(&model));
        assert_eq!(reader.find(&sample_key(&arrays, "y")), None);
        assert_eq!(reader.stats().hits, 1);
    }

    #[test]
    fn unsat_answers_are_stored_as_no_binding() {
        let arrays = ArrayCache::new();
        let store = Arc::new(MemoryStore::new());
        let key = sample_key(&arrays, "x");

        let mut remote = finder(store, &arrays, KeyMode::Structural);
        remote.insert(&key, &None);

        assert_eq!(remote.find(&key), Some(None));
        assert!(remote.lookup_key(&key).starts_with("test:["));
    }

    #[test]
    fn connectivity_failures_disable_the_backend() {
        let arrays = ArrayCache::new();
        let key = sample_key(&arrays, "x");
        let mut remote = finder(Arc::new(UnreachableStore), &arrays, KeyMode::Hash);

        assert_eq!(remote.find(&key), None);
        assert!(!remote.is_enabled());
        assert_eq!(remote.find(&key), None);
        assert_eq!(remote.stats().misses, 2);
    }

    #[test]
    fn slow_lookups_degrade_to_a_miss() {
        let arrays = ArrayCache::new();
        let key = sample_key(&arrays, "x");
        let mut remote = RemoteFinder::new(
            Arc::new(SlowStore),
            &arrays,
            "",
            KeyMode::Hash,
            Duration::from_millis(10),
        );

        remote.prefetch(&key);
        assert_eq!(remote.find(&key), None);
        assert!(remote.is_enabled());
    }

    #[test]
    fn key_modes_parse_from_lowercase_names() {
        assert_eq!(KeyMode::from_str("hash"), Ok(KeyMode::Hash));
        assert_eq!(KeyMode::from_str("structural"), Ok(KeyMode::Structural));
        assert_eq!(KeyMode::Structural.to_string(), "structural");
    }

    #[test]
    fn unreachable_servers_report_redis_errors() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = RedisStore::open("127.0.0.1", port, 2, Duration::from_millis(200)).unwrap();

        assert!(matches!(store.get("key"), Err(StoreError::Redis(_))));
        assert!(matches!(store.set("key", "value"), Err(StoreError::Redis(_))));
    }

    #[test]
    fn unreachable_servers_disable_the_finder() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = RedisStore::open("127.0.0.1", port, 0, Duration::from_millis(200)).unwrap();
        let arrays = ArrayCache::new();
        let key = sample_key(&arrays, "x");
        let mut remote = finder(Arc::new(store), &arrays, KeyMode::Hash);

        remote.insert(&key, &None);
        assert!(!remote.is_enabled());
        assert_eq!(remote.find(&key), None);
    }
}
