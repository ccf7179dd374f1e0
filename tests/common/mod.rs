#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use r2_session_vault::error::{AppError, Result};
use r2_session_vault::{AppState, Config, Credentials, MemoryStore, SessionStore};

pub const PRIMARY_KEY: &str = "a1b2c3d4e5f678901234567890123456";
pub const SECOND_KEY: &str = "Zq8Lp2Wm5Rt7Yx1Nc4Vb6Hj9Gk3Df0Sa";
pub const THIRD_KEY: &str = "k7J2m9P4q1W8e5R3t6Y0u2I7o4P9a1S5";

/// Fewer rounds than production so the suite stays fast.
pub const TEST_KDF_ITERATIONS: u32 = 10_000;

pub static CREDENTIALS: Lazy<Credentials> = Lazy::new(|| {
    Credentials::new(
        "a1b2c3d4e5f678901234567890123456",
        "12345678901234567890",
        "1234567890123456789012345678901234567890",
        "test-bucket",
    )
});

pub fn test_config() -> Config {
    Config::new(PRIMARY_KEY)
        .unwrap()
        .with_kdf_iterations(TEST_KDF_ITERATIONS)
        .unwrap()
}

/// A `MemoryStore` that can be switched into failure and counts reads.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_all: Arc<AtomicBool>,
    fail_sessions: Arc<AtomicBool>,
    fail_reads_of: Arc<Mutex<Option<String>>>,
    fail_writes_to: Arc<Mutex<Option<String>>>,
    reads: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Fails every `get` whose key starts with `prefix`.
    pub fn fail_reads_of(&self, prefix: Option<&str>) {
        *self.fail_reads_of.lock().unwrap() = prefix.map(str::to_string);
    }

    /// Fails every `put` whose key starts with `prefix`.
    pub fn fail_writes_to(&self, prefix: Option<&str>) {
        *self.fail_writes_to.lock().unwrap() = prefix.map(str::to_string);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst)
            || (self.fail_sessions.load(Ordering::SeqCst) && key.starts_with("session:"))
        {
            return Err(AppError::Store("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_prefix(filter: &Mutex<Option<String>>, key: &str) -> Result<()> {
        match filter.lock().unwrap().as_deref() {
            Some(prefix) if key.starts_with(prefix) => {
                Err(AppError::Store("connection reset".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check(key)?;
        Self::check_prefix(&self.fail_reads_of, key)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        self.check(key)?;
        Self::check_prefix(&self.fail_writes_to, key)?;
        self.inner.put(key, value, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.delete(key).await
    }
}

pub fn memory_state(config: &Config) -> (AppState, MemoryStore) {
    let store = MemoryStore::new();
    let state = AppState::with_store(config, Arc::new(store.clone())).unwrap();
    (state, store)
}

pub fn flaky_state(config: &Config) -> (AppState, FlakyStore) {
    let store = FlakyStore::new();
    let state = AppState::with_store(config, Arc::new(store.clone())).unwrap();
    (state, store)
}
