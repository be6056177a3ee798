//! In-process store.
//!
//! Keeps ledgers in memory and journals every apply attempt in order.
//! Scripts are not interpreted; individual units can be told to fail.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::migration::MigrationUnit;
use crate::store::{ApplyError, MigrationStore, StoreError};

/// One apply attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub ledger: String,
    pub unit: String,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct Inner {
    ledgers: HashMap<String, Vec<String>>,
    journal: Vec<Attempt>,
    failing_scripts: HashSet<String>,
    failing_records: HashSet<String>,
    unavailable_ledgers: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the script of `unit` fail on every attempt.
    pub fn fail_script(&self, unit: &str) -> &Self {
        self.lock().failing_scripts.insert(unit.to_string());
        self
    }

    /// Let the script of `unit` run but fail to record it.
    pub fn fail_record(&self, unit: &str) -> &Self {
        self.lock().failing_records.insert(unit.to_string());
        self
    }

    /// Make `ledger` impossible to create or read.
    pub fn make_unavailable(&self, ledger: &str) -> &Self {
        self.lock().unavailable_ledgers.insert(ledger.to_string());
        self
    }

    /// Stop failing `unit`.
    pub fn heal(&self, unit: &str) -> &Self {
        let mut inner = self.lock();
        inner.failing_scripts.remove(unit);
        inner.failing_records.remove(unit);
        self
    }

    /// Units recorded in `ledger`, in the order they were recorded.
    pub fn recorded(&self, ledger: &str) -> Vec<String> {
        self.lock().ledgers.get(ledger).cloned().unwrap_or_default()
    }

    /// Every apply attempt so far, in order.
    pub fn journal(&self) -> Vec<Attempt> {
        self.lock().journal.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn prepare_ledger(&self, ledger: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.unavailable_ledgers.contains(ledger) {
            return Err(StoreError::Rejected(format!("ledger {} is unavailable", ledger)));
        }
        inner.ledgers.entry(ledger.to_string()).or_default();
        Ok(())
    }

    async fn applied_units(&self, ledger: &str) -> Result<BTreeSet<String>, StoreError> {
        let inner = self.lock();
        if inner.unavailable_ledgers.contains(ledger) {
            return Err(StoreError::Rejected(format!("ledger {} is unavailable", ledger)));
        }
        Ok(inner
            .ledgers
            .get(ledger)
            .map(|units| units.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply_unit(&self, ledger: &str, unit: &MigrationUnit) -> Result<(), ApplyError> {
        let mut inner = self.lock();
        let script_fails = inner.failing_scripts.contains(&unit.name);
        inner.journal.push(Attempt {
            ledger: ledger.to_string(),
            unit: unit.name.clone(),
            succeeded: !script_fails,
        });

        if script_fails {
            return Err(ApplyError::Script(StoreError::Rejected(format!(
                "script {} rejected",
                unit.name
            ))));
        }
        if inner.failing_records.contains(&unit.name) {
            return Err(ApplyError::Record(StoreError::Rejected(format!(
                "ledger {} refused {}",
                ledger, unit.name
            ))));
        }

        inner
            .ledgers
            .entry(ledger.to_string())
            .or_default()
            .push(unit.name.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> MigrationUnit {
        MigrationUnit::parse(name, "SELECT 1;")
    }

    #[tokio::test]
    async fn records_applied_units() {
        let store = MemoryStore::new();
        store.prepare_ledger("ledger").await.unwrap();
        store.apply_unit("ledger", &unit("1.sql")).await.unwrap();

        let applied = store.applied_units("ledger").await.unwrap();
        assert!(applied.contains("1.sql"));
        assert_eq!(store.recorded("ledger"), vec!["1.sql"]);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryStore::new();
        store.fail_script("bad.sql").fail_record("lost.sql");

        assert!(matches!(
            store.apply_unit("l", &unit("bad.sql")).await,
            Err(ApplyError::Script(_))
        ));
        assert!(matches!(
            store.apply_unit("l", &unit("lost.sql")).await,
            Err(ApplyError::Record(_))
        ));
        assert!(store.recorded("l").is_empty());
        assert_eq!(store.journal().len(), 2);
    }

    #[tokio::test]
    async fn unavailable_ledger() {
        let store = MemoryStore::new();
        store.make_unavailable("l");
        assert!(store.prepare_ledger("l").await.is_err());
        assert!(store.applied_units("l").await.is_err());
    }
}
