//! # Transaction Management Module
//!
//! Transaction lifecycle for the engine: BEGIN, COMMIT, ROLLBACK, and named
//! savepoints for partial rollback.
//!
//! ## Model
//!
//! The engine holds one active transaction at a time. Inside a transaction,
//! mutating operations never touch table memory or disk — they are
//! validated against the transaction's overlay state and appended to an
//! ordered buffer. COMMIT applies the whole buffer atomically; ROLLBACK
//! discards it.
//!
//! ## Transaction States
//!
//! ```text
//! ┌────────┐   BEGIN    ┌────────┐   COMMIT   ┌───────────┐
//! │  None  │ ─────────► │ Active │ ─────────► │ Committed │
//! └────────┘            └────────┘            └───────────┘
//!                          │   │ ROLLBACK    ┌────────────┐
//!                          │   └───────────► │ RolledBack │
//!                          │ TTL sweep       └────────────┘
//!                          ▼
//!                      ┌─────────┐
//!                      │ Aborted │
//!                      └─────────┘
//! ```
//!
//! ## Savepoints
//!
//! A savepoint records the buffer length at creation time. Rolling back to
//! a savepoint truncates the buffer to that length and discards any deeper
//! savepoints; the target savepoint itself stays valid for reuse. Creating
//! a savepoint with an existing name shadows the older one.
//!
//! ## Isolation
//!
//! The declared isolation level is recorded and logged but has no runtime
//! effect: all transactions observe the same in-memory state. This is a
//! deliberate simplification, surfaced in the user-facing docs.

use crate::config::SAVEPOINT_STACK_INLINE;
use crate::sql::IsolationLevel;
use crate::storage::TableMutation;
use eyre::{bail, Result};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::time::{Duration, SystemTime};

/// Transaction lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
    Aborted,
}

/// Named checkpoint within a transaction for partial rollback.
#[derive(Debug, Clone)]
pub struct Savepoint {
    pub name: String,
    pub buffer_len: usize,
}

/// One transaction: identity, state, isolation intent, and the ordered
/// buffer of operations awaiting commit.
#[derive(Debug)]
pub struct Transaction {
    id: String,
    state: TxnState,
    isolation: IsolationLevel,
    started_at: SystemTime,
    ended_at: Option<SystemTime>,
    buffer: Vec<TableMutation>,
    savepoints: SmallVec<[Savepoint; SAVEPOINT_STACK_INLINE]>,
}

impl Transaction {
    fn new(id: String, isolation: IsolationLevel) -> Self {
        Self {
            id,
            state: TxnState::Active,
            isolation,
            started_at: SystemTime::now(),
            ended_at: None,
            buffer: Vec::new(),
            savepoints: SmallVec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<SystemTime> {
        self.ended_at
    }

    pub fn buffer(&self) -> &[TableMutation] {
        &self.buffer
    }

    pub fn push(&mut self, op: TableMutation) {
        self.buffer.push(op);
    }

    /// Records a savepoint at the current buffer depth and returns that
    /// depth. A duplicate name shadows the earlier savepoint.
    pub fn create_savepoint(&mut self, name: &str) -> usize {
        let depth = self.buffer.len();
        self.savepoints.push(Savepoint {
            name: name.to_string(),
            buffer_len: depth,
        });
        depth
    }

    /// Truncates the buffer back to the named savepoint. The savepoint
    /// remains valid; deeper savepoints are discarded.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<usize> {
        let Some(target) = self
            .savepoints
            .iter()
            .rev()
            .find(|sp| sp.name == name)
            .map(|sp| sp.buffer_len)
        else {
            bail!("Savepoint {} not found", name);
        };

        self.buffer.truncate(target);
        self.savepoints.retain(|sp| sp.buffer_len <= target);
        Ok(target)
    }

    pub fn age(&self) -> Duration {
        self.started_at.elapsed().unwrap_or_default()
    }

    fn finish(&mut self, state: TxnState) {
        self.state = state;
        self.ended_at = Some(SystemTime::now());
    }
}

/// Owns every live transaction record. The engine façade serializes access
/// behind its coarse lock, so the manager itself is plain data.
#[derive(Debug, Default)]
pub struct TransactionManager {
    transactions: HashMap<String, Transaction>,
    next_id: u64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new transaction and returns its id.
    pub fn begin(&mut self, isolation: IsolationLevel) -> String {
        self.next_id += 1;
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let id = format!("tx_{}_{}", millis, self.next_id);
        self.transactions
            .insert(id.clone(), Transaction::new(id.clone(), isolation));
        id
    }

    pub fn get(&self, id: &str) -> Result<&Transaction> {
        match self.transactions.get(id) {
            Some(tx) => Ok(tx),
            None => bail!("transaction {} not found", id),
        }
    }

    /// The transaction, checked to still be in the Active state.
    pub fn get_active_mut(&mut self, id: &str) -> Result<&mut Transaction> {
        let Some(tx) = self.transactions.get_mut(id) else {
            bail!("transaction {} not found", id);
        };
        if tx.state != TxnState::Active {
            bail!("transaction {} is not active", id);
        }
        Ok(tx)
    }

    /// Removes the transaction from the active set, marking it with its
    /// terminal state.
    pub fn finish(&mut self, id: &str, state: TxnState) -> Result<Transaction> {
        let Some(mut tx) = self.transactions.remove(id) else {
            bail!("transaction {} not found", id);
        };
        tx.finish(state);
        Ok(tx)
    }

    pub fn active_count(&self) -> usize {
        self.transactions
            .values()
            .filter(|tx| tx.state == TxnState::Active)
            .count()
    }

    /// Aborts and removes every transaction older than `ttl`, returning the
    /// swept ids. Intended for a periodic boundary-driven sweep of
    /// transactions abandoned by dropped connections.
    pub fn sweep_stale(&mut self, ttl: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .transactions
            .values()
            .filter(|tx| tx.state == TxnState::Active && tx.age() >= ttl)
            .map(|tx| tx.id.clone())
            .collect();

        for id in &stale {
            if let Some(mut tx) = self.transactions.remove(id) {
                tx.finish(TxnState::Aborted);
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Mutation;

    fn insert_op(value: &str) -> TableMutation {
        TableMutation {
            table: "t".to_string(),
            mutation: Mutation::Insert {
                values: vec![value.to_string()],
            },
        }
    }

    #[test]
    fn begin_creates_active_transaction() {
        let mut mgr = TransactionManager::new();
        let id = mgr.begin(IsolationLevel::Serializable);

        let tx = mgr.get(&id).unwrap();
        assert_eq!(tx.state(), TxnState::Active);
        assert_eq!(tx.isolation(), IsolationLevel::Serializable);
        assert_eq!(mgr.active_count(), 1);
    }

    #[test]
    fn savepoint_rollback_truncates_buffer() {
        let mut mgr = TransactionManager::new();
        let id = mgr.begin(IsolationLevel::default());
        let tx = mgr.get_active_mut(&id).unwrap();

        tx.push(insert_op("a"));
        tx.create_savepoint("s1");
        tx.push(insert_op("b"));
        tx.push(insert_op("c"));

        tx.rollback_to_savepoint("s1").unwrap();
        assert_eq!(tx.buffer().len(), 1);

        // The savepoint survives and can be reused.
        tx.push(insert_op("d"));
        tx.rollback_to_savepoint("s1").unwrap();
        assert_eq!(tx.buffer().len(), 1);
    }

    #[test]
    fn deeper_savepoints_are_discarded() {
        let mut mgr = TransactionManager::new();
        let id = mgr.begin(IsolationLevel::default());
        let tx = mgr.get_active_mut(&id).unwrap();

        tx.create_savepoint("outer");
        tx.push(insert_op("a"));
        tx.create_savepoint("inner");
        tx.push(insert_op("b"));

        tx.rollback_to_savepoint("outer").unwrap();
        assert!(tx.rollback_to_savepoint("inner").is_err());
    }

    #[test]
    fn duplicate_savepoint_name_shadows_older() {
        let mut mgr = TransactionManager::new();
        let id = mgr.begin(IsolationLevel::default());
        let tx = mgr.get_active_mut(&id).unwrap();

        tx.create_savepoint("s");
        tx.push(insert_op("a"));
        tx.create_savepoint("s");
        tx.push(insert_op("b"));

        tx.rollback_to_savepoint("s").unwrap();
        assert_eq!(tx.buffer().len(), 1);
    }

    #[test]
    fn missing_savepoint_is_an_error() {
        let mut mgr = TransactionManager::new();
        let id = mgr.begin(IsolationLevel::default());
        let tx = mgr.get_active_mut(&id).unwrap();

        let err = tx.rollback_to_savepoint("ghost").unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn finish_removes_from_active_set() {
        let mut mgr = TransactionManager::new();
        let id = mgr.begin(IsolationLevel::default());

        let tx = mgr.finish(&id, TxnState::Committed).unwrap();
        assert_eq!(tx.state(), TxnState::Committed);
        assert!(tx.ended_at().is_some());
        assert_eq!(mgr.active_count(), 0);
        assert!(mgr.get(&id).is_err());
    }

    #[test]
    fn sweep_aborts_stale_transactions() {
        let mut mgr = TransactionManager::new();
        let id = mgr.begin(IsolationLevel::default());

        assert!(mgr.sweep_stale(Duration::from_secs(60)).is_empty());

        let swept = mgr.sweep_stale(Duration::ZERO);
        assert_eq!(swept, vec![id.clone()]);
        assert!(mgr.get(&id).is_err());
    }
}
