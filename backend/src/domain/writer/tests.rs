//! Tests for the transactional writer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::MockPasswordHasher;
use crate::domain::{AccountColumn, Password, PasswordHash};

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .expect("valid timestamp")
}

/// Shared record of what the fake transaction did.
#[derive(Debug, Default)]
struct Journal {
    committed: Vec<UserAccount>,
    staged: Vec<UserAccount>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
}

/// Store whose transactions fail on a chosen write.
#[derive(Clone, Default)]
struct ScriptedStore {
    journal: Arc<Mutex<Journal>>,
    fail_write_at: Option<usize>,
    fail_begin: bool,
    fail_rollback: bool,
}

impl ScriptedStore {
    fn seeded(accounts: Vec<UserAccount>) -> Self {
        let store = Self::default();
        store.journal.lock().expect("journal lock").committed = accounts;
        store
    }

    fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().expect("journal lock")
    }
}

#[async_trait]
impl AccountStore for ScriptedStore {
    async fn exists(&self, _id: AccountId) -> Result<bool, AccountStoreError> {
        Ok(true)
    }

    async fn is_taken(
        &self,
        _column: AccountColumn,
        _value: &str,
        _except: Option<AccountId>,
    ) -> Result<bool, AccountStoreError> {
        Ok(false)
    }

    async fn begin(&self) -> Result<Box<dyn AccountTransaction>, AccountStoreError> {
        if self.fail_begin {
            return Err(AccountStoreError::connection("pool exhausted"));
        }
        let mut journal = self.journal();
        journal.staged = journal.committed.clone();
        journal.begins += 1;
        drop(journal);
        Ok(Box::new(ScriptedTransaction {
            store: self.clone(),
            writes: 0,
        }))
    }
}

struct ScriptedTransaction {
    store: ScriptedStore,
    writes: usize,
}

impl ScriptedTransaction {
    fn next_write(&mut self) -> Result<(), AccountStoreError> {
        let attempt = self.writes;
        self.writes += 1;
        if self.store.fail_write_at == Some(attempt) {
            return Err(AccountStoreError::unique_violation("email"));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountTransaction for ScriptedTransaction {
    async fn load_by_id(
        &mut self,
        id: AccountId,
    ) -> Result<Option<UserAccount>, AccountStoreError> {
        Ok(self
            .store
            .journal()
            .staged
            .iter()
            .find(|account| account.id() == id)
            .cloned())
    }

    async fn insert(&mut self, account: NewAccount) -> Result<UserAccount, AccountStoreError> {
        self.next_write()?;
        let mut journal = self.store.journal();
        let next_id = i64::try_from(journal.staged.len()).unwrap_or(i64::MAX) + 1;
        let id = AccountId::new(next_id).expect("positive id");
        let stored = UserAccount::from_parts(id, account, epoch(), epoch());
        journal.staged.push(stored.clone());
        Ok(stored)
    }

    async fn update(&mut self, account: UserAccount) -> Result<UserAccount, AccountStoreError> {
        self.next_write()?;
        let mut journal = self.store.journal();
        let slot = journal
            .staged
            .iter_mut()
            .find(|existing| existing.id() == account.id())
            .ok_or(AccountStoreError::missing(account.id().get()))?;
        *slot = account.clone();
        Ok(account)
    }

    async fn commit(self: Box<Self>) -> Result<(), AccountStoreError> {
        let mut journal = self.store.journal();
        journal.committed = std::mem::take(&mut journal.staged);
        journal.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AccountStoreError> {
        let mut journal = self.store.journal();
        journal.staged.clear();
        journal.rollbacks += 1;
        if self.store.fail_rollback {
            return Err(AccountStoreError::connection("connection reset"));
        }
        Ok(())
    }
}

#[fixture]
fn hasher() -> MockPasswordHasher {
    let mut hasher = MockPasswordHasher::new();
    hasher
        .expect_hash()
        .returning(|password| Ok(PasswordHash::new(format!("hashed:{}", password.expose()))));
    hasher
}

fn draft(login: &str) -> AccountDraft {
    AccountDraft {
        name: "Grace Hopper".to_owned(),
        login: login.to_owned(),
        email: format!("{login}@example.com"),
        password: Password::new("correct horse"),
    }
}

fn failing_draft(login: &str) -> AccountDraft {
    AccountDraft {
        password: Password::new("unhashable"),
        ..draft(login)
    }
}

fn stored(id: i64, login: &str) -> UserAccount {
    UserAccount::from_parts(
        AccountId::new(id).expect("positive id"),
        NewAccount {
            name: "Stored Account".to_owned(),
            login: login.to_owned(),
            email: format!("{login}@example.com"),
            password_hash: PasswordHash::new("hashed:old"),
        },
        epoch(),
        epoch(),
    )
}

fn patch(id: i64) -> AccountPatch {
    AccountPatch {
        id: AccountId::new(id).expect("positive id"),
        name: None,
        login: None,
        email: None,
        password: None,
    }
}

fn failing_patch(id: i64) -> AccountPatch {
    AccountPatch {
        password: Some(Password::new("unhashable")),
        ..patch(id)
    }
}

#[rstest]
#[tokio::test]
async fn create_batch_commits_in_order(hasher: MockPasswordHasher) {
    let store = ScriptedStore::default();
    let writer = TransactionalWriter::new(&store, &hasher);

    let accounts = writer
        .write(ValidatedBatch::Create(vec![draft("grace"), draft("alan")]))
        .await
        .expect("batch commits");

    let logins: Vec<&str> = accounts.iter().map(UserAccount::login).collect();
    assert_eq!(logins, vec!["grace", "alan"]);
    assert_eq!(accounts[0].password_hash().as_str(), "hashed:correct horse");
    let journal = store.journal();
    assert_eq!(journal.committed.len(), 2);
    assert_eq!((journal.begins, journal.commits, journal.rollbacks), (1, 1, 0));
}

#[rstest]
#[tokio::test]
async fn failing_record_rolls_back_whole_batch(hasher: MockPasswordHasher) {
    let store = ScriptedStore {
        fail_write_at: Some(1),
        ..ScriptedStore::seeded(vec![stored(1, "ada")])
    };
    let writer = TransactionalWriter::new(&store, &hasher);

    let result = writer
        .write(ValidatedBatch::Create(vec![draft("grace"), draft("alan")]))
        .await;

    assert_eq!(
        result,
        Err(WriteFailure::Storage {
            index: 1,
            source: AccountStoreError::unique_violation("email"),
        })
    );
    let journal = store.journal();
    assert_eq!(journal.committed, vec![stored(1, "ada")]);
    assert_eq!((journal.commits, journal.rollbacks), (0, 1));
}

#[rstest]
#[tokio::test]
async fn rollback_failure_keeps_original_error(hasher: MockPasswordHasher) {
    let store = ScriptedStore {
        fail_write_at: Some(0),
        fail_rollback: true,
        ..ScriptedStore::default()
    };
    let writer = TransactionalWriter::new(&store, &hasher);

    let result = writer.write(ValidatedBatch::Create(vec![draft("grace")])).await;

    assert!(matches!(result, Err(WriteFailure::Storage { index: 0, .. })));
    assert_eq!(store.journal().rollbacks, 1);
}

#[rstest]
#[tokio::test]
async fn begin_failure_is_reported(hasher: MockPasswordHasher) {
    let store = ScriptedStore {
        fail_begin: true,
        ..ScriptedStore::default()
    };
    let writer = TransactionalWriter::new(&store, &hasher);

    let result = writer.write(ValidatedBatch::Create(vec![draft("grace")])).await;

    assert!(matches!(
        result,
        Err(WriteFailure::Begin(AccountStoreError::Connection { .. }))
    ));
}

#[rstest]
#[case(ValidatedBatch::Create(vec![draft("grace"), failing_draft("alan")]))]
#[case(ValidatedBatch::Update(vec![patch(1), failing_patch(1)]))]
#[tokio::test]
async fn hashing_failure_aborts_before_the_transaction_opens(#[case] batch: ValidatedBatch) {
    let mut hasher = MockPasswordHasher::new();
    hasher.expect_hash().returning(|password| {
        if password.expose() == "unhashable" {
            Err(PasswordHashError::hashing("out of memory"))
        } else {
            Ok(PasswordHash::new("hashed"))
        }
    });
    let store = ScriptedStore::seeded(vec![stored(1, "ada")]);
    let writer = TransactionalWriter::new(&store, &hasher);

    let result = writer.write(batch).await;

    assert!(matches!(result, Err(WriteFailure::Hashing { index: 1, .. })));
    let journal = store.journal();
    assert_eq!(journal.committed, vec![stored(1, "ada")]);
    assert_eq!((journal.begins, journal.commits, journal.rollbacks), (0, 0, 0));
}

#[rstest]
#[tokio::test]
async fn update_merges_only_supplied_fields(hasher: MockPasswordHasher) {
    let store = ScriptedStore::seeded(vec![stored(1, "ada"), stored(2, "alan")]);
    let writer = TransactionalWriter::new(&store, &hasher);
    let mut changes = patch(2);
    changes.email = Some("turing@example.com".to_owned());
    changes.password = Some(Password::new("new secret"));

    let accounts = writer
        .write(ValidatedBatch::Update(vec![changes]))
        .await
        .expect("update commits");

    assert_eq!(accounts[0].login(), "alan");
    assert_eq!(accounts[0].email(), "turing@example.com");
    assert_eq!(accounts[0].password_hash().as_str(), "hashed:new secret");
    let journal = store.journal();
    assert_eq!(journal.committed[0], stored(1, "ada"));
    assert_eq!(journal.committed[1].email(), "turing@example.com");
}

#[rstest]
#[tokio::test]
async fn update_without_password_skips_hashing() {
    let mut hasher = MockPasswordHasher::new();
    hasher.expect_hash().never();
    let store = ScriptedStore::seeded(vec![stored(1, "ada")]);
    let writer = TransactionalWriter::new(&store, &hasher);
    let mut changes = patch(1);
    changes.name = Some("Ada Lovelace".to_owned());

    let accounts = writer
        .write(ValidatedBatch::Update(vec![changes]))
        .await
        .expect("update commits");

    assert_eq!(accounts[0].name(), "Ada Lovelace");
    assert_eq!(accounts[0].password_hash().as_str(), "hashed:old");
}

#[rstest]
#[tokio::test]
async fn vanished_account_aborts_update(hasher: MockPasswordHasher) {
    let store = ScriptedStore::seeded(vec![stored(1, "ada")]);
    let writer = TransactionalWriter::new(&store, &hasher);
    let mut first = patch(1);
    first.name = Some("Ada Lovelace".to_owned());

    let result = writer
        .write(ValidatedBatch::Update(vec![first, patch(9)]))
        .await;

    assert_eq!(
        result,
        Err(WriteFailure::MissingAccount {
            index: 1,
            id: AccountId::new(9).expect("positive id"),
        })
    );
    assert_eq!(store.journal().committed, vec![stored(1, "ada")]);
}
