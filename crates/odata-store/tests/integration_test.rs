use async_trait::async_trait;
use odata_store::{Precondition, StoreActor, StoreEntity, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// --- Test Entity ---

#[derive(Clone, Debug, PartialEq)]
struct Account {
    id: u32,
    owner: String,
    balance: i64,
    version: u32,
}

#[derive(Debug)]
struct AccountCreate {
    owner: String,
}

#[derive(Debug)]
enum AccountUpdate {
    Deposit(i64),
    Withdraw(i64),
}

#[derive(Debug, thiserror::Error)]
enum AccountError {
    #[error("Insufficient funds: balance {0}")]
    InsufficientFunds(i64),
    #[error("Owner must not be empty")]
    EmptyOwner,
}

/// Counts hook invocations so tests can check the actor calls them.
#[derive(Default)]
struct Audit {
    writes: AtomicUsize,
}

#[async_trait]
impl StoreEntity for Account {
    type Key = u32;
    type Create = AccountCreate;
    type Update = AccountUpdate;
    type Context = Arc<Audit>;
    type Error = AccountError;

    fn from_create_params(id: u32, params: AccountCreate) -> Result<Self, Self::Error> {
        if params.owner.is_empty() {
            return Err(AccountError::EmptyOwner);
        }
        Ok(Self {
            id,
            owner: params.owner,
            balance: 0,
            version: 1,
        })
    }

    fn etag(&self) -> Option<String> {
        Some(format!("W/\"{}\"", self.version))
    }

    async fn on_create(&mut self, ctx: &Arc<Audit>) -> Result<(), Self::Error> {
        ctx.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_update(
        &mut self,
        update: AccountUpdate,
        ctx: &Arc<Audit>,
    ) -> Result<(), Self::Error> {
        match update {
            AccountUpdate::Deposit(amount) => self.balance += amount,
            AccountUpdate::Withdraw(amount) => {
                if amount > self.balance {
                    return Err(AccountError::InsufficientFunds(self.balance));
                }
                self.balance -= amount;
            }
        }
        self.version += 1;
        ctx.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn owner(name: &str) -> AccountCreate {
    AccountCreate {
        owner: name.to_string(),
    }
}

#[tokio::test]
async fn test_store_full_lifecycle() {
    let audit = Arc::new(Audit::default());
    let (actor, client) = StoreActor::<Account>::with_label(10, "Accounts");
    let handle = tokio::spawn(actor.run(audit.clone()));

    // 1. Create with generated and explicit keys
    let first = client.create(None, owner("alice")).await.unwrap();
    assert_eq!(first.id, 1);
    let explicit = client.create(Some(5), owner("bob")).await.unwrap();
    assert_eq!(explicit.id, 5);

    // 2. Duplicate key is a conflict
    let duplicate = client.create(Some(5), owner("carol")).await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(key)) if key == "5"));

    // 3. Update guarded by the current tag
    let tag = Precondition::Matches(first.etag().unwrap());
    let updated = client
        .update(1, tag.clone(), AccountUpdate::Deposit(100))
        .await
        .unwrap();
    assert_eq!(updated.balance, 100);
    assert_eq!(updated.version, 2);

    // 4. Reusing the stale tag fails and reports the current tag
    let stale = client.update(1, tag, AccountUpdate::Deposit(1)).await;
    match stale {
        Err(StoreError::PreconditionFailed { key, current }) => {
            assert_eq!(key, "1");
            assert_eq!(current.as_deref(), Some("W/\"2\""));
        }
        other => panic!("Expected PreconditionFailed, got {other:?}"),
    }

    // 5. A failing hook leaves the record untouched
    let overdraw = client
        .update(1, Precondition::Any, AccountUpdate::Withdraw(1_000))
        .await;
    assert!(matches!(
        overdraw
            .as_ref()
            .err()
            .and_then(|e| e.entity_error::<AccountError>()),
        Some(AccountError::InsufficientFunds(100))
    ));
    let unchanged = client.get(1).await.unwrap().unwrap();
    assert_eq!(unchanged.balance, 100);
    assert_eq!(unchanged.version, 2);

    // 6. List returns records in key order
    let all = client.list().await.unwrap();
    assert_eq!(all.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 5]);

    // 7. Delete with a precondition
    let wrong = client
        .delete(5, Precondition::Matches("W/\"9\"".into()))
        .await;
    assert!(matches!(wrong, Err(StoreError::PreconditionFailed { .. })));
    client.delete(5, Precondition::Any).await.unwrap();
    assert!(client.get(5).await.unwrap().is_none());
    let missing = client.delete(5, Precondition::None).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));

    // creates (2) + successful update (1)
    assert_eq!(audit.writes.load(Ordering::SeqCst), 3);

    drop(client);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_invalid_create_params_are_rejected() {
    let (actor, client) = StoreActor::<Account>::new(4);
    tokio::spawn(actor.run(Arc::new(Audit::default())));

    let result = client.create(None, owner("")).await;
    assert!(matches!(
        result.as_ref().err().and_then(|e| e.entity_error::<AccountError>()),
        Some(AccountError::EmptyOwner)
    ));
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_snapshot_and_restore() {
    let (actor, client) = StoreActor::<Account>::new(4);
    tokio::spawn(actor.run(Arc::new(Audit::default())));

    client.create(None, owner("alice")).await.unwrap();
    let snapshot = client.snapshot().await.unwrap();

    client
        .update(1, Precondition::None, AccountUpdate::Deposit(50))
        .await
        .unwrap();
    client.create(None, owner("bob")).await.unwrap();

    client.restore(snapshot).await.unwrap();
    let all = client.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].balance, 0);

    // Key generation resumes from the snapshot's counter
    let next = client.create(None, owner("carol")).await.unwrap();
    assert_eq!(next.id, 2);
}

#[tokio::test]
async fn test_concurrent_conditional_updates_have_one_winner() {
    let (actor, client) = StoreActor::<Account>::new(32);
    tokio::spawn(actor.run(Arc::new(Audit::default())));

    let created = client.create(None, owner("alice")).await.unwrap();
    let tag = created.etag().unwrap();

    let mut handles = vec![];
    for _ in 0..10 {
        let client = client.clone();
        let tag = tag.clone();
        handles.push(tokio::spawn(async move {
            client
                .update(1, Precondition::Matches(tag), AccountUpdate::Deposit(10))
                .await
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(StoreError::PreconditionFailed { .. }) => lost += 1,
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(lost, 9);
    assert_eq!(client.get(1).await.unwrap().unwrap().balance, 10);
}
