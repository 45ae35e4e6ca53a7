//! Durable relayer state: the observed-event log, the dispatch ledger, and
//! per-chain checkpoints.
//!
//! Every mutation here is a single conditional SQL statement
//! (insert-if-absent, compare-and-set update), which is what makes
//! concurrent watchers, the dispatcher, and a post-crash recovery pass safe
//! against double-processing without any global lock.

use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::types::Status;

pub mod models;

pub use models::*;

/// Outcome of recording an observed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// Benign replay: the event was already durably recorded
    AlreadyPresent,
}

/// Outcome of claiming an action key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The exactly-once gate: another delivery already owns this key
    AlreadyClaimed(Status),
}

/// Outcome of a checkpoint update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointUpdate {
    Advanced,
    /// The proposed value was below the stored checkpoint
    Rejected { current: i64 },
}

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .wrap_err("Invalid database URL")?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    // An in-memory database exists per connection, so the pool must not
    // hand out more than one; WAL only applies to file-backed databases.
    let in_memory = database_url.contains(":memory:");
    let options = if in_memory {
        options
    } else {
        options.journal_mode(SqliteJournalMode::Wal)
    };

    SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 10 })
        .connect_with(options)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

// ============ Event Log Store ============

/// Record an observed event if it is not already present.
///
/// Atomic check-and-insert keyed by (chain_id, tx_hash, log_index), so a
/// resumed subscription overlapping a live one cannot record twice.
pub async fn record_event_if_new(
    pool: &SqlitePool,
    event: &NewObservedEvent,
) -> Result<RecordOutcome> {
    let result = sqlx::query(
        r#"
        INSERT INTO observed_events (chain_id, tx_hash, log_index, kind, user_address,
            amount, destination, block_number, observed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING
        "#,
    )
    .bind(event.chain_id)
    .bind(&event.tx_hash)
    .bind(event.log_index)
    .bind(event.kind)
    .bind(&event.user_address)
    .bind(&event.amount)
    .bind(&event.destination)
    .bind(event.block_number)
    .bind(Utc::now())
    .execute(pool)
    .await
    .wrap_err("Failed to record observed event")?;

    if result.rows_affected() == 1 {
        Ok(RecordOutcome::Inserted)
    } else {
        Ok(RecordOutcome::AlreadyPresent)
    }
}

/// Count of recorded events, for the status endpoint
pub async fn count_observed_events(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM observed_events"#)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to count observed events")?;

    Ok(row.0)
}

// ============ Checkpoints ============

/// Get the last durably recorded block for a chain
pub async fn get_checkpoint(pool: &SqlitePool, chain_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as(r#"SELECT block_number FROM checkpoints WHERE chain_id = ?"#)
            .bind(chain_id)
            .fetch_optional(pool)
            .await
            .wrap_err("Failed to get checkpoint")?;

    Ok(row.map(|r| r.0))
}

/// Advance a chain's checkpoint.
///
/// Monotonic: a value below the stored checkpoint is rejected so an
/// out-of-order replay can never regress progress. Equal values are
/// accepted as an idempotent no-op.
pub async fn update_checkpoint(
    pool: &SqlitePool,
    chain_id: i64,
    block_number: i64,
) -> Result<CheckpointUpdate> {
    let result = sqlx::query(
        r#"
        INSERT INTO checkpoints (chain_id, block_number, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT (chain_id) DO UPDATE SET
            block_number = excluded.block_number,
            updated_at = excluded.updated_at
        WHERE excluded.block_number >= checkpoints.block_number
        "#,
    )
    .bind(chain_id)
    .bind(block_number)
    .bind(Utc::now())
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update checkpoint for chain {}", chain_id))?;

    if result.rows_affected() == 1 {
        Ok(CheckpointUpdate::Advanced)
    } else {
        let current = get_checkpoint(pool, chain_id).await?.unwrap_or(0);
        Ok(CheckpointUpdate::Rejected { current })
    }
}

// ============ Dispatch Ledger ============

/// SQL SELECT columns for the actions table
const ACTION_SELECT: &str = r#"action_key, kind, source_chain_id, source_tx_hash,
    source_log_index, target_chain_id, recipient, amount, status, tx_hash, attempts,
    last_error, retry_after, submitted_at, created_at, updated_at"#;

/// Claim an action key.
///
/// Atomic insert-if-absent on the primary key; this is the exactly-once
/// gate. A second claim for the same key reports the existing state and
/// must be treated as a no-op by the caller, not an error.
pub async fn claim_action(pool: &SqlitePool, action: &NewAction) -> Result<ClaimOutcome> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO actions (action_key, kind, source_chain_id, source_tx_hash,
            source_log_index, target_chain_id, recipient, amount, status, attempts,
            created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)
        ON CONFLICT (action_key) DO NOTHING
        "#,
    )
    .bind(action.action_key.as_str())
    .bind(action.kind)
    .bind(action.source_chain_id)
    .bind(&action.source_tx_hash)
    .bind(action.source_log_index)
    .bind(action.target_chain_id)
    .bind(&action.recipient)
    .bind(&action.amount)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to claim action {}", action.action_key))?;

    if result.rows_affected() == 1 {
        return Ok(ClaimOutcome::Claimed);
    }

    let existing: (Status,) =
        sqlx::query_as(r#"SELECT status FROM actions WHERE action_key = ?"#)
            .bind(action.action_key.as_str())
            .fetch_one(pool)
            .await
            .wrap_err("Failed to read state of already-claimed action")?;

    Ok(ClaimOutcome::AlreadyClaimed(existing.0))
}

/// Get a single action by key
pub async fn get_action(pool: &SqlitePool, key: &str) -> Result<Option<Action>> {
    let query = format!("SELECT {} FROM actions WHERE action_key = ?", ACTION_SELECT);
    let row = sqlx::query_as::<_, Action>(&query)
        .bind(key)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to get action")?;

    Ok(row)
}

/// Get pending actions targeting a chain that are due for submission
pub async fn list_pending_actions(
    pool: &SqlitePool,
    target_chain_id: i64,
) -> Result<Vec<Action>> {
    let query = format!(
        "SELECT {} FROM actions
         WHERE status = 'pending'
           AND target_chain_id = ?
           AND (retry_after IS NULL OR retry_after <= ?)
         ORDER BY created_at ASC
         LIMIT 20",
        ACTION_SELECT
    );
    let rows = sqlx::query_as::<_, Action>(&query)
        .bind(target_chain_id)
        .bind(Utc::now())
        .fetch_all(pool)
        .await
        .wrap_err("Failed to get pending actions")?;

    Ok(rows)
}

/// Get submitted actions awaiting confirmation, across all chains
pub async fn list_submitted_actions(pool: &SqlitePool) -> Result<Vec<Action>> {
    let query = format!(
        "SELECT {} FROM actions WHERE status = 'submitted'",
        ACTION_SELECT
    );
    let rows = sqlx::query_as::<_, Action>(&query)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to get submitted actions")?;

    Ok(rows)
}

/// Transition Pending → Submitted with the sent transaction hash.
///
/// Returns false if the action was not Pending; the caller logs and moves
/// on (a concurrent pass already advanced it).
pub async fn update_action_submitted(
    pool: &SqlitePool,
    key: &str,
    tx_hash: &str,
) -> Result<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE actions
        SET status = 'submitted', tx_hash = ?, attempts = attempts + 1,
            last_error = NULL, submitted_at = ?, updated_at = ?
        WHERE action_key = ? AND status = 'pending'
        "#,
    )
    .bind(tx_hash)
    .bind(now)
    .bind(now)
    .bind(key)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update action {} as submitted", key))?;

    Ok(result.rows_affected() == 1)
}

/// Transition Submitted → Confirmed (terminal success)
pub async fn update_action_confirmed(pool: &SqlitePool, key: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE actions SET status = 'confirmed', updated_at = ?
        WHERE action_key = ? AND status = 'submitted'
        "#,
    )
    .bind(Utc::now())
    .bind(key)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update action {} as confirmed", key))?;

    Ok(result.rows_affected() == 1)
}

/// Transition Pending/Submitted → Failed (terminal, operator surface)
pub async fn update_action_failed(
    pool: &SqlitePool,
    key: &str,
    error: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE actions SET status = 'failed', last_error = ?, updated_at = ?
        WHERE action_key = ? AND status IN ('pending', 'submitted')
        "#,
    )
    .bind(error)
    .bind(Utc::now())
    .bind(key)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update action {} as failed", key))?;

    Ok(result.rows_affected() == 1)
}

/// Record a transient submission failure: the action stays Pending, the
/// attempt is counted, and retry_after delays the next pickup.
pub async fn update_action_for_retry(
    pool: &SqlitePool,
    key: &str,
    error: &str,
    retry_after: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE actions
        SET attempts = attempts + 1, last_error = ?, retry_after = ?, updated_at = ?
        WHERE action_key = ? AND status = 'pending'
        "#,
    )
    .bind(error)
    .bind(retry_after)
    .bind(Utc::now())
    .bind(key)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update action {} for retry", key))?;

    Ok(result.rows_affected() == 1)
}

/// Transition Submitted → Pending after a drop timeout.
///
/// Only called once the chain client has verified the recorded hash never
/// landed. The stale hash is cleared; attempts carry over so the retry
/// budget still bounds total submissions.
pub async fn requeue_dropped_action(
    pool: &SqlitePool,
    key: &str,
    error: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE actions
        SET status = 'pending', tx_hash = NULL, submitted_at = NULL,
            last_error = ?, updated_at = ?
        WHERE action_key = ? AND status = 'submitted'
        "#,
    )
    .bind(error)
    .bind(Utc::now())
    .bind(key)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to requeue action {}", key))?;

    Ok(result.rows_affected() == 1)
}

/// Count actions in a given state, for the status endpoint and metrics
pub async fn count_actions_with_status(pool: &SqlitePool, status: Status) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM actions WHERE status = ?"#)
        .bind(status)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to count actions")?;

    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKey, ActionKind};

    async fn memory_pool() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample_event(tx_hash: &str, log_index: i64) -> NewObservedEvent {
        NewObservedEvent {
            chain_id: 31337,
            tx_hash: tx_hash.to_string(),
            log_index,
            kind: crate::types::EventKind::Lock,
            user_address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
            amount: "1000000000000000000".to_string(),
            destination: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".to_string(),
            block_number: 7,
        }
    }

    fn sample_action(key_tx: &str, log_index: u64) -> NewAction {
        NewAction {
            action_key: ActionKey::derive(ActionKind::Mint, 31337, key_tx, log_index),
            kind: ActionKind::Mint,
            source_chain_id: 31337,
            source_tx_hash: key_tx.to_string(),
            source_log_index: log_index as i64,
            target_chain_id: 31338,
            recipient: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".to_string(),
            amount: "1000000000000000000".to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_event_dedup() {
        let pool = memory_pool().await;
        let event = sample_event("0xaa", 0);

        assert_eq!(
            record_event_if_new(&pool, &event).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            record_event_if_new(&pool, &event).await.unwrap(),
            RecordOutcome::AlreadyPresent
        );
        assert_eq!(count_observed_events(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_distinguishes_log_index() {
        let pool = memory_pool().await;

        assert_eq!(
            record_event_if_new(&pool, &sample_event("0xaa", 0)).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            record_event_if_new(&pool, &sample_event("0xaa", 1)).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(count_observed_events(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_checkpoint_monotonic() {
        let pool = memory_pool().await;

        assert_eq!(get_checkpoint(&pool, 1).await.unwrap(), None);
        assert_eq!(
            update_checkpoint(&pool, 1, 100).await.unwrap(),
            CheckpointUpdate::Advanced
        );
        assert_eq!(
            update_checkpoint(&pool, 1, 90).await.unwrap(),
            CheckpointUpdate::Rejected { current: 100 }
        );
        assert_eq!(get_checkpoint(&pool, 1).await.unwrap(), Some(100));

        // Equal value is an idempotent no-op, not a regression
        assert_eq!(
            update_checkpoint(&pool, 1, 100).await.unwrap(),
            CheckpointUpdate::Advanced
        );
        assert_eq!(
            update_checkpoint(&pool, 1, 110).await.unwrap(),
            CheckpointUpdate::Advanced
        );
        assert_eq!(get_checkpoint(&pool, 1).await.unwrap(), Some(110));
    }

    #[tokio::test]
    async fn test_checkpoints_independent_per_chain() {
        let pool = memory_pool().await;

        update_checkpoint(&pool, 1, 100).await.unwrap();
        update_checkpoint(&pool, 2, 5).await.unwrap();

        assert_eq!(get_checkpoint(&pool, 1).await.unwrap(), Some(100));
        assert_eq!(get_checkpoint(&pool, 2).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_claim_exactly_once() {
        let pool = memory_pool().await;
        let action = sample_action("0xaa", 0);

        assert_eq!(
            claim_action(&pool, &action).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            claim_action(&pool, &action).await.unwrap(),
            ClaimOutcome::AlreadyClaimed(Status::Pending)
        );
    }

    #[tokio::test]
    async fn test_claim_reports_advanced_state() {
        let pool = memory_pool().await;
        let action = sample_action("0xaa", 0);

        claim_action(&pool, &action).await.unwrap();
        update_action_submitted(&pool, action.action_key.as_str(), "0xdead")
            .await
            .unwrap();

        assert_eq!(
            claim_action(&pool, &action).await.unwrap(),
            ClaimOutcome::AlreadyClaimed(Status::Submitted)
        );
    }

    #[tokio::test]
    async fn test_content_equal_actions_get_distinct_rows() {
        // Identical (user, amount, destination) but different tx coordinates
        // must never collapse into one action.
        let pool = memory_pool().await;

        assert_eq!(
            claim_action(&pool, &sample_action("0xaa", 0)).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            claim_action(&pool, &sample_action("0xbb", 0)).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            count_actions_with_status(&pool, Status::Pending).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_transition_state_machine() {
        let pool = memory_pool().await;
        let action = sample_action("0xaa", 0);
        let key = action.action_key.as_str();

        claim_action(&pool, &action).await.unwrap();

        // Confirming before submission is an invalid transition
        assert!(!update_action_confirmed(&pool, key).await.unwrap());

        assert!(update_action_submitted(&pool, key, "0xdead").await.unwrap());
        // Double-submit is rejected
        assert!(!update_action_submitted(&pool, key, "0xbeef").await.unwrap());

        assert!(update_action_confirmed(&pool, key).await.unwrap());
        // Terminal states accept no further transitions
        assert!(!update_action_confirmed(&pool, key).await.unwrap());
        assert!(!update_action_failed(&pool, key, "late failure").await.unwrap());

        let stored = get_action(&pool, key).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Confirmed);
        assert_eq!(stored.tx_hash.as_deref(), Some("0xdead"));
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_bookkeeping_keeps_action_pending() {
        let pool = memory_pool().await;
        let action = sample_action("0xaa", 0);
        let key = action.action_key.as_str();

        claim_action(&pool, &action).await.unwrap();
        assert!(
            update_action_for_retry(&pool, key, "connection timeout", Utc::now())
                .await
                .unwrap()
        );

        let stored = get_action(&pool, key).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("connection timeout"));
    }

    #[tokio::test]
    async fn test_pending_listing_respects_retry_after() {
        let pool = memory_pool().await;
        let action = sample_action("0xaa", 0);

        claim_action(&pool, &action).await.unwrap();
        assert_eq!(list_pending_actions(&pool, 31338).await.unwrap().len(), 1);

        // Backed-off actions are not due yet
        let later = Utc::now() + chrono::Duration::seconds(60);
        update_action_for_retry(&pool, action.action_key.as_str(), "timeout", later)
            .await
            .unwrap();
        assert!(list_pending_actions(&pool, 31338).await.unwrap().is_empty());

        // Wrong target chain never sees the action
        assert!(list_pending_actions(&pool, 31337).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requeue_dropped_action() {
        let pool = memory_pool().await;
        let action = sample_action("0xaa", 0);
        let key = action.action_key.as_str();

        claim_action(&pool, &action).await.unwrap();
        update_action_submitted(&pool, key, "0xdead").await.unwrap();

        assert!(requeue_dropped_action(&pool, key, "transaction dropped")
            .await
            .unwrap());

        let stored = get_action(&pool, key).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Pending);
        assert_eq!(stored.tx_hash, None);
        assert_eq!(stored.submitted_at, None);
        // The submission attempt stays counted
        assert_eq!(stored.attempts, 1);

        // Requeueing a non-submitted action is rejected
        assert!(!requeue_dropped_action(&pool, key, "again").await.unwrap());
    }

    #[tokio::test]
    async fn test_submitted_listing() {
        let pool = memory_pool().await;
        let a = sample_action("0xaa", 0);
        let b = sample_action("0xbb", 0);

        claim_action(&pool, &a).await.unwrap();
        claim_action(&pool, &b).await.unwrap();
        update_action_submitted(&pool, a.action_key.as_str(), "0x01").await.unwrap();

        let submitted = list_submitted_actions(&pool).await.unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].action_key, a.action_key.as_str());
    }
}
