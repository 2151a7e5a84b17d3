//! Backoff for transient storage failures.
//!
//! Upstream page failures are not retried here: the sync loop reschedules them
//! after a fixed backoff. This module covers the write path, where a locked
//! SQLite file or a dropped pool connection should not cost a whole page cycle.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use sea_orm::DbErr;

/// Backoff policy for one write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// Delay before the first retry; doubles per attempt.
    pub first_delay: Duration,
    pub max_delay: Duration,
    /// Retries after the first attempt.
    pub retries: usize,
    pub jitter: bool,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            retries: 3,
            jitter: true,
        }
    }
}

impl WritePolicy {
    /// A policy that gives up on the first failure.
    pub fn never() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    fn backoff(self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.first_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.retries);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Whether a database error is worth retrying.
///
/// Pool and connection failures always are. Statement errors are only when the
/// driver reports a lock, busy database, timeout or connection churn;
/// constraint violations and type errors fail immediately.
pub fn is_transient(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) => {
            let message = err.to_string().to_lowercase();
            ["locked", "busy", "timeout", "connection", "temporarily unavailable"]
                .iter()
                .any(|needle| message.contains(needle))
        }
        _ => false,
    }
}

/// Run a write, retrying [transient](is_transient) failures under `policy`.
///
/// Each retry is logged at `warn` with `statement` naming what was written.
///
/// # Example
///
/// ```ignore
/// let written = retry_write("sales upsert", policy, || {
///     sale::Entity::insert_many(chunk.to_vec())
///         .on_conflict(sales_on_conflict())
///         .exec_without_returning(db)
/// })
/// .await?;
/// ```
pub async fn retry_write<T, F, Fut>(
    statement: &str,
    policy: WritePolicy,
    write: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    write
        .retry(policy.backoff())
        .when(is_transient)
        .notify(|err, delay| {
            tracing::warn!(
                statement,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "Transient database failure, retrying"
            );
        })
        .await
}
