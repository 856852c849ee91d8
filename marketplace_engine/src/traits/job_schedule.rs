use chrono::Duration;
use thiserror::Error;

/// A persistent lease table that elects at most one runner per job per interval, across any
/// number of server replicas sharing the database.
#[allow(async_fn_in_trait)]
pub trait JobScheduler: Clone {
    /// Attempts to take the lease for `job_name`. Returns `true` if the caller should run the
    /// job now, `false` if another runner holds the current interval.
    ///
    /// The check-and-update happens in one transaction, so two replicas offering the same job at
    /// the same moment serialize on the row and only one sees `true`.
    async fn try_run(&self, job_name: &str, interval: Duration) -> Result<bool, JobScheduleError>;
}

#[derive(Debug, Clone, Error)]
pub enum JobScheduleError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for JobScheduleError {
    fn from(e: sqlx::Error) -> Self {
        JobScheduleError::DatabaseError(e.to_string())
    }
}
