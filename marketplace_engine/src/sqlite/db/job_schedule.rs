//! Leased background-job scheduling. Each job has a single row holding the time it last ran;
//! taking the lease and refreshing the row happen in the caller's transaction so only one replica
//! wins an interval.

use chrono::{DateTime, Duration, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::traits::JobScheduleError;

/// Takes the lease for `job_name` if it has not run within `interval`. Returns `true` when the
/// caller should run the job.
pub async fn try_run(
    job_name: &str,
    interval: Duration,
    conn: &mut SqliteConnection,
) -> Result<bool, JobScheduleError> {
    let now = Utc::now();
    let last_run: Option<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT last_run_at FROM job_schedule WHERE job_name = $1")
            .bind(job_name)
            .fetch_optional(&mut *conn)
            .await?;
    match last_run {
        None => {
            sqlx::query("INSERT INTO job_schedule (job_name, last_run_at) VALUES ($1, $2)")
                .bind(job_name)
                .bind(now)
                .execute(conn)
                .await?;
            trace!("🕰️ First run of job [{job_name}]");
            Ok(true)
        },
        Some((last,)) if now - last < interval => {
            trace!("🕰️ Job [{job_name}] ran {}s ago; skipping", (now - last).num_seconds());
            Ok(false)
        },
        Some(_) => {
            sqlx::query("UPDATE job_schedule SET last_run_at = $2 WHERE job_name = $1")
                .bind(job_name)
                .bind(now)
                .execute(conn)
                .await?;
            trace!("🕰️ Taking lease for job [{job_name}]");
            Ok(true)
        },
    }
}
