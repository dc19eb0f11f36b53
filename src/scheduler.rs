//! Daily lexeme refresh.
//!
//! Fires once a day at a fixed local time in a fixed timezone and asks the
//! service to rebuild its lexeme and filter indexes. A failed refresh is
//! logged and simply waits for the next tick. Ticks run inline, so a slow
//! refresh delays the next one instead of overlapping it.

use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::service::Changelog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    at: NaiveTime,
    timezone: Tz,
}

impl RefreshSchedule {
    pub fn new(at: NaiveTime, timezone: Tz) -> Self {
        Self { at, timezone }
    }

    /// Parses `HH:MM` and an IANA timezone name.
    pub fn parse(at: &str, timezone: &str) -> Result<Self> {
        let at = NaiveTime::parse_from_str(at, "%H:%M")
            .map_err(|e| AppError::Validation(format!("invalid refresh time `{}`: {}", at, e)))?;
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|e| AppError::Validation(format!("invalid timezone `{}`: {}", timezone, e)))?;

        Ok(Self::new(at, timezone))
    }

    /// First firing strictly after `now`.
    ///
    /// A firing time skipped by a DST transition moves forward by the size
    /// of the gap; an ambiguous one uses its earlier instant.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut day = now.with_timezone(&self.timezone).date_naive();

        loop {
            let local = day.and_time(self.at);
            let candidate = match self.timezone.from_local_datetime(&local) {
                LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => Some(at),
                LocalResult::None => self
                    .timezone
                    .from_local_datetime(&(local + Duration::hours(1)))
                    .earliest(),
            };

            if let Some(at) = candidate.map(|at| at.with_timezone(&Utc)) {
                if at > now {
                    return at;
                }
            }

            day = day.succ_opt().unwrap_or(day);
        }
    }
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self::new(NaiveTime::MIN + Duration::hours(6), chrono_tz::Europe::Paris)
    }
}

/// Spawns the refresh loop for the lifetime of the process.
pub fn spawn(changelog: Changelog, schedule: RefreshSchedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = schedule.next_after(now);
            tracing::info!(next = %next, "next lexeme refresh scheduled");

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            tick(&changelog).await;
        }
    })
}

/// One scheduled refresh. A failure is logged and left to the next tick.
async fn tick(changelog: &Changelog) -> bool {
    match changelog.refresh().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "unable to refresh lexeme");
            false
        }
    }
}
