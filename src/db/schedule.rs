use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::archive::BackupKind;
use crate::settings::{StoreHandle, LAST_AUTO_BACKUP_KEY};
use crate::time::Clock;
use crate::AppResult;

use super::backup::{BackupEngine, BackupEntry};

/// Decides when an automatic backup is due. The only state it keeps is the
/// time of the last successful automatic backup, held in the settings store.
#[derive(Clone)]
pub struct AutoBackupScheduler {
    settings: StoreHandle,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl AutoBackupScheduler {
    pub fn new(settings: StoreHandle, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            settings,
            clock,
            interval,
        }
    }

    /// `None` when nothing is recorded or the value does not parse.
    pub fn last_auto_backup(&self) -> Option<DateTime<Utc>> {
        let raw = self.settings.get(LAST_AUTO_BACKUP_KEY)?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "auto_backup_timestamp_invalid",
                    value = %raw,
                    error = %err
                );
                None
            }
        }
    }

    /// Due when nothing is recorded, when strictly more than the interval has
    /// elapsed, or when the recorded time lies in the future.
    pub fn is_due(&self) -> bool {
        let Some(last) = self.last_auto_backup() else {
            return true;
        };
        let now = self.clock.now();
        if last > now {
            return true;
        }
        now - last > self.interval
    }

    pub fn record_success(&self, at: DateTime<Utc>) -> AppResult<()> {
        self.settings.put(
            LAST_AUTO_BACKUP_KEY,
            &at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    /// App-background trigger: back up when due and record the time only
    /// after the backup succeeded.
    pub async fn on_app_background(&self, engine: &BackupEngine) -> AppResult<Option<BackupEntry>> {
        if !self.is_due() {
            debug!(target: "readshelf", event = "auto_backup_not_due");
            return Ok(None);
        }
        let entry = engine.create_backup(BackupKind::Auto).await?;
        self.record_success(self.clock.now())?;
        info!(
            target: "readshelf",
            event = "auto_backup_recorded",
            archive = %entry.file_name
        );
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use chrono::TimeZone;

    fn scheduler() -> (AutoBackupScheduler, ManualClock, StoreHandle) {
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let store = StoreHandle::in_memory();
        let sched =
            AutoBackupScheduler::new(store.clone(), Arc::new(clock.clone()), Duration::hours(24));
        (sched, clock, store)
    }

    #[test]
    fn due_when_never_backed_up() {
        let (sched, _, _) = scheduler();
        assert!(sched.last_auto_backup().is_none());
        assert!(sched.is_due());
    }

    #[test]
    fn due_only_after_interval_strictly_elapses() {
        let (sched, clock, _) = scheduler();
        sched.record_success(clock.now()).unwrap();
        assert!(!sched.is_due());

        clock.advance(Duration::hours(24));
        assert!(!sched.is_due());

        clock.advance(Duration::milliseconds(1));
        assert!(sched.is_due());
    }

    #[test]
    fn garbage_timestamp_counts_as_never() {
        let (sched, _, store) = scheduler();
        store.put(LAST_AUTO_BACKUP_KEY, "last tuesday").unwrap();
        assert!(sched.last_auto_backup().is_none());
        assert!(sched.is_due());
    }

    #[test]
    fn future_timestamp_is_due() {
        let (sched, clock, _) = scheduler();
        sched
            .record_success(clock.now() + Duration::days(3))
            .unwrap();
        assert!(sched.is_due());
    }
}
