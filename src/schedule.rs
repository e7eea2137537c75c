//! Merged schedule view
//!
//! Combines the pure cycle derivation with the modification store: an
//! override wins over the computed shift, and re-selecting the computed
//! shift removes the override instead of storing a redundant one.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};

use crate::cycle;
use crate::error::StorageError;
use crate::holidays;
use crate::store::ModificationStore;
use crate::types::{Crew, ShiftDay, ShiftType};
use crate::usage::UsageTracker;

/// Cells in the 6×7 calendar grid.
const CALENDAR_GRID_DAYS: i64 = 42;

pub struct Schedule {
    store: Arc<ModificationStore>,
    usage: Option<Arc<UsageTracker>>,
}

impl Schedule {
    pub fn new(store: Arc<ModificationStore>) -> Self {
        Self { store, usage: None }
    }

    /// Attach a usage tracker; modifications and restores are counted.
    pub fn with_usage(store: Arc<ModificationStore>, usage: Arc<UsageTracker>) -> Self {
        Self {
            store,
            usage: Some(usage),
        }
    }

    /// Resolve one calendar day for a crew: override wins, the computed
    /// type is preserved alongside, and the holiday flag is attached.
    pub async fn shift_day(&self, date: NaiveDate, crew: Crew) -> ShiftDay {
        let computed = cycle::shift_for_date(date, crew);
        let modification = self.store.modification(date, crew).await;

        match modification {
            Some(m) => ShiftDay {
                date,
                shift_type: m.modified_type,
                is_holiday: holidays::is_holiday(date),
                is_modified: true,
                original_shift_type: Some(computed),
            },
            None => ShiftDay {
                date,
                shift_type: computed,
                is_holiday: holidays::is_holiday(date),
                is_modified: false,
                original_shift_type: None,
            },
        }
    }

    /// Set the shift type for a day. Picking the computed base type removes
    /// any existing override; anything else saves one, replacing a previous
    /// override for the same (date, crew) pair.
    pub async fn update_shift_type(
        &self,
        date: NaiveDate,
        shift_type: ShiftType,
        crew: Crew,
    ) -> Result<(), StorageError> {
        let computed = cycle::shift_for_date(date, crew);

        if shift_type == computed {
            self.store.remove_modification(date, crew).await?;
        } else {
            self.store
                .save_modification(date, computed, shift_type, crew)
                .await?;
        }

        if let Some(usage) = &self.usage {
            usage.track_modification().await;
        }
        Ok(())
    }

    /// Drop every override, restoring all days to their computed shifts.
    pub async fn restore_all_days(&self) -> Result<(), StorageError> {
        self.store.clear_all_modifications().await?;
        if let Some(usage) = &self.usage {
            usage.track_modification().await;
        }
        Ok(())
    }

    /// Annual-leave days taken by `crew` in `year`.
    pub async fn annual_leave_usage(&self, crew: Crew, year: i32) -> usize {
        self.store.annual_leave_usage(crew, year).await
    }

    /// The 42-day (6×7) grid for a month, starting on the configured week
    /// start day. `None` for an invalid year/month.
    pub async fn month_days(
        &self,
        year: i32,
        month: u32,
        crew: Crew,
    ) -> Option<Vec<ShiftDay>> {
        let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)?;
        let week_start = self.store.settings().await.week_start_day;

        let offset = (first_of_month.weekday().num_days_from_sunday() + 7
            - week_start.days_from_sunday())
            % 7;
        let grid_start = first_of_month - Duration::days(offset as i64);

        let mut days = Vec::with_capacity(CALENDAR_GRID_DAYS as usize);
        for i in 0..CALENDAR_GRID_DAYS {
            let date = grid_start + Duration::days(i);
            days.push(self.shift_day(date, crew).await);
        }
        Some(days)
    }
}
