//! Core data model: shift types, crews, modifications, and the storage document.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::UserSettings;

/// Annual leave quota per crew member, in days per calendar year.
/// Informational — the store counts usage but does not enforce the limit.
pub const ANNUAL_LEAVE_LIMIT: u32 = 31;

/// The four shift states a calendar day can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    Early,
    Late,
    Off,
    AnnualLeave,
}

impl ShiftType {
    /// Short display label for the shift type.
    pub fn label(self) -> &'static str {
        match self {
            ShiftType::Early => "Early Shift",
            ShiftType::Late => "Late Shift",
            ShiftType::Off => "Day Off",
            ShiftType::AnnualLeave => "Annual Leave",
        }
    }
}

/// The three rotating crews. Static configuration — crews are never
/// created or destroyed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crew {
    David,
    Trevor,
    Paddy,
}

impl Crew {
    pub const ALL: [Crew; 3] = [Crew::David, Crew::Trevor, Crew::Paddy];

    /// Static cycle configuration for this crew.
    pub fn config(self) -> CrewConfig {
        match self {
            Crew::David => CrewConfig {
                display_name: "David's Crew",
                cycle_start: ymd(2024, 12, 30),
                cycle_length: 9,
            },
            Crew::Trevor => CrewConfig {
                display_name: "Trevor's Crew",
                cycle_start: ymd(2025, 1, 2),
                cycle_length: 9,
            },
            Crew::Paddy => CrewConfig {
                display_name: "Paddy's Crew",
                cycle_start: ymd(2025, 1, 5),
                cycle_length: 9,
            },
        }
    }

    /// Parse a crew from its lowercase wire name.
    pub fn from_name(name: &str) -> Option<Crew> {
        match name {
            "david" => Some(Crew::David),
            "trevor" => Some(Crew::Trevor),
            "paddy" => Some(Crew::Paddy),
            _ => None,
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid crew anchor date")
}

/// Per-crew cycle anchor. Cycle length is modeled per-crew even though all
/// three crews currently share a 9-day cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrewConfig {
    pub display_name: &'static str,
    pub cycle_start: NaiveDate,
    pub cycle_length: usize,
}

/// Position of a date within a crew's repeating cycle. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftCycleInfo {
    /// 1-based index into the shift pattern, in `[1, cycle_length]`.
    pub day_in_cycle: usize,
    /// 1-based cycle count from the anchor. Zero or negative for dates
    /// before the anchor.
    pub cycle_number: i64,
    pub shift_type: ShiftType,
}

/// A user override of the computed shift for one (date, crew) pair.
///
/// At most one modification exists per pair — saving a new one for an
/// existing pair replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftModification {
    /// Local calendar date, `YYYY-MM-DD` on the wire.
    pub date: NaiveDate,
    pub crew: Crew,
    /// The computed shift type at the time the override was created.
    pub original_type: ShiftType,
    /// The shift type the user chose instead.
    pub modified_type: ShiftType,
    /// Creation instant, epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl ShiftModification {
    pub fn matches(&self, date: NaiveDate, crew: Crew) -> bool {
        self.date == date && self.crew == crew
    }
}

/// One resolved calendar day for a crew: the effective shift after any
/// override, plus holiday and modification flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDay {
    pub date: NaiveDate,
    pub shift_type: ShiftType,
    pub is_holiday: bool,
    pub is_modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_shift_type: Option<ShiftType>,
}

/// The unit of persistence: everything belonging to one identity.
///
/// Stored as a remote document for authenticated users, or mirrored across
/// the local `modifications`/`settings` keys for anonymous use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageData {
    #[serde(default)]
    pub modifications: Vec<ShiftModification>,
    #[serde(default)]
    pub settings: UserSettings,
}
