//! User settings: week layout preferences, labels, theme, crew selection.

use serde::{Deserialize, Serialize};

use crate::types::Crew;

/// Short weekday names in Sunday-first order, matching `WeekStartDay` values.
pub const WEEK_DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// First day of the calendar week. Numeric on the wire (Sunday = 0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum WeekStartDay {
    #[default]
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl WeekStartDay {
    /// Offset from Sunday, 0..=6.
    pub fn days_from_sunday(self) -> u32 {
        self as u32
    }
}

impl From<WeekStartDay> for u8 {
    fn from(day: WeekStartDay) -> u8 {
        day as u8
    }
}

impl TryFrom<u8> for WeekStartDay {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WeekStartDay::Sunday),
            1 => Ok(WeekStartDay::Monday),
            2 => Ok(WeekStartDay::Tuesday),
            3 => Ok(WeekStartDay::Wednesday),
            4 => Ok(WeekStartDay::Thursday),
            5 => Ok(WeekStartDay::Friday),
            6 => Ok(WeekStartDay::Saturday),
            other => Err(format!("Invalid week start day: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    Auto,
}

/// Per-user settings singleton. Created with defaults on first use and only
/// ever overwritten, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub week_start_day: WeekStartDay,
    #[serde(default = "default_show_shift_labels")]
    pub show_shift_labels: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_crew: Option<Crew>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_completed_initial_setup: Option<bool>,
}

fn default_show_shift_labels() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            week_start_day: WeekStartDay::Sunday,
            show_shift_labels: true,
            theme: Some(Theme::Auto),
            selected_crew: None,
            has_completed_initial_setup: None,
        }
    }
}

impl UserSettings {
    /// Apply a partial update, returning the merged settings.
    pub fn apply(&self, update: SettingsUpdate) -> UserSettings {
        UserSettings {
            week_start_day: update.week_start_day.unwrap_or(self.week_start_day),
            show_shift_labels: update.show_shift_labels.unwrap_or(self.show_shift_labels),
            theme: update.theme.or(self.theme),
            selected_crew: update.selected_crew.or(self.selected_crew),
            has_completed_initial_setup: update
                .has_completed_initial_setup
                .or(self.has_completed_initial_setup),
        }
    }

    /// Short weekday names rotated so the configured start day comes first.
    pub fn ordered_week_days(&self) -> [&'static str; 7] {
        let start = self.week_start_day.days_from_sunday() as usize;
        std::array::from_fn(|i| WEEK_DAYS[(start + i) % 7])
    }
}

/// Partial settings update — unset fields keep their current values.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub week_start_day: Option<WeekStartDay>,
    pub show_shift_labels: Option<bool>,
    pub theme: Option<Theme>,
    pub selected_crew: Option<Crew>,
    pub has_completed_initial_setup: Option<bool>,
}

impl SettingsUpdate {
    /// Update used when a crew is picked during initial setup: selecting a
    /// crew also marks setup as completed.
    pub fn select_crew(crew: Crew) -> Self {
        SettingsUpdate {
            selected_crew: Some(crew),
            has_completed_initial_setup: Some(true),
            ..Default::default()
        }
    }
}
