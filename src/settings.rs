//! Business settings kept in the single `settings` row.

use chrono::Utc;
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    models::SettingsRow, schema::settings, validation::ValidationErrors,
};

pub const SETTINGS_ROW_ID: i32 = 1;
pub const DEFAULT_DEADLINE_DAYS: i32 = 30;
pub const DEFAULT_REMINDER_FREQUENCY_DAYS: i32 = 7;
const MAX_DAYS: i32 = 365;

/// Read once per request and handed to the transition logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSettings {
    pub deadline_days: i32,
    pub reminder_frequency_days: i32,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            deadline_days: DEFAULT_DEADLINE_DAYS,
            reminder_frequency_days: DEFAULT_REMINDER_FREQUENCY_DAYS,
        }
    }
}

impl From<SettingsRow> for LifecycleSettings {
    fn from(row: SettingsRow) -> Self {
        Self {
            deadline_days: row.deadline_days,
            reminder_frequency_days: row.reminder_frequency_days,
        }
    }
}

impl LifecycleSettings {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if !(1..=MAX_DAYS).contains(&self.deadline_days) {
            errors.add(
                "deadline_days",
                format!("deadline_days must be between 1 and {MAX_DAYS}"),
            );
        }
        if !(1..=MAX_DAYS).contains(&self.reminder_frequency_days) {
            errors.add(
                "reminder_frequency_days",
                format!("reminder_frequency_days must be between 1 and {MAX_DAYS}"),
            );
        }
        errors.into_result(())
    }
}

/// Falls back to the defaults when the row is missing.
pub fn load(conn: &mut PgConnection) -> QueryResult<LifecycleSettings> {
    let row = settings::table
        .find(SETTINGS_ROW_ID)
        .first::<SettingsRow>(conn)
        .optional()?;
    Ok(row.map(LifecycleSettings::from).unwrap_or_default())
}

pub fn update(
    conn: &mut PgConnection,
    values: LifecycleSettings,
) -> QueryResult<LifecycleSettings> {
    let now = Utc::now().naive_utc();
    let row = diesel::insert_into(settings::table)
        .values((
            settings::id.eq(SETTINGS_ROW_ID),
            settings::deadline_days.eq(values.deadline_days),
            settings::reminder_frequency_days.eq(values.reminder_frequency_days),
            settings::updated_at.eq(now),
        ))
        .on_conflict(settings::id)
        .do_update()
        .set((
            settings::deadline_days.eq(values.deadline_days),
            settings::reminder_frequency_days.eq(values.reminder_frequency_days),
            settings::updated_at.eq(now),
        ))
        .get_result::<SettingsRow>(conn)?;
    Ok(row.into())
}
