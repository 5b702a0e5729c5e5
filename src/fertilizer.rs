//! Fertilizer application schedules.
//!
//! An in-memory store of planned fertilizer applications, seeded with three
//! example schedules at startup. Schedules move through
//! [`ScheduleStatus`]; applying a schedule marks it `COMPLETED`.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    NotFound(String),
    #[error("Invalid status. Must be one of: PENDING, SCHEDULED, COMPLETED, CANCELLED")]
    InvalidStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleStatus {
    Pending,
    Scheduled,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Scheduled => "SCHEDULED",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive.
impl FromStr for ScheduleStatus {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(ScheduleStatus::Pending),
            "SCHEDULED" => Ok(ScheduleStatus::Scheduled),
            "COMPLETED" => Ok(ScheduleStatus::Completed),
            "CANCELLED" => Ok(ScheduleStatus::Cancelled),
            _ => Err(ScheduleError::InvalidStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerSchedule {
    pub id: String,
    pub fertilizer_type: String,
    pub amount: String,
    pub target_field: String,
    pub scheduled_date: NaiveDateTime,
    pub status: ScheduleStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Body of a create request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedule {
    pub fertilizer_type: String,
    pub amount: String,
    pub target_field: String,
    pub scheduled_date: NaiveDateTime,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleUpdate {
    pub fertilizer_type: Option<String>,
    pub amount: Option<String>,
    pub target_field: Option<String>,
    pub scheduled_date: Option<NaiveDateTime>,
    pub status: Option<String>,
}

pub struct ScheduleStore {
    schedules: RwLock<HashMap<String, FertilizerSchedule>>,
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::empty()
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(hh, mm, 0))
        .unwrap_or_default()
}

impl ScheduleStore {
    pub fn empty() -> Self {
        Self {
            schedules: RwLock::new(HashMap::new()),
        }
    }

    /// Store holding the three startup schedules with ids `1`, `2`, `3`.
    pub fn seeded() -> Self {
        let seed = [
            ("1", "NPK 10:26:26", "50kg/acre", "Field A - Wheat", at(2025, 12, 3, 6, 0), ScheduleStatus::Pending),
            ("2", "Urea", "30kg/acre", "Field B - Tomatoes", at(2025, 12, 10, 7, 0), ScheduleStatus::Scheduled),
            ("3", "Organic Compost", "100kg/acre", "Field C - Rice", at(2026, 1, 3, 6, 30), ScheduleStatus::Scheduled),
        ];

        let created = now();
        let schedules = seed
            .into_iter()
            .map(|(id, kind, amount, field, date, status)| {
                (
                    id.to_string(),
                    FertilizerSchedule {
                        id: id.to_string(),
                        fertilizer_type: kind.to_string(),
                        amount: amount.to_string(),
                        target_field: field.to_string(),
                        scheduled_date: date,
                        status,
                        created_at: created,
                        updated_at: created,
                    },
                )
            })
            .collect();

        Self {
            schedules: RwLock::new(schedules),
        }
    }

    /// All schedules ordered by `scheduled_date`, optionally filtered.
    pub fn list(&self, status: Option<ScheduleStatus>) -> Vec<FertilizerSchedule> {
        let map = self.schedules.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<FertilizerSchedule> = map
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.scheduled_date.cmp(&b.scheduled_date));
        out
    }

    pub fn get(&self, id: &str) -> Result<FertilizerSchedule, ScheduleError> {
        let map = self.schedules.read().unwrap_or_else(|e| e.into_inner());
        map.get(id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))
    }

    pub fn create(&self, new: NewSchedule) -> FertilizerSchedule {
        let created = now();
        let schedule = FertilizerSchedule {
            id: uuid::Uuid::new_v4().to_string(),
            fertilizer_type: new.fertilizer_type,
            amount: new.amount,
            target_field: new.target_field,
            scheduled_date: new.scheduled_date,
            status: ScheduleStatus::Scheduled,
            created_at: created,
            updated_at: created,
        };
        let mut map = self.schedules.write().unwrap_or_else(|e| e.into_inner());
        map.insert(schedule.id.clone(), schedule.clone());
        schedule
    }

    pub fn update(&self, id: &str, update: ScheduleUpdate) -> Result<FertilizerSchedule, ScheduleError> {
        // Parse before taking the lock so a bad status leaves the record alone.
        let status = update
            .status
            .as_deref()
            .map(str::parse::<ScheduleStatus>)
            .transpose()?;

        let mut map = self.schedules.write().unwrap_or_else(|e| e.into_inner());
        let existing = map
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;

        if let Some(v) = update.fertilizer_type {
            existing.fertilizer_type = v;
        }
        if let Some(v) = update.amount {
            existing.amount = v;
        }
        if let Some(v) = update.target_field {
            existing.target_field = v;
        }
        if let Some(v) = update.scheduled_date {
            existing.scheduled_date = v;
        }
        if let Some(v) = status {
            existing.status = v;
        }
        existing.updated_at = now();
        Ok(existing.clone())
    }

    pub fn delete(&self, id: &str) -> Result<(), ScheduleError> {
        let mut map = self.schedules.write().unwrap_or_else(|e| e.into_inner());
        map.remove(id)
            .map(|_| ())
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))
    }

    pub fn set_status(&self, id: &str, status: ScheduleStatus) -> Result<FertilizerSchedule, ScheduleError> {
        let mut map = self.schedules.write().unwrap_or_else(|e| e.into_inner());
        let existing = map
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        existing.status = status;
        existing.updated_at = now();
        Ok(existing.clone())
    }

    /// Marks the schedule as applied.
    pub fn apply(&self, id: &str) -> Result<FertilizerSchedule, ScheduleError> {
        self.set_status(id, ScheduleStatus::Completed)
    }

    pub fn len(&self) -> usize {
        self.schedules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
