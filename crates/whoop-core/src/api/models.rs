use std::fmt;

use chrono::NaiveDate;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Collections fetched for a date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Recovery,
    Sleep,
    Cycle,
    Workout,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Recovery,
        ResourceKind::Sleep,
        ResourceKind::Cycle,
        ResourceKind::Workout,
    ];

    pub fn path(self) -> &'static str {
        match self {
            ResourceKind::Recovery => "/v2/recovery",
            ResourceKind::Sleep => "/v2/activity/sleep",
            ResourceKind::Cycle => "/v2/cycle",
            ResourceKind::Workout => "/v2/activity/workout",
        }
    }

    /// Key used for this kind in aggregated output.
    pub fn key(self) -> &'static str {
        match self {
            ResourceKind::Recovery => "recovery",
            ResourceKind::Sleep => "sleep",
            ResourceKind::Cycle => "cycles",
            ResourceKind::Workout => "workouts",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Inclusive range of whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ApiError> {
        if start > end {
            return Err(ApiError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// `start` at 00:00:00.000 UTC.
    pub fn start_timestamp(&self) -> String {
        format!("{}T00:00:00.000Z", self.start.format(DAY_FORMAT))
    }

    /// `end` at 23:59:59.999 UTC.
    pub fn end_timestamp(&self) -> String {
        format!("{}T23:59:59.999Z", self.end.format(DAY_FORMAT))
    }

    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("start", self.start_timestamp()),
            ("end", self.end_timestamp()),
        ]
    }
}

/// Records of every resource kind for one date range. Kinds that failed to
/// load are empty and listed in `failures`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthData {
    pub recovery: Vec<Value>,
    pub sleep: Vec<Value>,
    pub cycles: Vec<Value>,
    pub workouts: Vec<Value>,
    #[serde(skip)]
    pub failures: Vec<(ResourceKind, String)>,
}

impl HealthData {
    pub fn records(&self, kind: ResourceKind) -> &[Value] {
        match kind {
            ResourceKind::Recovery => &self.recovery,
            ResourceKind::Sleep => &self.sleep,
            ResourceKind::Cycle => &self.cycles,
            ResourceKind::Workout => &self.workouts,
        }
    }

    pub(crate) fn set(&mut self, kind: ResourceKind, records: Vec<Value>) {
        let slot = match kind {
            ResourceKind::Recovery => &mut self.recovery,
            ResourceKind::Sleep => &mut self.sleep,
            ResourceKind::Cycle => &mut self.cycles,
            ResourceKind::Workout => &mut self.workouts,
        };
        *slot = records;
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rate-limit headers observed on the most recent response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Seconds until the window resets, as reported by the provider.
    pub reset: Option<u64>,
}

impl RateLimitStatus {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
        };
        Self {
            limit: read("x-ratelimit-limit"),
            remaining: read("x-ratelimit-remaining"),
            reset: read("x-ratelimit-reset"),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            return name;
        }
        self.email
            .clone()
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyMeasurement {
    pub height_meter: Option<f64>,
    pub weight_kilogram: Option<f64>,
    pub max_heart_rate: Option<i64>,
}
