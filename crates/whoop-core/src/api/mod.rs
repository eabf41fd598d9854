mod client;
mod models;
mod page;

pub use client::{ApiClient, ApiError, ApiResult, MAX_PAGE_SIZE};
pub use models::{
    BodyMeasurement, DateRange, HealthData, RateLimitStatus, ResourceKind, UserProfile,
};
