#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog;
pub mod error;
pub mod sessions;

pub use yle_core::Clock;

pub use app_services::AppServices;
pub use catalog::{AssessmentProvider, InMemoryCatalog};
pub use error::{AppServicesError, CatalogError, SessionError};
pub use sessions::{
    EnvironmentProbe, HISTORY_LIMIT, SessionHistoryItem, SessionHistoryService, SessionManager,
    SessionPersistence, SessionProgress,
};
