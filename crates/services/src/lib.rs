#![forbid(unsafe_code)]

pub mod app_services;
pub mod dashboard;
pub mod error;
pub mod history;
pub mod test_session;

pub use exam_core::Clock;

pub use app_services::AppServices;
pub use dashboard::{Dashboard, DashboardService, LifetimeSummary};
pub use error::{AppServicesError, DashboardError, HistoryError, TestSessionError};
pub use history::{
    HISTORY_PAGE_SIZE, HistoryDetail, HistoryFilter, HistoryItem, HistoryPage, HistoryService,
    HistoryStatusFilter,
};
pub use test_session::{StartTest, TestSessionService};
