mod analytics;
mod dashboard;
mod session;

pub use analytics::AnalyticsView;
pub use dashboard::DashboardView;
pub use session::{UploadSession, ViolationBoard};
