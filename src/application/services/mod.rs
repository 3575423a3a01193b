//! Business logic services for the application layer.

pub mod analytics;
pub mod click_service;
pub mod expiry_reaper;
pub mod link_service;
pub mod slug_pool;

pub use click_service::{
    BatchSyncSummary, ClickOutcome, ClickService, FlushResult, PendingClicks, VisitRecording,
};
pub use expiry_reaper::{ExpiryReaper, ReapSummary};
pub use link_service::LinkService;
pub use slug_pool::{RefillSummary, SlugPool};
