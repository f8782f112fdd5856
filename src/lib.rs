//! Multi-tenant stock and fulfillment service for eSIM QR vouchers.
//!
//! Stores log in, keep a stock of vouchers, ship them to customers or peer
//! resellers, share subsets by link and revert shipments. An admin provisions
//! store accounts.

pub mod accounts;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod inventory;
pub mod model;
pub mod retention;
pub mod share;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod web;

pub use error::{AppError, AppResult};
pub use model::{EsimRecord, EsimStatus, Store, TenantScope};
pub use web::build_router;
