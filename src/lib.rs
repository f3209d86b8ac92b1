pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logistics;
pub mod orchestration;
pub mod webhook;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{Currency, Decimal, Order, OrderId, OrderStatus, TimeMs};
pub use error::{AppError, LedgerError};
pub use logistics::{HttpLogisticsProvider, LogisticsProvider, MockLogisticsProvider};
pub use orchestration::Ledger;
