//! Pure computation engine(s) for deterministic ledger logic.

pub mod refund_policy;
pub mod report;
pub mod revenue;

pub use refund_policy::{refundable_balance, resolve_refund_amount};
pub use report::{build_revenue_report, ProviderTotals, RevenueReport};
pub use revenue::{recompute, RevenueFigures};
