//! Orchestration layer: transactional ledger operations and external calls.

pub mod directive;
pub mod ledger;
pub mod shipping;

pub use directive::PaymentDirective;
pub use ledger::{CheckoutOutcome, Ledger, OrderDetail, PaymentOutcome, RefundOutcome};
pub use shipping::{ShipmentOutcome, TrackingOutcome};
