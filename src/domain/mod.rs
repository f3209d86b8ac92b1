//! Domain types for the order lifecycle, payment ledger and shipments.
//!
//! This module provides:
//! - Lossless money via the Decimal wrapper and the Currency table
//! - The Order aggregate and its status state machine
//! - Payment, Refund and Shipment rows
//! - Checkout intent validation and order construction

pub mod checkout;
pub mod currency;
pub mod decimal;
pub mod order;
pub mod payment;
pub mod primitives;
pub mod refund;
pub mod shipment;

pub use checkout::{OrderIntent, PricingPolicy};
pub use currency::Currency;
pub use decimal::Decimal;
pub use order::{
    FlagPriority, InvoiceInfo, InvoiceType, Order, OrderItem, OrderStatus, ShippingInfo,
    ShippingMethod, Tag, TimelineEvent, TrackingInfo,
};
pub use payment::{NewPayment, Payment, PaymentProvider, PaymentStatus, PaymentType, PayoutStatus};
pub use primitives::{OrderId, PaymentId, RefundId, ShipmentId, TimeMs};
pub use refund::{InvoiceAction, InvoiceDirective, Refund, RefundRequest, RefundStatus, RefundType};
pub use shipment::{
    LogisticsSubType, ManualShipmentRequest, Shipment, ShipmentStatus, StatusUpdate,
};
