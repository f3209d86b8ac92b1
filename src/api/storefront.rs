//! Customer-facing checkout boundary.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::{success, ApiJson, AppState, Success};
use crate::domain::{
    Currency, Decimal, Order, OrderId, OrderIntent, OrderItem, OrderStatus, ShippingInfo,
    TimelineEvent,
};
use crate::error::AppError;
use crate::orchestration::CheckoutOutcome;

pub async fn checkout(
    State(state): State<AppState>,
    ApiJson(intent): ApiJson<OrderIntent>,
) -> Result<Json<Success<CheckoutOutcome>>, AppError> {
    let outcome = state.ledger.create_order(intent).await?;
    Ok(success(outcome))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CustomerItem {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub is_preorder: bool,
}

impl From<&OrderItem> for CustomerItem {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            name: item.name.clone(),
            price: item.price,
            quantity: item.quantity,
            is_preorder: item.is_preorder,
        }
    }
}

/// What a shopper may see of an order: no costs, tags or flags.
#[derive(Debug, Serialize)]
pub struct CustomerOrderView {
    pub id: OrderId,
    pub status: OrderStatus,
    pub currency: Currency,
    pub items: Vec<CustomerItem>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_fee: Decimal,
    pub total_amount: Decimal,
    pub has_preorder: bool,
    pub deposit_amount: Decimal,
    pub remaining_amount: Decimal,
    pub shipping: ShippingInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    pub timeline: Vec<TimelineEvent>,
}

impl From<Order> for CustomerOrderView {
    fn from(order: Order) -> Self {
        Self {
            items: order.items.iter().map(CustomerItem::from).collect(),
            id: order.id,
            status: order.status,
            currency: order.currency,
            subtotal: order.subtotal,
            tax_amount: order.tax_amount,
            shipping_fee: order.shipping_fee,
            total_amount: order.total_amount,
            has_preorder: order.has_preorder,
            deposit_amount: order.deposit_amount,
            remaining_amount: order.remaining_amount,
            shipping: order.shipping,
            invoice_number: order.invoice.invoice_number,
            timeline: order.timeline,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerOrderResponse {
    pub order: CustomerOrderView,
}

pub async fn get_customer_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<CustomerOrderResponse>>, AppError> {
    let order = state.ledger.get_order(&OrderId::new(order_id)).await?;
    Ok(success(CustomerOrderResponse {
        order: order.into(),
    }))
}
