use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Orders whose supplier cost is still owed by the seller.
    pub const ACTIVE: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(UnknownVariant::new("order status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfilmentKind {
    Own,
    Drop,
}

/// An order line as far as the ledger cares about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropshipItem {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub order_status: OrderStatus,
    pub fulfilment: FulfilmentKind,
    pub supplier_cost: Decimal,
}

impl DropshipItem {
    pub fn encumbers_balance(&self) -> bool {
        self.fulfilment == FulfilmentKind::Drop && self.order_status.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn only_active_drop_items_encumber() {
        let mut item = DropshipItem {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            order_status: OrderStatus::Paid,
            fulfilment: FulfilmentKind::Drop,
            supplier_cost: dec!(40),
        };
        assert!(item.encumbers_balance());

        item.order_status = OrderStatus::Delivered;
        assert!(!item.encumbers_balance());

        item.order_status = OrderStatus::Shipped;
        item.fulfilment = FulfilmentKind::Own;
        assert!(!item.encumbers_balance());
    }
}
