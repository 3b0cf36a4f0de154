//! Cart line type shared between the local cart and the server cart client.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::id::ProductId;

/// A single line in a cart.
///
/// ## Invariants
///
/// - At most one line per [`ProductId`] within a cart (the cart stores
///   enforce this; adding an existing product increments its quantity).
/// - `quantity` is always >= 1. Reducing a quantity to zero removes the line
///   instead of keeping a zero-quantity entry.
/// - `unit_price` is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Opaque product identifier, unique within a cart.
    pub product_id: ProductId,
    /// Display name of the product.
    pub name: String,
    /// Price per unit in the store currency.
    pub unit_price: Decimal,
    /// Number of units. Always >= 1.
    pub quantity: u32,
    /// Product image reference, if any.
    pub image_url: Option<String>,
}

impl CartLine {
    /// Total price of this line (`unit_price` x `quantity`).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    fn line(quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new("p_1"),
            name: "Pomelo".to_string(),
            unit_price: dec!(10.00),
            quantity,
            image_url: None,
        }
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line(3).line_total(), dec!(30.00));
        assert_eq!(line(1).line_total(), dec!(10.00));
    }

    #[test]
    fn test_cart_line_serde_round_trip() {
        let original = CartLine {
            product_id: ProductId::new("p_9"),
            name: "Grapefruit".to_string(),
            unit_price: dec!(4.25),
            quantity: 2,
            image_url: Some("https://cdn.example.com/p_9.jpg".to_string()),
        };
        let json = serde_json::to_string(&original).expect("serialize");
        assert!(json.contains("\"productId\""));
        assert!(json.contains("\"unitPrice\""));
        let back: CartLine = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, original);
    }
}
