//! Cart state and its local mutation rules.
//!
//! [`CartState`] is the in-memory cart: an ordered list of [`CartLine`]s keyed
//! by part ID. It knows nothing about where it is persisted; the storefront's
//! cart reconciler decides which backing store a mutation is written to by
//! looking at the [`AddOutcome`] / [`QuantityChange`] each mutation returns.
//!
//! # Invariants
//!
//! - At most one line per part ID.
//! - Every line has `quantity >= 1`. Setting a quantity below 1 removes the line.
//! - Item count and total price are computed from the lines on every read.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::PartId;

/// One product entry in the cart.
///
/// The serialized shape (`{id, name, price, quantity, image, condition}`) is
/// also the element type of the guest cart blob, so `price` is written as a
/// JSON number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: PartId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

impl CartLine {
    /// `price * quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// An item being added to the cart (a line without a quantity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartItem {
    pub id: PartId,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub condition: Option<String>,
}

impl NewCartItem {
    fn into_line(self) -> CartLine {
        CartLine {
            id: self.id,
            name: self.name,
            price: self.price,
            quantity: 1,
            image: self.image,
            condition: self.condition,
        }
    }
}

/// What [`CartState::add`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new line was appended with quantity 1.
    Inserted,
    /// An existing line's quantity went up by one.
    Incremented {
        /// The line's quantity after the increment.
        quantity: u32,
    },
}

/// What [`CartState::set_quantity`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The requested quantity was below 1 and the line was removed.
    Removed,
    /// The line now has this quantity.
    Updated(u32),
    /// No line with that ID exists.
    Missing,
}

/// The in-memory cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CartState {
    lines: Vec<CartLine>,
}

impl CartState {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from lines loaded from a store.
    ///
    /// Lines with quantity 0 are dropped and repeated IDs are folded into the
    /// first occurrence (quantities summed), so the invariants hold no matter
    /// what the store handed back.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut state = Self::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            match state.position(&line.id) {
                Some(idx) => {
                    if let Some(existing) = state.lines.get_mut(idx) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                }
                None => state.lines.push(line),
            }
        }
        state
    }

    /// Parse a cart from its JSON blob.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the blob is not an array of cart lines.
    pub fn from_json(blob: &str) -> Result<Self, serde_json::Error> {
        let lines: Vec<CartLine> = serde_json::from_str(blob)?;
        Ok(Self::from_lines(lines))
    }

    /// Serialize the cart to its JSON blob.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.lines)
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Line for a part ID.
    #[must_use]
    pub fn get(&self, id: &PartId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.id == id)
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of `price * quantity` over all lines.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Add one unit of an item.
    pub fn add(&mut self, item: NewCartItem) -> AddOutcome {
        if let Some(line) = self.lines.iter_mut().find(|line| line.id == item.id) {
            line.quantity = line.quantity.saturating_add(1);
            return AddOutcome::Incremented {
                quantity: line.quantity,
            };
        }
        self.lines.push(item.into_line());
        AddOutcome::Inserted
    }

    /// Remove the line for a part ID, returning it if present.
    pub fn remove(&mut self, id: &PartId) -> Option<CartLine> {
        let idx = self.position(id)?;
        Some(self.lines.remove(idx))
    }

    /// Set a line's quantity. Anything below 1 removes the line.
    pub fn set_quantity(&mut self, id: &PartId, quantity: i64) -> QuantityChange {
        if quantity < 1 {
            return if self.remove(id).is_some() {
                QuantityChange::Removed
            } else {
                QuantityChange::Missing
            };
        }

        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.lines.iter_mut().find(|line| &line.id == id) {
            Some(line) => {
                line.quantity = quantity;
                QuantityChange::Updated(quantity)
            }
            None => QuantityChange::Missing,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn position(&self, id: &PartId) -> Option<usize> {
        self.lines.iter().position(|line| &line.id == id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, price: i64) -> NewCartItem {
        NewCartItem {
            id: PartId::new(id),
            name: name.to_string(),
            price: Decimal::new(price, 0),
            image: None,
            condition: Some("used".to_string()),
        }
    }

    #[test]
    fn test_adding_same_item_twice_increments() {
        let mut cart = CartState::new();
        assert_eq!(cart.add(item("42", "Brake Pad", 100)), AddOutcome::Inserted);
        assert_eq!(
            cart.add(item("42", "Brake Pad", 100)),
            AddOutcome::Incremented { quantity: 2 }
        );

        assert_eq!(cart.len(), 1);
        let line = cart.get(&PartId::new("42")).unwrap();
        assert_eq!(line.quantity, 2);
        assert_eq!(cart.total_price(), Decimal::new(200, 0));
    }

    #[test]
    fn test_totals_over_distinct_items() {
        let mut cart = CartState::new();
        cart.add(item("1", "Clutch Kit", 180));
        cart.add(item("2", "Headlight", 45));
        cart.add(item("2", "Headlight", 45));
        cart.add(item("3", "Wiper", 12));

        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total_price(), Decimal::new(180 + 2 * 45 + 12, 0));
    }

    #[test]
    fn test_set_quantity_below_one_removes() {
        let mut cart = CartState::new();
        cart.add(item("1", "Clutch Kit", 180));
        cart.add(item("2", "Headlight", 45));

        assert_eq!(
            cart.set_quantity(&PartId::new("1"), 0),
            QuantityChange::Removed
        );
        assert_eq!(
            cart.set_quantity(&PartId::new("2"), -3),
            QuantityChange::Removed
        );
        assert!(cart.is_empty());
        assert_eq!(
            cart.set_quantity(&PartId::new("2"), -3),
            QuantityChange::Missing
        );
    }

    #[test]
    fn test_set_quantity_updates() {
        let mut cart = CartState::new();
        cart.add(item("7", "Radiator", 90));
        assert_eq!(
            cart.set_quantity(&PartId::new("7"), 5),
            QuantityChange::Updated(5)
        );
        assert_eq!(cart.item_count(), 5);
        assert_eq!(
            cart.set_quantity(&PartId::new("8"), 5),
            QuantityChange::Missing
        );
    }

    #[test]
    fn test_clear_zeroes_totals() {
        let mut cart = CartState::new();
        cart.add(item("7", "Radiator", 90));
        cart.clear();
        assert_eq!(cart.item_count(), 0);
        assert_eq!(cart.total_price(), Decimal::ZERO);
    }

    #[test]
    fn test_json_blob_round_trip() {
        let mut cart = CartState::new();
        cart.add(item("42", "Brake Pad", 100));
        cart.add(item("42", "Brake Pad", 100));
        cart.add(NewCartItem {
            price: Decimal::new(1250, 2),
            image: Some("https://cdn.example/img.jpg".to_string()),
            ..item("9", "Fuel Cap", 0)
        });

        let blob = cart.to_json().unwrap();
        let restored = CartState::from_json(&blob).unwrap();
        assert_eq!(restored, cart);
    }

    #[test]
    fn test_blob_shape_matches_browser_format() {
        let blob = r#"[{"id":"42","name":"Brake Pad","price":100,"quantity":2,"image":null,"condition":"used"}]"#;
        let cart = CartState::from_json(blob).unwrap();
        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.total_price(), Decimal::new(200, 0));

        let value: serde_json::Value = serde_json::from_str(&cart.to_json().unwrap()).unwrap();
        assert!(value[0]["price"].is_number());
    }

    #[test]
    fn test_malformed_blob_is_an_error() {
        assert!(CartState::from_json("{not json").is_err());
        assert!(CartState::from_json(r#"{"id":"42"}"#).is_err());
    }

    #[test]
    fn test_from_lines_enforces_invariants() {
        let line = |id: &str, quantity| CartLine {
            id: PartId::new(id),
            name: "Part".to_string(),
            price: Decimal::ONE,
            quantity,
            image: None,
            condition: None,
        };
        let cart = CartState::from_lines([line("a", 1), line("b", 0), line("a", 2)]);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get(&PartId::new("a")).unwrap().quantity, 3);
    }
}
