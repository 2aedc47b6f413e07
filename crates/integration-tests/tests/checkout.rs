//! Order placement against the fake backend.
//!
//! Run with: cargo test -p fiat-parts-integration-tests

use fiat_parts_core::{NewCartItem, OrderStatus, PartId};
use fiat_parts_integration_tests::{FakeBackend, Storefront};
use fiat_parts_storefront::cart::CartService;
use fiat_parts_storefront::checkout::{CheckoutError, ShippingDetails};
use rust_decimal::Decimal;

const EMAIL: &str = "giulia@officina.it";
const PASSWORD: &str = "correct-horse";

fn shipping() -> ShippingDetails {
    ShippingDetails {
        customer_name: "Giulia Rossi".to_string(),
        customer_email: EMAIL.to_string(),
        customer_phone: Some("+39 011 555 0101".to_string()),
        address: "Via Roma 1".to_string(),
        city: "Torino".to_string(),
        postal_code: "10121".to_string(),
        notes: Some("  ".to_string()),
    }
}

async fn fill_cart(sf: &Storefront, cart: &mut CartService, ids: &[&str]) {
    let catalog = sf.catalog();
    for id in ids {
        let part = catalog
            .get_part(&PartId::new(*id))
            .await
            .expect("Failed to load part");
        cart.add_item(NewCartItem::from(&part)).await;
    }
}

#[tokio::test]
async fn test_guest_checkout_places_order_and_clears_cart() {
    let backend = FakeBackend::start().await;
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);
    let mirror = backend.add_part("Punto Door Mirror", 22.5, None);

    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    fill_cart(&sf, &mut cart, &[wheel.as_str(), wheel.as_str(), mirror.as_str()]).await;

    let order = sf
        .checkout()
        .place_order(&mut cart, &shipping())
        .await
        .expect("Checkout failed");

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, Decimal::new(925, 1));
    assert!(order.user_id.is_none());
    assert!(order.notes.is_none());
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.item_count(), 3);

    let orders = backend.rows("orders");
    assert_eq!(orders.len(), 1);
    assert!(orders[0]["user_id"].is_null());
    assert_eq!(backend.rows("order_items").len(), 2);

    assert!(cart.lines().is_empty());
    assert!(sf.reopen().await.cart().await.lines().is_empty());
}

#[tokio::test]
async fn test_signed_in_checkout_links_order_to_user() {
    let backend = FakeBackend::start().await;
    let user_id = backend.add_user(EMAIL, PASSWORD);
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);

    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);
    let mut cart = sf.cart().await;
    fill_cart(&sf, &mut cart, &[wheel.as_str()]).await;

    let checkout = sf.checkout();
    let order = checkout
        .place_order(&mut cart, &shipping())
        .await
        .expect("Checkout failed");
    assert_eq!(order.user_id.as_ref().map(|id| id.as_str()), Some(user_id.as_str()));
    assert!(backend.rows("cart_items").is_empty());

    let user = sf.session.current_user().expect("Not signed in");
    let history = checkout
        .orders_for_user(&user.id)
        .await
        .expect("Failed to load orders");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, order.id);
    assert_eq!(history[0].items.len(), 1);
    assert_eq!(history[0].items[0].part_name, "Panda Steel Wheel");
}

#[tokio::test]
async fn test_order_keeps_price_at_time_of_purchase() {
    let backend = FakeBackend::start().await;
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);

    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    fill_cart(&sf, &mut cart, &[wheel.as_str()]).await;
    sf.checkout()
        .place_order(&mut cart, &shipping())
        .await
        .expect("Checkout failed");

    let items = backend.rows("order_items");
    assert_eq!(items[0]["part_name"], "Panda Steel Wheel");
    let unit_price: Decimal = serde_json::from_value(items[0]["unit_price"].clone())
        .expect("unit_price is not a decimal");
    assert_eq!(unit_price, Decimal::new(35, 0));
}

#[tokio::test]
async fn test_empty_cart_is_rejected_before_any_request() {
    let backend = FakeBackend::start().await;
    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    backend.clear_requests();

    let result = sf.checkout().place_order(&mut cart, &shipping()).await;
    assert!(matches!(result, Err(CheckoutError::EmptyCart)));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_missing_address_is_rejected() {
    let backend = FakeBackend::start().await;
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);
    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    fill_cart(&sf, &mut cart, &[wheel.as_str()]).await;

    let details = ShippingDetails {
        address: "   ".to_string(),
        ..shipping()
    };
    let result = sf.checkout().place_order(&mut cart, &details).await;
    assert!(matches!(result, Err(CheckoutError::MissingField("address"))));
    assert!(backend.rows("orders").is_empty());
    assert_eq!(cart.item_count(), 1);
}

#[tokio::test]
async fn test_failed_items_insert_rolls_back_order() {
    let backend = FakeBackend::start().await;
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);
    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    fill_cart(&sf, &mut cart, &[wheel.as_str()]).await;

    backend.fail("order_items");
    let result = sf.checkout().place_order(&mut cart, &shipping()).await;
    assert!(matches!(result, Err(CheckoutError::Backend(_))));
    assert!(backend.rows("orders").is_empty());
    assert_eq!(cart.item_count(), 1, "Cart must survive a failed checkout");
}
