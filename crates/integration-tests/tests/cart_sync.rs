//! Cart persistence across identities against the fake backend.
//!
//! Guest carts live in local storage under the `cart` key; signed-in carts
//! live in `cart_items` rows. Run with: cargo test -p fiat-parts-integration-tests

use fiat_parts_core::{NewCartItem, PartId};
use fiat_parts_integration_tests::{FakeBackend, Storefront};
use fiat_parts_storefront::cart::CART_STORAGE_KEY;
use fiat_parts_storefront::local_store::LocalStore;
use rust_decimal::Decimal;

const EMAIL: &str = "giulia@officina.it";
const PASSWORD: &str = "correct-horse";

async fn item(sf: &Storefront, id: &str) -> NewCartItem {
    let part = sf
        .catalog()
        .get_part(&PartId::new(id))
        .await
        .expect("Failed to load part");
    NewCartItem::from(&part)
}

fn cart_rows_for(backend: &FakeBackend, user_id: &str) -> Vec<serde_json::Value> {
    backend
        .rows("cart_items")
        .into_iter()
        .filter(|row| row["user_id"] == user_id)
        .collect()
}

// ============================================================================
// Guest cart
// ============================================================================

#[tokio::test]
async fn test_guest_cart_survives_reload_without_remote_writes() {
    let backend = FakeBackend::start().await;
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);
    let mirror = backend.add_part("Punto Door Mirror", 22.5, None);

    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    cart.add_item(item(&sf, &wheel).await).await;
    cart.add_item(item(&sf, &wheel).await).await;
    cart.add_item(item(&sf, &mirror).await).await;
    assert_eq!(cart.item_count(), 3);
    assert_eq!(cart.total_price(), Decimal::new(925, 1));

    let blob = sf
        .store
        .get(CART_STORAGE_KEY)
        .expect("Failed to read local store")
        .expect("Guest cart not persisted");
    assert!(blob.contains("Panda Steel Wheel"));

    let reloaded = sf.reopen().await;
    let cart = reloaded.cart().await;
    assert_eq!(cart.item_count(), 3);
    assert_eq!(cart.lines().len(), 2);

    assert!(
        !backend.requests().iter().any(|r| r.is_table("cart_items")),
        "Guest cart must not touch cart_items"
    );
}

#[tokio::test]
async fn test_guest_quantity_update_and_removal() {
    let backend = FakeBackend::start().await;
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);

    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    let id = PartId::new(wheel);
    cart.add_item(item(&sf, id.as_str()).await).await;

    cart.update_quantity(&id, 4).await;
    assert_eq!(cart.item_count(), 4);

    cart.update_quantity(&id, 0).await;
    assert!(cart.lines().is_empty());

    let cart = sf.reopen().await.cart().await;
    assert!(cart.lines().is_empty());
}

// ============================================================================
// Signed-in cart
// ============================================================================

#[tokio::test]
async fn test_signed_in_cart_writes_rows() {
    let backend = FakeBackend::start().await;
    let user_id = backend.add_user(EMAIL, PASSWORD);
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);

    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);

    let mut cart = sf.cart().await;
    cart.add_item(item(&sf, &wheel).await).await;
    cart.add_item(item(&sf, &wheel).await).await;

    let rows = cart_rows_for(&backend, &user_id);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quantity"], 2);
    assert!(
        backend
            .requests()
            .iter()
            .filter(|r| r.is_table("cart_items") && r.is_write())
            .all(|r| r.user_id.as_deref() == Some(user_id.as_str())),
        "Cart writes must carry the user's token"
    );

    // Another page load sees the same cart
    let cart = sf.reopen().await.cart().await;
    assert_eq!(cart.item_count(), 2);
    assert_eq!(cart.lines()[0].name, "Panda Steel Wheel");
}

#[tokio::test]
async fn test_login_switches_to_remote_cart_without_merging() {
    let backend = FakeBackend::start().await;
    backend.add_user(EMAIL, PASSWORD);
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);
    let mirror = backend.add_part("Punto Door Mirror", 22.5, None);

    let sf = Storefront::open(&backend).await;
    let mut cart = sf.cart().await;
    cart.add_item(item(&sf, &wheel).await).await;

    assert!(sf.login(EMAIL, PASSWORD).await.success);
    cart.add_item(item(&sf, &mirror).await).await;

    let names: Vec<&str> = cart.lines().iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Punto Door Mirror"]);
    assert_eq!(backend.rows("cart_items").len(), 1);

    // The guest cart is still in local storage and comes back after logout
    assert!(sf.session.logout().await.success);
    assert!(cart.sync_identity().await);
    let names: Vec<&str> = cart.lines().iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Panda Steel Wheel"]);
}

#[tokio::test]
async fn test_remote_failure_keeps_local_change() {
    let backend = FakeBackend::start().await;
    let user_id = backend.add_user(EMAIL, PASSWORD);
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);

    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);
    let mut cart = sf.cart().await;
    let new_item = item(&sf, &wheel).await;

    backend.fail("cart_items");
    cart.add_item(new_item).await;
    assert_eq!(cart.item_count(), 1);
    assert!(cart_rows_for(&backend, &user_id).is_empty());

    // The backend is the source of truth on the next load
    backend.restore("cart_items");
    cart.reload().await;
    assert!(cart.lines().is_empty());
}

#[tokio::test]
async fn test_rows_for_deleted_parts_are_skipped() {
    let backend = FakeBackend::start().await;
    let user_id = backend.add_user(EMAIL, PASSWORD);
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);
    backend.insert(
        "cart_items",
        serde_json::json!({"user_id": user_id, "part_id": wheel, "quantity": 1}),
    );
    backend.insert(
        "cart_items",
        serde_json::json!({"user_id": user_id, "part_id": "gone", "quantity": 5}),
    );

    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);
    let cart = sf.cart().await;

    assert_eq!(cart.lines().len(), 1);
    assert_eq!(cart.item_count(), 1);
}

#[tokio::test]
async fn test_clear_only_removes_own_rows() {
    let backend = FakeBackend::start().await;
    let user_id = backend.add_user(EMAIL, PASSWORD);
    let other = backend.add_user("luca@carrozzeria.it", PASSWORD);
    let wheel = backend.add_part("Panda Steel Wheel", 35.0, None);
    backend.insert(
        "cart_items",
        serde_json::json!({"user_id": other, "part_id": wheel, "quantity": 1}),
    );

    let sf = Storefront::open(&backend).await;
    assert!(sf.login(EMAIL, PASSWORD).await.success);
    let mut cart = sf.cart().await;
    cart.add_item(item(&sf, &wheel).await).await;
    cart.update_quantity(&PartId::new(wheel.clone()), 3).await;
    assert_eq!(cart_rows_for(&backend, &user_id)[0]["quantity"], 3);

    cart.clear().await;
    assert_eq!(cart.item_count(), 0);
    assert!(cart_rows_for(&backend, &user_id).is_empty());
    assert_eq!(cart_rows_for(&backend, &other).len(), 1);
}
