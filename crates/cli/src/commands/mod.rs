//! CLI command implementations, one module per screen.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;

use fiat_parts_storefront::models::{Order, Part};

use crate::app::App;

/// One-line summary of a part.
#[allow(clippy::print_stdout)]
fn print_part_row(app: &App, part: &Part) {
    let category = part
        .category
        .as_ref()
        .map_or("-", |category| category.name.as_str());
    let stock = if part.in_stock() {
        format!("{} in stock", part.stock_quantity)
    } else if part.is_active {
        "out of stock".to_string()
    } else {
        "inactive".to_string()
    };
    println!(
        "{:<38} {:<32} {:>10}  {:<11} {:<16} {}",
        part.id,
        part.name,
        app.price(part.price),
        part.condition,
        category,
        stock
    );
}

/// Full detail of a part.
#[allow(clippy::print_stdout)]
fn print_part_detail(app: &App, part: &Part) {
    println!("{}", part.name);
    println!("  id:         {}", part.id);
    if let Some(number) = &part.part_number {
        println!("  part no.:   {number}");
    }
    println!("  price:      {}", app.price(part.price));
    println!("  condition:  {}", part.condition);
    println!("  stock:      {}", part.stock_quantity);
    if let Some(category) = &part.category {
        println!("  category:   {} ({})", category.name, category.slug);
    }
    if !part.compatible_models.is_empty() {
        println!("  fits:       {}", part.compatible_models.join(", "));
    }
    if !part.is_active {
        println!("  status:     inactive");
    }
    for url in part.image_urls() {
        println!("  image:      {url}");
    }
    if let Some(description) = &part.description {
        println!();
        println!("{description}");
    }
}

/// Order with its items.
#[allow(clippy::print_stdout)]
fn print_order(app: &App, order: &Order) {
    let placed = order
        .created_at
        .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
    println!(
        "Order {}  [{}]  {}  total {}",
        order.id,
        order.status,
        placed,
        app.price(order.total_amount)
    );
    println!(
        "  {} <{}>  {}, {} {}",
        order.customer_name,
        order.customer_email,
        order.shipping_address,
        order.shipping_postal_code,
        order.shipping_city
    );
    for item in &order.items {
        println!(
            "  {:>3} x {:<32} {:>10}  {:>10}",
            item.quantity,
            item.part_name,
            app.price(item.unit_price),
            app.price(item.line_total())
        );
    }
    if let Some(notes) = &order.notes {
        println!("  notes: {notes}");
    }
}
