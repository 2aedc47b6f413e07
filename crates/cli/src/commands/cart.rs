//! Cart commands.

use clap::Subcommand;
use fiat_parts_core::{NewCartItem, PartId, Price};

use crate::app::App;
use crate::error::AppError;

#[derive(Subcommand)]
pub enum CartCommand {
    /// Show the cart
    Show,
    /// Add one unit of a part
    Add {
        /// Part ID
        id: String,
    },
    /// Remove a part from the cart
    Remove {
        /// Part ID
        id: String,
    },
    /// Set the quantity of a part (0 or less removes it)
    Set {
        /// Part ID
        id: String,
        /// New quantity
        #[arg(allow_hyphen_values = true)]
        quantity: i64,
    },
    /// Empty the cart
    Clear,
}

/// Run a cart command.
///
/// Cart writes never fail the command: a failed remote write is logged and
/// the local cart keeps the change.
///
/// # Errors
///
/// Returns `AppError::Backend` if the part to add can't be looked up.
pub async fn run(app: &App, command: CartCommand) -> Result<(), AppError> {
    let mut cart = app.cart().await;

    match command {
        CartCommand::Show => {}
        CartCommand::Add { id } => {
            let part = app.catalog.get_part(&PartId::new(id)).await?;
            if !part.in_stock() {
                return Err(AppError::Usage(format!("{} is out of stock", part.name)));
            }
            cart.add_item(NewCartItem::from(&part)).await;
        }
        CartCommand::Remove { id } => cart.remove_item(&PartId::new(id)).await,
        CartCommand::Set { id, quantity } => {
            cart.update_quantity(&PartId::new(id), quantity).await;
        }
        CartCommand::Clear => cart.clear().await,
    }

    print_cart(app, &cart);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(app: &App, cart: &fiat_parts_storefront::cart::CartService) {
    if cart.lines().is_empty() {
        println!("Your cart is empty.");
        return;
    }
    for line in cart.lines() {
        let unit = Price::new(line.price, app.currency);
        println!(
            "{:>3} x {:<32} {:>10}  {:>10}  ({})",
            line.quantity,
            line.name,
            unit.display(),
            unit.times(line.quantity).display(),
            line.id
        );
    }
    println!(
        "{} item(s), total {}",
        cart.item_count(),
        app.price(cart.total_price())
    );
}
