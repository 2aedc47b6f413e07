//! Checkout and order history commands.

use clap::Args;
use fiat_parts_storefront::checkout::ShippingDetails;
use fiat_parts_storefront::models::{AuthUser, Profile};

use super::print_order;
use crate::app::App;
use crate::error::AppError;

/// Shipping details; blank fields fall back to the signed-in user's profile.
#[derive(Args)]
pub struct CheckoutArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    postal_code: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

impl CheckoutArgs {
    fn into_shipping(self, user: Option<&AuthUser>, profile: Option<&Profile>) -> ShippingDetails {
        let or_profile = |arg: Option<String>, field: fn(&Profile) -> Option<&String>| {
            arg.or_else(|| profile.and_then(field).cloned())
                .unwrap_or_default()
        };

        ShippingDetails {
            customer_name: or_profile(self.name, |p| p.full_name.as_ref()),
            customer_email: self
                .email
                .or_else(|| user.and_then(|u| u.email.clone()))
                .unwrap_or_default(),
            customer_phone: self
                .phone
                .or_else(|| profile.and_then(|p| p.phone.clone())),
            address: or_profile(self.address, |p| p.address.as_ref()),
            city: or_profile(self.city, |p| p.city.as_ref()),
            postal_code: or_profile(self.postal_code, |p| p.postal_code.as_ref()),
            notes: self.notes,
        }
    }
}

/// Place an order for the current cart.
///
/// # Errors
///
/// Returns `AppError::Checkout` if the cart is empty, the details are
/// incomplete, or the order can't be stored.
#[allow(clippy::print_stdout)]
pub async fn place_order(app: &App, args: CheckoutArgs) -> Result<(), AppError> {
    let mut cart = app.cart().await;
    let user = app.session.current_user();
    let profile = app.profile().await;
    let shipping = args.into_shipping(user.as_ref(), profile.as_ref());
    let order = app.checkout().place_order(&mut cart, &shipping).await?;

    println!("Thank you! Your order has been placed.");
    print_order(app, &order);
    Ok(())
}

/// List the signed-in user's orders.
///
/// # Errors
///
/// Returns `AppError::Auth` when signed out, or `AppError::Backend` if the
/// orders can't be read.
#[allow(clippy::print_stdout)]
pub async fn list_orders(app: &App) -> Result<(), AppError> {
    let user = app
        .session
        .current_user()
        .ok_or_else(|| AppError::Auth("Sign in to see your orders".to_string()))?;

    let orders = app.checkout().orders_for_user(&user.id).await?;
    if orders.is_empty() {
        println!("No orders yet.");
    }
    for order in &orders {
        print_order(app, order);
        println!();
    }
    Ok(())
}
