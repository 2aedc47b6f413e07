//! Catalog browsing commands.

use clap::Subcommand;
use fiat_parts_core::{PartCondition, PartId};
use fiat_parts_storefront::catalog::PartFilter;

use super::{print_part_detail, print_part_row};
use crate::app::App;
use crate::error::AppError;

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// List parts for sale
    Parts {
        /// Category slug
        #[arg(short, long)]
        category: Option<String>,

        /// Search text matched against part names
        #[arg(short, long)]
        search: Option<String>,

        /// Condition (new, used, refurbished)
        #[arg(long)]
        condition: Option<PartCondition>,

        /// Maximum number of parts
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one part
    Part {
        /// Part ID
        id: String,
    },
    /// List categories
    Categories,
}

/// Run a catalog command.
///
/// # Errors
///
/// Returns `AppError::Backend` if the catalog can't be read.
#[allow(clippy::print_stdout)]
pub async fn run(app: &App, command: CatalogCommand) -> Result<(), AppError> {
    match command {
        CatalogCommand::Parts {
            category,
            search,
            condition,
            limit,
        } => {
            let filter = PartFilter {
                category_slug: category,
                search,
                condition,
                limit: Some(limit),
            };
            let parts = app.catalog.list_parts(&filter).await?;
            if parts.is_empty() {
                println!("No parts found.");
            }
            for part in &parts {
                print_part_row(app, part);
            }
        }
        CatalogCommand::Part { id } => {
            let part = app.catalog.get_part(&PartId::new(id)).await?;
            print_part_detail(app, &part);
        }
        CatalogCommand::Categories => {
            for category in app.catalog.list_categories().await? {
                match &category.description {
                    Some(description) => {
                        println!("{:<24} {:<32} {description}", category.slug, category.name);
                    }
                    None => println!("{:<24} {}", category.slug, category.name),
                }
            }
        }
    }
    Ok(())
}
