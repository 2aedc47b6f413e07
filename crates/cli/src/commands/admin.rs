//! Back-office commands. All of them require the admin role.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use fiat_parts_admin::{Admin, CategoryInput, PartInput, UploadOwner};
use fiat_parts_core::{CategoryId, OrderId, OrderStatus, PartCondition, PartId};
use fiat_parts_storefront::models::Part;
use rust_decimal::Decimal;

use super::{print_order, print_part_detail, print_part_row};
use crate::app::App;
use crate::error::AppError;

#[derive(Subcommand)]
pub enum AdminCommand {
    /// Manage parts
    Parts {
        #[command(subcommand)]
        action: PartsAction,
    },
    /// Manage categories
    Categories {
        #[command(subcommand)]
        action: CategoriesAction,
    },
    /// Manage orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Upload or remove part images
    Images {
        #[command(subcommand)]
        action: ImagesAction,
    },
}

#[derive(Subcommand)]
pub enum PartsAction {
    /// List all parts, including inactive ones
    List,
    /// Show one part
    Show { id: String },
    /// Create a part
    Create(PartFields),
    /// Update a part; omitted fields keep their current value
    Update {
        id: String,
        #[command(flatten)]
        fields: PartFields,
        /// Drop the current images before adding new ones
        #[arg(long)]
        clear_images: bool,
    },
    /// Delete a part and its images
    Delete { id: String },
}

#[derive(Args)]
pub struct PartFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    part_number: Option<String>,
    #[arg(long)]
    price: Option<Decimal>,
    /// new, used, or refurbished
    #[arg(long)]
    condition: Option<PartCondition>,
    #[arg(long)]
    stock: Option<i32>,
    /// Category ID
    #[arg(long)]
    category: Option<String>,
    /// Compatible model (repeatable)
    #[arg(long = "model")]
    models: Vec<String>,
    /// Hide the part from the storefront
    #[arg(long, conflicts_with = "active")]
    inactive: bool,
    /// Show the part on the storefront
    #[arg(long)]
    active: bool,
    /// Image URL to attach (repeatable)
    #[arg(long = "image")]
    images: Vec<String>,
    /// Image file to upload and attach (repeatable)
    #[arg(long = "upload")]
    uploads: Vec<PathBuf>,
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List,
    /// Create a category
    Create(CategoryFields),
    /// Update a category
    Update {
        id: String,
        #[command(flatten)]
        fields: CategoryFields,
    },
    /// Delete a category
    Delete { id: String },
}

#[derive(Args)]
pub struct CategoryFields {
    #[arg(long)]
    name: String,
    /// Derived from the name when omitted
    #[arg(long)]
    slug: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

impl From<CategoryFields> for CategoryInput {
    fn from(fields: CategoryFields) -> Self {
        Self {
            name: fields.name,
            slug: fields.slug,
            description: fields.description,
        }
    }
}

#[derive(Subcommand)]
pub enum OrdersAction {
    /// List orders, newest first
    List {
        /// Only orders in this status
        #[arg(long)]
        status: Option<OrderStatus>,
    },
    /// Show one order
    Show { id: String },
    /// Change an order's status
    Status { id: String, status: OrderStatus },
}

#[derive(Subcommand)]
pub enum ImagesAction {
    /// Upload an image and print its public URL
    Upload {
        file: PathBuf,
        /// Store under this part's folder instead of temp/
        #[arg(long)]
        part: Option<String>,
    },
    /// Remove an uploaded image by its public URL
    Remove { url: String },
}

/// Run a back-office command.
///
/// # Errors
///
/// Returns `AppError::Admin` if the user isn't an administrator or the
/// operation fails.
pub async fn run(app: &App, command: AdminCommand) -> Result<(), AppError> {
    let admin = app.admin().await?;
    match command {
        AdminCommand::Parts { action } => parts(app, &admin, action).await,
        AdminCommand::Categories { action } => categories(&admin, action).await,
        AdminCommand::Orders { action } => orders(app, &admin, action).await,
        AdminCommand::Images { action } => images(&admin, action).await,
    }
}

#[allow(clippy::print_stdout)]
async fn parts(app: &App, admin: &Admin, action: PartsAction) -> Result<(), AppError> {
    match action {
        PartsAction::List => {
            for part in admin.list_parts().await? {
                print_part_row(app, &part);
            }
        }
        PartsAction::Show { id } => {
            let part = admin.get_part(&PartId::new(id)).await?;
            print_part_detail(app, &part);
        }
        PartsAction::Create(fields) => {
            let mut images = upload_all(admin, &UploadOwner::Temp, &fields.uploads).await?;
            let mut input = fields.into_input(None)?;
            input.images.append(&mut images);
            let part = admin.create_part(&input).await?;
            println!("Created part {}", part.id);
            print_part_detail(app, &part);
        }
        PartsAction::Update {
            id,
            fields,
            clear_images,
        } => {
            let id = PartId::new(id);
            let current = admin.get_part(&id).await?;
            let mut images =
                upload_all(admin, &UploadOwner::Part(id.clone()), &fields.uploads).await?;
            let mut input = fields.into_input(Some(&current))?;
            if clear_images {
                let existing = current.image_urls();
                input.images.retain(|url| !existing.contains(&url.as_str()));
            }
            input.images.append(&mut images);
            let part = admin.update_part(&id, &input).await?;
            println!("Updated part {}", part.id);
            print_part_detail(app, &part);
        }
        PartsAction::Delete { id } => {
            let id = PartId::new(id);
            admin.delete_part(&id).await?;
            println!("Deleted part {id}");
        }
    }
    Ok(())
}

impl PartFields {
    /// Build the full input, taking omitted fields from `current`.
    ///
    /// Image URLs given on the command line are added after the current
    /// ones.
    fn into_input(self, current: Option<&Part>) -> Result<PartInput, AppError> {
        let name = self
            .name
            .or_else(|| current.map(|p| p.name.clone()))
            .ok_or_else(|| AppError::Usage("--name is required".to_string()))?;
        let price = self
            .price
            .or_else(|| current.map(|p| p.price))
            .ok_or_else(|| AppError::Usage("--price is required".to_string()))?;

        let is_active = if self.inactive {
            false
        } else if self.active {
            true
        } else {
            current.is_none_or(|p| p.is_active)
        };

        let mut images: Vec<String> = current
            .map(|p| p.image_urls().into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        images.extend(self.images);

        Ok(PartInput {
            name,
            description: self
                .description
                .or_else(|| current.and_then(|p| p.description.clone())),
            part_number: self
                .part_number
                .or_else(|| current.and_then(|p| p.part_number.clone())),
            price,
            condition: self
                .condition
                .or_else(|| current.map(|p| p.condition))
                .unwrap_or_default(),
            stock_quantity: self
                .stock
                .or_else(|| current.map(|p| p.stock_quantity))
                .unwrap_or(1),
            category_id: self
                .category
                .map(CategoryId::new)
                .or_else(|| current.and_then(|p| p.category_id.clone())),
            compatible_models: if self.models.is_empty() {
                current
                    .map(|p| p.compatible_models.clone())
                    .unwrap_or_default()
            } else {
                self.models
            },
            is_active,
            images,
        })
    }
}

async fn upload_all(
    admin: &Admin,
    owner: &UploadOwner,
    files: &[PathBuf],
) -> Result<Vec<String>, AppError> {
    let mut urls = Vec::with_capacity(files.len());
    for file in files {
        urls.push(admin.upload_image_file(owner, file).await?);
    }
    Ok(urls)
}

#[allow(clippy::print_stdout)]
async fn categories(admin: &Admin, action: CategoriesAction) -> Result<(), AppError> {
    match action {
        CategoriesAction::List => {
            for category in admin.list_categories().await? {
                println!("{:<38} {:<24} {}", category.id, category.slug, category.name);
            }
        }
        CategoriesAction::Create(fields) => {
            let category = admin.create_category(&fields.into()).await?;
            println!("Created category {} ({})", category.id, category.slug);
        }
        CategoriesAction::Update { id, fields } => {
            let category = admin
                .update_category(&CategoryId::new(id), &fields.into())
                .await?;
            println!("Updated category {} ({})", category.id, category.slug);
        }
        CategoriesAction::Delete { id } => {
            let id = CategoryId::new(id);
            admin.delete_category(&id).await?;
            println!("Deleted category {id}");
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn orders(app: &App, admin: &Admin, action: OrdersAction) -> Result<(), AppError> {
    match action {
        OrdersAction::List { status } => {
            let orders = admin.list_orders(status).await?;
            if orders.is_empty() {
                println!("No orders.");
            }
            for order in &orders {
                print_order(app, order);
                println!();
            }
        }
        OrdersAction::Show { id } => {
            let order = admin.get_order(&OrderId::new(id)).await?;
            print_order(app, &order);
        }
        OrdersAction::Status { id, status } => {
            let order = admin
                .update_order_status(&OrderId::new(id), status)
                .await?;
            println!("Order {} is now {}", order.id, order.status);
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn images(admin: &Admin, action: ImagesAction) -> Result<(), AppError> {
    match action {
        ImagesAction::Upload { file, part } => {
            let owner = part.map_or(UploadOwner::Temp, |id| UploadOwner::Part(PartId::new(id)));
            let url = admin.upload_image_file(&owner, &file).await?;
            println!("{url}");
        }
        ImagesAction::Remove { url } => {
            admin.remove_image(&url).await?;
            println!("Removed {url}");
        }
    }
    Ok(())
}
