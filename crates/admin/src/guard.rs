//! Admin authorization.

use fiat_parts_core::{AppRole, UserId};
use fiat_parts_storefront::backend::{BackendClient, Query};
use fiat_parts_storefront::catalog::CatalogService;
use fiat_parts_storefront::session::SessionHolder;
use serde::Deserialize;
use tracing::instrument;

use crate::error::AdminError;

/// The signed-in administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentAdmin {
    pub user_id: UserId,
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct RoleRow {
    role: AppRole,
}

/// Handle for admin operations.
///
/// Only obtainable through [`Admin::authorize`], so holding one means the
/// signed-in user held the `admin` role when it was created.
#[derive(Debug, Clone)]
pub struct Admin {
    pub(crate) client: BackendClient,
    pub(crate) catalog: CatalogService,
    admin: CurrentAdmin,
}

impl Admin {
    /// Check that the session's user is an administrator.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotSignedIn` without a user,
    /// `AdminError::Forbidden` without the admin role, or
    /// `AdminError::Backend` if the role lookup fails.
    #[instrument(skip_all)]
    pub async fn authorize(
        session: &SessionHolder,
        client: BackendClient,
        catalog: CatalogService,
    ) -> Result<Self, AdminError> {
        let user = session.current_user().ok_or(AdminError::NotSignedIn)?;

        let roles: Vec<RoleRow> = client
            .select(
                "user_roles",
                &Query::new().select("role").eq("user_id", &user.id),
            )
            .await?;

        if !roles.iter().any(|row| row.role == AppRole::Admin) {
            tracing::warn!(user_id = %user.id, "Admin access refused");
            return Err(AdminError::Forbidden(
                "administrator role required".to_string(),
            ));
        }

        tracing::debug!(user_id = %user.id, "Admin access granted");
        Ok(Self {
            client,
            catalog,
            admin: CurrentAdmin {
                user_id: user.id,
                email: user.email,
            },
        })
    }

    /// The administrator this handle was issued to.
    #[must_use]
    pub const fn current_admin(&self) -> &CurrentAdmin {
        &self.admin
    }
}
