//! Account commands.

use clap::Subcommand;
use fiat_parts_storefront::models::ProfileUpdate;
use fiat_parts_storefront::session::{AuthOutcome, RegisterFields};
use secrecy::SecretString;

use crate::app::App;
use crate::error::AppError;

#[derive(Subcommand)]
pub enum AuthCommand {
    /// Sign in
    Login {
        #[arg(short, long)]
        email: String,

        /// Password (or set `FIAT_PARTS_PASSWORD`)
        #[arg(short, long, env = "FIAT_PARTS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        email: String,

        /// Password, at least 6 characters (or set `FIAT_PARTS_PASSWORD`)
        #[arg(short, long, env = "FIAT_PARTS_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        full_name: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },
    /// Sign out
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Update profile fields
    Profile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        postal_code: Option<String>,
    },
}

fn check(outcome: AuthOutcome) -> Result<(), AppError> {
    if outcome.success {
        Ok(())
    } else {
        Err(AppError::Auth(
            outcome
                .error
                .unwrap_or_else(|| "Authentication failed".to_string()),
        ))
    }
}

/// Run an account command.
///
/// # Errors
///
/// Returns `AppError::Auth` with the backend's message when an operation
/// fails.
#[allow(clippy::print_stdout)]
pub async fn run(app: &App, command: AuthCommand) -> Result<(), AppError> {
    match command {
        AuthCommand::Login { email, password } => {
            check(
                app.session
                    .login(&email, &SecretString::from(password))
                    .await,
            )?;
            println!("Signed in as {}", email.trim());
        }
        AuthCommand::Register {
            email,
            password,
            full_name,
            phone,
        } => {
            check(
                app.session
                    .register(RegisterFields {
                        email,
                        password: SecretString::from(password),
                        full_name,
                        phone,
                    })
                    .await,
            )?;
            match app.session.current_user() {
                Some(user) => println!("Account created; signed in as {}", user.id),
                None => println!("Account created. Check your email to confirm it, then sign in."),
            }
        }
        AuthCommand::Logout => {
            let outcome = app.session.logout().await;
            println!("Signed out");
            check(outcome)?;
        }
        AuthCommand::Whoami => {
            let Some(user) = app.session.current_user() else {
                println!("Not signed in");
                return Ok(());
            };
            println!("{} ({})", user.email.as_deref().unwrap_or("-"), user.id);

            let profile = app.profile().await;
            if let Some(profile) = profile {
                let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
                println!("  name:    {}", field(&profile.full_name));
                println!("  phone:   {}", field(&profile.phone));
                println!(
                    "  address: {}, {} {}",
                    field(&profile.address),
                    field(&profile.postal_code),
                    field(&profile.city)
                );
            }
        }
        AuthCommand::Profile {
            full_name,
            phone,
            address,
            city,
            postal_code,
        } => {
            let update = ProfileUpdate {
                full_name,
                phone,
                address,
                city,
                postal_code,
            };
            if update.is_empty() {
                return Err(AppError::Usage("Nothing to update".to_string()));
            }
            check(app.session.update_profile(update).await)?;
            println!("Profile updated");
        }
    }
    Ok(())
}
