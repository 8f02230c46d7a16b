//! Customer Manager CLI - migrations and a terminal front-end for the API.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! cm migrate
//!
//! # Sign up, then manage records
//! cm register -e ana@example.com -n "Ana" -p 's3cret-pass'
//! cm customers create --id-number 9001015009087 --first-name Ana --last-name Diaz \
//!     --email ana.d@example.com --address "123 Main St"
//! cm customers list --search diaz
//!
//! # Address lookup
//! cm autocomplete "123 Mai"
//! ```
//!
//! # Environment Variables
//!
//! - `CM_API_URL` - Server base URL (default `http://127.0.0.1:3000`)
//! - `CM_TOKEN_FILE` - Where the session token is kept (default `.cm-token`)
//! - `CM_DATABASE_URL` - Database for `cm migrate`

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};

use customer_manager_client::ClientError;
use customer_manager_core::{CustomerDraft, CustomerId, CustomerPatch};

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "cm")]
#[command(author, version, about = "Customer Manager CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        #[arg(short, long, env = "CM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "CM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and revoke the session token
    Logout,
    /// Show the signed-in user's profile
    Whoami,
    /// Reset a forgotten password
    PasswordReset {
        #[command(subcommand)]
        action: PasswordResetAction,
    },
    /// Manage customer records
    Customers {
        #[command(subcommand)]
        action: CustomerAction,
    },
    /// Look up the best match for an address
    Geocode { address: String },
    /// Suggest addresses for partial input
    Autocomplete { partial: String },
}

#[derive(Subcommand)]
enum PasswordResetAction {
    /// Email a reset link
    Request {
        #[arg(short, long)]
        email: String,
    },
    /// Set a new password with the emailed token
    Confirm {
        #[arg(short, long)]
        token: String,

        #[arg(short, long, env = "CM_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum CustomerAction {
    /// List your customers
    List {
        /// Only show records matching this term
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Search as you type, one term per line on stdin
    Search,
    /// Show one customer
    Get { id: CustomerId },
    /// Create a customer
    Create {
        #[command(flatten)]
        fields: NewCustomerArgs,

        /// Save without looking up coordinates
        #[arg(long)]
        no_geocode: bool,
    },
    /// Change fields of a customer
    Update {
        id: CustomerId,

        #[command(flatten)]
        fields: CustomerChangeArgs,

        /// Keep coordinates when the address changes
        #[arg(long)]
        no_geocode: bool,
    },
    /// Delete a customer
    Delete { id: CustomerId },
}

#[derive(Args)]
struct NewCustomerArgs {
    #[arg(long)]
    id_number: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: String,
}

impl From<NewCustomerArgs> for CustomerDraft {
    fn from(args: NewCustomerArgs) -> Self {
        Self {
            id_number: args.id_number,
            first_name: args.first_name,
            last_name: args.last_name,
            email: args.email,
            phone: args.phone,
            address: args.address,
            ..Self::default()
        }
    }
}

#[derive(Args)]
struct CustomerChangeArgs {
    #[arg(long)]
    id_number: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    /// New phone; an empty value removes it
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

impl From<CustomerChangeArgs> for CustomerPatch {
    fn from(args: CustomerChangeArgs) -> Self {
        Self {
            id_number: args.id_number,
            first_name: args.first_name,
            last_name: args.last_name,
            email: args.email,
            phone: args.phone,
            address: args.address,
            ..Self::default()
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        let message = e
            .downcast_ref::<ClientError>()
            .map_or_else(|| e.to_string(), ClientError::user_message);
        tracing::error!("Command failed: {message}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if matches!(cli.command, Commands::Migrate) {
        commands::migrate::run().await?;
        return Ok(());
    }

    let ctx = Context::load().await?;
    match cli.command {
        Commands::Migrate => {}
        Commands::Register {
            email,
            name,
            password,
        } => commands::auth::register(&ctx, &email, &password, &name).await?,
        Commands::Login { email, password } => {
            commands::auth::login(&ctx, &email, &password).await?;
        }
        Commands::Logout => commands::auth::logout(&ctx).await?,
        Commands::Whoami => commands::auth::profile(&ctx).await?,
        Commands::PasswordReset { action } => match action {
            PasswordResetAction::Request { email } => {
                commands::auth::request_password_reset(&ctx, &email).await?;
            }
            PasswordResetAction::Confirm { token, password } => {
                commands::auth::confirm_password_reset(&ctx, &token, &password).await?;
            }
        },
        Commands::Customers { action } => match action {
            CustomerAction::List { search } => {
                commands::customers::list(&ctx, search.as_deref()).await?;
            }
            CustomerAction::Search => commands::customers::live_search(&ctx).await?,
            CustomerAction::Get { id } => commands::customers::get(&ctx, id).await?,
            CustomerAction::Create { fields, no_geocode } => {
                commands::customers::create(&ctx, fields.into(), !no_geocode).await?;
            }
            CustomerAction::Update {
                id,
                fields,
                no_geocode,
            } => commands::customers::update(&ctx, id, fields.into(), !no_geocode).await?,
            CustomerAction::Delete { id } => commands::customers::delete(&ctx, id).await?,
        },
        Commands::Geocode { address } => commands::geocode::geocode(&ctx, &address).await?,
        Commands::Autocomplete { partial } => {
            commands::geocode::autocomplete(&ctx, &partial).await?;
        }
    }
    Ok(())
}
