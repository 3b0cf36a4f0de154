//! Pomelo CLI - storefront client from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (the session persists under the state directory)
//! pomelo auth login -e jane@example.com -p hunter2
//!
//! # Browse the catalog
//! pomelo products list
//! pomelo products show p_123
//!
//! # Work the cart (anonymous or authenticated)
//! pomelo cart add p_123 --quantity 2
//! pomelo cart show
//! pomelo cart remove p_123
//!
//! # Log out
//! pomelo auth logout
//! ```
//!
//! # Commands
//!
//! - `auth` - Log in, register, log out, show the current user
//! - `cart` - Inspect and mutate the cart
//! - `products` - Browse the product catalog

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pomelo")]
#[command(author, version, about = "Pomelo storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the session
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Inspect and mutate the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Browse the product catalog
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Log in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Register a new account (and log in)
    Register {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Clear the persisted session
    Logout,
    /// Show the currently logged-in user
    Whoami,
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the cart contents and totals
    Show,
    /// Add a product to the cart
    Add {
        /// Product id
        product_id: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set the absolute quantity of a cart line (0 removes it)
    Update {
        /// Product id
        product_id: String,

        /// New quantity
        quantity: u32,
    },
    /// Remove a product from the cart
    Remove {
        /// Product id
        product_id: String,
    },
    /// Empty the cart
    Clear,
    /// Overwrite the local cart with the server's (requires a session)
    Refresh,
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List the catalog
    List,
    /// Show one product
    Show {
        /// Product id
        product_id: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Auth { action } => match action {
            AuthAction::Login { email, password } => {
                commands::auth::login(&email, password).await?;
            }
            AuthAction::Register {
                email,
                password,
                name,
            } => {
                commands::auth::register(&email, password, name.as_deref()).await?;
            }
            AuthAction::Logout => commands::auth::logout().await?,
            AuthAction::Whoami => commands::auth::whoami().await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show().await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&product_id, quantity).await?,
            CartAction::Update {
                product_id,
                quantity,
            } => commands::cart::update(&product_id, quantity).await?,
            CartAction::Remove { product_id } => commands::cart::remove(&product_id).await?,
            CartAction::Clear => commands::cart::clear().await?,
            CartAction::Refresh => commands::cart::refresh().await?,
        },
        Commands::Products { action } => match action {
            ProductsAction::List => commands::products::list().await?,
            ProductsAction::Show { product_id } => commands::products::show(&product_id).await?,
        },
    }
    Ok(())
}
