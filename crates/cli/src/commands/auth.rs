//! Session management commands.

use secrecy::SecretString;
use tracing::info;

use pomelo_core::Email;

/// Log in and merge any anonymous cart into the server cart.
///
/// # Errors
///
/// Returns an error if the email is malformed, the credentials are rejected,
/// or the session cannot be persisted.
pub async fn login(email: &str, password: String) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    let email = Email::parse(email)?;
    let password = SecretString::from(password);

    let user = store.auth().login(&email, &password).await?;
    info!(user_id = %user.id, "Logged in as {}", user.email);

    // The watcher task also reacts to the login; merging here as well makes
    // the CLI deterministic (concurrent triggers collapse into one sync)
    store.cart().merge_local_into_server().await?;
    info!(
        "Cart: {} items, {} total",
        store.cart().total_items(),
        store.cart().total_price()
    );
    Ok(())
}

/// Register a new account and log in as it.
///
/// # Errors
///
/// Returns an error if the email is malformed, registration is rejected, or
/// the session cannot be persisted.
pub async fn register(
    email: &str,
    password: String,
    name: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    let email = Email::parse(email)?;
    let password = SecretString::from(password);

    let user = store.auth().register(&email, &password, name).await?;
    info!(user_id = %user.id, "Registered and logged in as {}", user.email);

    store.cart().merge_local_into_server().await?;
    Ok(())
}

/// Clear the persisted session and the local cart.
///
/// # Errors
///
/// Returns an error if the cleared state cannot be persisted.
pub async fn logout() -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    store.auth().logout()?;
    // The process exits as soon as this command returns, so the cart is
    // cleared here rather than left to the background session watcher
    store.cart().clear_cart().await?;
    info!("Logged out");
    Ok(())
}

/// Show the currently logged-in user.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed.
pub async fn whoami() -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    match store.auth().current_user() {
        Some(user) => info!(user_id = %user.id, "Logged in as {}", user.email),
        None => info!("Not logged in"),
    }
    Ok(())
}
