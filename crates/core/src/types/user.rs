//! Authenticated user record as returned by the commerce API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::email::Email;
use crate::types::id::UserId;

/// A user account known to the remote commerce API.
///
/// The record is opaque to the client beyond display purposes; the API is the
/// source of truth for account data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Server-assigned user identifier.
    pub id: UserId,
    /// Account email address.
    pub email: Email,
    /// Display name, if the account has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Account creation timestamp, if the API reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
