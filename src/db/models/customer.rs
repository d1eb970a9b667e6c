//! Customer accounts. Staff accounts share the table with a privileged role.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Roles whose sign-ups never show up on the staff dashboard.
pub const PRIVILEGED_ROLES: [&str; 2] = ["admin", "staff"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}
