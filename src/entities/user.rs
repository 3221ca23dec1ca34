//! User entity for admin authentication.
//!
//! Accounts are provisioned out-of-band (startup seed); the application
//! never writes to this table through a public endpoint.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub name: String,
    /// Unique login identifier
    #[sea_orm(column_type = "String(StringLen::N(255))", unique)]
    pub email: String,
    /// Argon2 PHC hash string, never the plaintext
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub password: String,
    /// Only admins may enter the reporting view
    pub is_admin: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
