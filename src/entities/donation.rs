//! Donation entity: one row per accepted submission.
//!
//! Rows are append-only. There is no update or delete path anywhere in the
//! application; the HTTP layer answers 501 for both.

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "donations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Donor display name
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub donor_name: String,
    /// Donor contact email
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub donor_email: String,
    /// Donated amount, 2 fractional digits
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub amount: Decimal,
    /// ISO 4217 code; defaulted to the configured base currency at creation
    #[sea_orm(column_type = "String(StringLen::N(3))")]
    pub currency: String,
    /// Optional donor message
    #[sea_orm(column_type = "String(StringLen::N(1000))", nullable)]
    pub message: Option<String>,
    /// Timestamp assigned at persistence time
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
