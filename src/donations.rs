//! Donation store: validation and persistence.
//!
//! Submissions arrive as loose optional text (form fields or JSON) and are
//! validated into a structured [`NewDonation`] before anything touches the
//! database. Only the enumerated fields exist on the record, so an
//! unvalidated key can never reach storage. Records are append-only.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection, DbErr, EntityTrait, QueryOrder};

use crate::currency::SUPPORTED_CURRENCIES;
use crate::entities::donation;
use crate::models::donation::DonationInput;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_CURRENCY_LEN: usize = 3;
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Field -> list of messages, in the shape the original API exposes under
/// `errors` in a 422 response.
pub type FieldErrors = BTreeMap<&'static str, Vec<String>>;

/// A validated donation, ready to persist. Constructed only by
/// [`validate`]; the id and timestamp are assigned at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDonation {
    pub donor_name: String,
    pub donor_email: String,
    pub amount: Decimal,
    pub currency: String,
    pub message: Option<String>,
}

/// Validate raw submission fields into a [`NewDonation`].
///
/// Every failing field collects at least one message; nothing is written
/// anywhere on failure. The currency defaults to `base_currency` when
/// absent and must otherwise be one of the supported codes.
pub fn validate(input: &DonationInput, base_currency: &str) -> Result<NewDonation, FieldErrors> {
    let mut errors: FieldErrors = BTreeMap::new();

    let donor_name = match input.donor_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            if name.chars().count() > MAX_NAME_LEN {
                errors
                    .entry("donor_name")
                    .or_default()
                    .push(format!("Donor name may not exceed {MAX_NAME_LEN} characters"));
                None
            } else {
                Some(name.to_string())
            }
        }
        _ => {
            errors
                .entry("donor_name")
                .or_default()
                .push("Donor name is required".to_string());
            None
        }
    };

    let donor_email = match input.donor_email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => {
            let mut field_errors = Vec::new();
            if email.chars().count() > MAX_EMAIL_LEN {
                field_errors.push(format!("Donor email may not exceed {MAX_EMAIL_LEN} characters"));
            }
            if !is_valid_email(email) {
                field_errors.push("Donor email must be a valid email address".to_string());
            }
            if field_errors.is_empty() {
                Some(email.to_string())
            } else {
                errors.entry("donor_email").or_default().extend(field_errors);
                None
            }
        }
        _ => {
            errors
                .entry("donor_email")
                .or_default()
                .push("Donor email is required".to_string());
            None
        }
    };

    let amount = match input.amount.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match Decimal::from_str(raw) {
            Ok(parsed) => {
                let normalized =
                    parsed.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
                if normalized < Decimal::new(1, 2) {
                    errors
                        .entry("amount")
                        .or_default()
                        .push("Amount must be at least 0.01".to_string());
                    None
                } else {
                    Some(normalized)
                }
            }
            Err(_) => {
                errors
                    .entry("amount")
                    .or_default()
                    .push("Amount must be a number".to_string());
                None
            }
        },
        _ => {
            errors
                .entry("amount")
                .or_default()
                .push("Amount is required".to_string());
            None
        }
    };

    let currency = match input.currency.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let upper = code.to_ascii_uppercase();
            if upper.chars().count() > MAX_CURRENCY_LEN {
                errors.entry("currency").or_default().push(format!(
                    "Currency may not exceed {MAX_CURRENCY_LEN} characters"
                ));
                None
            } else if !SUPPORTED_CURRENCIES.contains(&upper.as_str()) {
                errors
                    .entry("currency")
                    .or_default()
                    .push("Unsupported currency code".to_string());
                None
            } else {
                Some(upper)
            }
        }
        _ => Some(base_currency.to_ascii_uppercase()),
    };

    let message = match input.message.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => {
            if text.chars().count() > MAX_MESSAGE_LEN {
                errors
                    .entry("message")
                    .or_default()
                    .push(format!("Message may not exceed {MAX_MESSAGE_LEN} characters"));
                None
            } else {
                Some(Some(text.to_string()))
            }
        }
        _ => Some(None),
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    // Unwraps cannot fire: every None above pushed an error
    Ok(NewDonation {
        donor_name: donor_name.expect("validated donor_name"),
        donor_email: donor_email.expect("validated donor_email"),
        amount: amount.expect("validated amount"),
        currency: currency.expect("validated currency"),
        message: message.expect("validated message"),
    })
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// All donations, newest first. No pagination; the table is small by
/// construction and the admin view wants everything.
pub async fn list_donations(db: &DatabaseConnection) -> Result<Vec<donation::Model>, DbErr> {
    donation::Entity::find()
        .order_by_desc(donation::Column::CreatedAt)
        .order_by_desc(donation::Column::Id)
        .all(db)
        .await
}

/// Persist a validated donation: exactly one row, id and timestamp
/// assigned here.
pub async fn create_donation(
    db: &DatabaseConnection,
    new_donation: NewDonation,
) -> Result<donation::Model, DbErr> {
    let now = Utc::now().fixed_offset();
    let model = donation::ActiveModel {
        id: ActiveValue::NotSet,
        donor_name: ActiveValue::Set(new_donation.donor_name),
        donor_email: ActiveValue::Set(new_donation.donor_email),
        amount: ActiveValue::Set(new_donation.amount),
        currency: ActiveValue::Set(new_donation.currency),
        message: ActiveValue::Set(new_donation.message),
        created_at: ActiveValue::Set(now),
    };
    model.insert(db).await
}
