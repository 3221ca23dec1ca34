//! Donation endpoints: the public form, the JSON API, and the explicit
//! not-implemented answers for update/delete.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::donations::{self, FieldErrors};
use crate::entities::donation;
use crate::models::donation::{DonationInput, DonationPayload};
use crate::state::AppState;

use super::{HttpError, html_escape};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/donate", get(donate_page).post(submit_donation_form))
        .route("/api/donations", get(list_donations).post(create_donation))
        .route(
            "/api/donations/{id}",
            axum::routing::put(not_implemented)
                .patch(not_implemented)
                .delete(not_implemented),
        )
}

#[derive(Debug, Serialize)]
struct DonationListResponse {
    success: bool,
    data: Vec<donation::Model>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct DonationCreatedResponse {
    success: bool,
    message: &'static str,
    data: donation::Model,
}

#[derive(Debug, Serialize)]
struct ValidationErrorResponse {
    success: bool,
    errors: FieldErrors,
}

#[derive(Debug, Serialize)]
struct NotImplementedResponse {
    success: bool,
    error: &'static str,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DonatePageQuery {
    sent: Option<u8>,
    notice: Option<String>,
}

async fn list_donations(
    State(state): State<AppState>,
) -> Result<Json<DonationListResponse>, HttpError> {
    let data = donations::list_donations(&state.database)
        .await
        .map_err(HttpError::internal)?;
    let count = data.len();
    Ok(Json(DonationListResponse {
        success: true,
        data,
        count,
    }))
}

async fn create_donation(
    State(state): State<AppState>,
    Json(payload): Json<DonationPayload>,
) -> Result<Response, HttpError> {
    match donations::validate(&payload.into_input(), &state.base_currency) {
        Ok(new_donation) => {
            let stored = donations::create_donation(&state.database, new_donation)
                .await
                .map_err(HttpError::internal)?;
            info!("Donation #{} accepted: {} {}", stored.id, stored.amount, stored.currency);
            let body = DonationCreatedResponse {
                success: true,
                message: "Donation created successfully",
                data: stored,
            };
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        Err(errors) => {
            let body = ValidationErrorResponse {
                success: false,
                errors,
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response())
        }
    }
}

/// Donation update and delete have no implementation on purpose; answer
/// loudly instead of pretending to succeed.
async fn not_implemented() -> Response {
    let body = NotImplementedResponse {
        success: false,
        error: "Donation update and delete are not supported",
    };
    (StatusCode::NOT_IMPLEMENTED, Json(body)).into_response()
}

async fn donate_page(
    State(state): State<AppState>,
    Query(query): Query<DonatePageQuery>,
) -> Html<String> {
    let banner = if query.sent.is_some() {
        Some("Thank you for your donation!".to_string())
    } else {
        query
            .notice
            .as_deref()
            .map(|notice| notice_text(notice).to_string())
    };
    Html(render_donate_form(
        &state.base_currency,
        banner.as_deref(),
        None,
        &DonationInput::default(),
    ))
}

async fn submit_donation_form(
    State(state): State<AppState>,
    Form(input): Form<DonationInput>,
) -> Result<Response, HttpError> {
    match donations::validate(&input, &state.base_currency) {
        Ok(new_donation) => {
            let stored = donations::create_donation(&state.database, new_donation)
                .await
                .map_err(HttpError::internal)?;
            info!("Donation #{} accepted: {} {}", stored.id, stored.amount, stored.currency);
            Ok(Redirect::to("/donate?sent=1").into_response())
        }
        Err(errors) => {
            let page = render_donate_form(&state.base_currency, None, Some(&errors), &input);
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response())
        }
    }
}

fn notice_text(notice: &str) -> &'static str {
    match notice {
        "forbidden" => "You do not have permission to access that area.",
        _ => "",
    }
}

fn render_donate_form(
    base_currency: &str,
    banner: Option<&str>,
    errors: Option<&FieldErrors>,
    values: &DonationInput,
) -> String {
    let banner_html = banner
        .filter(|text| !text.is_empty())
        .map(|text| format!("<p class=\"banner\">{}</p>", html_escape(text)))
        .unwrap_or_default();

    let field_errors = |field: &str| -> String {
        errors
            .and_then(|errors| errors.get(field))
            .map(|messages| {
                messages
                    .iter()
                    .map(|message| format!("<p class=\"error\">{}</p>", html_escape(message)))
                    .collect::<String>()
            })
            .unwrap_or_default()
    };
    let value = |value: &Option<String>| html_escape(value.as_deref().unwrap_or(""));

    format!(
        "<!doctype html>\n<html>\n<head><title>Donate</title></head>\n<body>\n\
         <h1>Make a donation</h1>\n{banner_html}\n\
         <form method=\"post\" action=\"/donate\">\n\
         <label>Name <input name=\"donor_name\" value=\"{name}\" maxlength=\"255\"></label>{name_errors}\n\
         <label>Email <input name=\"donor_email\" value=\"{email}\" maxlength=\"255\"></label>{email_errors}\n\
         <label>Amount <input name=\"amount\" value=\"{amount}\"></label>{amount_errors}\n\
         <label>Currency <select name=\"currency\">{currency_options}</select></label>{currency_errors}\n\
         <label>Message <textarea name=\"message\" maxlength=\"1000\">{message}</textarea></label>{message_errors}\n\
         <button type=\"submit\">Donate</button>\n\
         </form>\n</body>\n</html>\n",
        banner_html = banner_html,
        name = value(&values.donor_name),
        name_errors = field_errors("donor_name"),
        email = value(&values.donor_email),
        email_errors = field_errors("donor_email"),
        amount = value(&values.amount),
        amount_errors = field_errors("amount"),
        currency_options = currency_options(base_currency, values.currency.as_deref()),
        currency_errors = field_errors("currency"),
        message = value(&values.message),
        message_errors = field_errors("message"),
    )
}

fn currency_options(base_currency: &str, selected: Option<&str>) -> String {
    let selected = selected
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| base_currency.to_ascii_uppercase());
    crate::currency::SUPPORTED_CURRENCIES
        .iter()
        .map(|code| {
            let marker = if *code == selected { " selected" } else { "" };
            format!("<option value=\"{code}\"{marker}>{code}</option>")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_options_marks_selection() {
        let options = currency_options("USD", Some("eur"));
        assert!(options.contains("<option value=\"EUR\" selected>EUR</option>"));
        assert!(options.contains("<option value=\"USD\">USD</option>"));
    }

    #[test]
    fn test_render_donate_form_escapes_values() {
        let mut values = DonationInput::default();
        values.donor_name = Some("<script>alert(1)</script>".to_string());
        let page = render_donate_form("USD", None, None, &values);
        assert!(!page.contains("<script>alert"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_render_donate_form_shows_field_errors() {
        let mut errors = FieldErrors::new();
        errors
            .entry("amount")
            .or_default()
            .push("Amount must be at least 0.01".to_string());
        let page = render_donate_form("USD", None, Some(&errors), &DonationInput::default());
        assert!(page.contains("Amount must be at least 0.01"));
    }
}
