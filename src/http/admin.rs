//! Admin area: login, logout, and the guarded reporting dashboard.
//!
//! Every login failure — unknown email, a non-admin account, a wrong
//! password — redirects with the same generic message; nothing in the
//! response distinguishes which check failed.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use tracing::info;

use crate::auth::authenticate_admin;
use crate::currency::{currency_symbol, round_2dp};
use crate::donations;
use crate::entities::donation;
use crate::session::AdminSession;
use crate::state::AppState;

use super::{HttpError, html_escape};

const SESSION_COOKIE: &str = "caritas_session";
const GENERIC_LOGIN_ERROR: &str =
    "The provided credentials do not match our records or you are not an admin.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/login", get(login_page).post(login))
        .route("/admin/logout", post(logout))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct LogoutForm {
    #[serde(rename = "_token", default)]
    token: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LoginPageQuery {
    error: Option<u8>,
    notice: Option<String>,
}

fn current_session(state: &AppState, jar: &CookieJar) -> Option<Arc<AdminSession>> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()))
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginPageQuery>,
) -> Response {
    if let Some(session) = current_session(&state, &jar) {
        if session.is_admin {
            return Redirect::to("/admin").into_response();
        }
    }
    Html(render_login_page(&query)).into_response()
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, HttpError> {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return Ok(Redirect::to("/admin/login?error=1").into_response());
    }

    let account = authenticate_admin(&state.database, email, &form.password)
        .await
        .map_err(HttpError::internal)?;

    match account {
        Some(account) => {
            // Regenerate: the pre-login cookie value never becomes the
            // authenticated session id
            let previous = jar
                .get(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_string());
            let session_id = state.sessions.regenerate(previous.as_deref(), &account);
            info!("Admin login: {}", account.email);
            let jar = jar.add(session_cookie(session_id));
            Ok((jar, Redirect::to("/admin")).into_response())
        }
        None => {
            info!("Rejected admin login attempt");
            Ok(Redirect::to("/admin/login?error=1").into_response())
        }
    }
}

async fn logout(State(state): State<AppState>, jar: CookieJar, Form(form): Form<LogoutForm>) -> Response {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Redirect::to("/admin/login").into_response();
    };
    let session_id = cookie.value().to_string();

    if let Some(session) = state.sessions.get(&session_id) {
        if session.csrf_token != form.token {
            return HttpError::new(StatusCode::FORBIDDEN, "Invalid session token".to_string())
                .into_response();
        }
        state.sessions.destroy(&session_id);
        info!("Admin logout: {}", session.email);
    }

    let jar = jar.remove(removal_cookie());
    (jar, Redirect::to("/admin/login?notice=logged_out")).into_response()
}

async fn dashboard(State(state): State<AppState>, jar: CookieJar) -> Result<Response, HttpError> {
    let Some(session) = current_session(&state, &jar) else {
        return Ok(Redirect::to("/admin/login?notice=login_required").into_response());
    };
    if !session.is_admin {
        return Ok(Redirect::to("/donate?notice=forbidden").into_response());
    }

    let records = donations::list_donations(&state.database)
        .await
        .map_err(HttpError::internal)?;

    // Sum in the base currency for the summary line; conversion reads the
    // cached snapshot, so this is one fetch at most
    let mut total_base = 0.0;
    for record in &records {
        let amount = record.amount.to_f64().unwrap_or(0.0);
        total_base += state
            .rates
            .convert(amount, &record.currency, &state.base_currency)
            .await;
    }
    let total_base = round_2dp(total_base);

    Ok(Html(render_dashboard(&session, &records, total_base, &state.base_currency)).into_response())
}

fn render_login_page(query: &LoginPageQuery) -> String {
    let banner = if query.error.is_some() {
        format!("<p class=\"error\">{}</p>", html_escape(GENERIC_LOGIN_ERROR))
    } else {
        match query.notice.as_deref() {
            Some("logged_out") => {
                "<p class=\"banner\">You have been logged out successfully.</p>".to_string()
            }
            Some("login_required") => {
                "<p class=\"banner\">Please login to access the admin panel.</p>".to_string()
            }
            _ => String::new(),
        }
    };

    format!(
        "<!doctype html>\n<html>\n<head><title>Admin login</title></head>\n<body>\n\
         <h1>Admin login</h1>\n{banner}\n\
         <form method=\"post\" action=\"/admin/login\">\n\
         <label>Email <input name=\"email\" type=\"email\"></label>\n\
         <label>Password <input name=\"password\" type=\"password\"></label>\n\
         <button type=\"submit\">Log in</button>\n\
         </form>\n</body>\n</html>\n"
    )
}

fn render_dashboard(
    session: &AdminSession,
    records: &[donation::Model],
    total_base: f64,
    base_currency: &str,
) -> String {
    let rows: String = records
        .iter()
        .map(|record| {
            format!(
                "<tr><td>{id}</td><td>{name}</td><td>{email}</td>\
                 <td>{symbol}{amount} {currency}</td><td>{message}</td><td>{created}</td></tr>\n",
                id = record.id,
                name = html_escape(&record.donor_name),
                email = html_escape(&record.donor_email),
                symbol = html_escape(currency_symbol(&record.currency)),
                amount = record.amount,
                currency = html_escape(&record.currency),
                message = html_escape(record.message.as_deref().unwrap_or("")),
                created = record.created_at.format("%Y-%m-%d %H:%M"),
            )
        })
        .collect();

    format!(
        "<!doctype html>\n<html>\n<head><title>Admin dashboard</title></head>\n<body>\n\
         <h1>Donations</h1>\n\
         <p>Signed in as {name}</p>\n\
         <p>Total received: {symbol}{total} {base}</p>\n\
         <table>\n\
         <tr><th>#</th><th>Donor</th><th>Email</th><th>Amount</th><th>Message</th><th>Date</th></tr>\n\
         {rows}\
         </table>\n\
         <form method=\"post\" action=\"/admin/logout\">\n\
         <input type=\"hidden\" name=\"_token\" value=\"{token}\">\n\
         <button type=\"submit\">Log out</button>\n\
         </form>\n</body>\n</html>\n",
        name = html_escape(&session.name),
        symbol = html_escape(currency_symbol(base_currency)),
        total = total_base,
        base = html_escape(base_currency),
        rows = rows,
        token = html_escape(&session.csrf_token),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_session() -> AdminSession {
        AdminSession {
            user_id: 1,
            name: "Admin".to_string(),
            email: "admin@x.com".to_string(),
            is_admin: true,
            csrf_token: "token-123".to_string(),
        }
    }

    #[test]
    fn test_login_page_shows_single_generic_error() {
        let page = render_login_page(&LoginPageQuery {
            error: Some(1),
            notice: None,
        });
        assert!(page.contains(GENERIC_LOGIN_ERROR));
    }

    #[test]
    fn test_dashboard_embeds_csrf_token_and_escapes_donor_text() {
        let record = donation::Model {
            id: 1,
            donor_name: "<img src=x>".to_string(),
            donor_email: "jane@x.com".to_string(),
            amount: rust_decimal::Decimal::new(2500, 2),
            currency: "EUR".to_string(),
            message: Some("hi & bye".to_string()),
            created_at: chrono::Utc::now().fixed_offset(),
        };
        let page = render_dashboard(&admin_session(), &[record], 27.17, "USD");
        assert!(page.contains("name=\"_token\" value=\"token-123\""));
        assert!(!page.contains("<img src=x>"));
        assert!(page.contains("&lt;img src=x&gt;"));
        assert!(page.contains("hi &amp; bye"));
        assert!(page.contains("$27.17 USD"));
        assert!(page.contains("€25.00 EUR"));
    }
}
