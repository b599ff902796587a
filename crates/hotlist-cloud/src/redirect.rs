//! Redirect-URL token handling.
//!
//! After a redirect-based login (OAuth or magic link) the identity
//! provider sends the user back to the application with either session
//! tokens or an error code embedded in the URL fragment, e.g.
//!
//! `https://app/#access_token=…&refresh_token=…&expires_in=3600` or
//! `https://app/#error=access_denied&error_code=otp_expired&error_description=…`
//!
//! [`parse_redirect`] classifies such a URL; [`strip_auth_params`]
//! produces the clean URL to show once the fragment has been consumed.

use std::collections::HashMap;

use reqwest::Url;

/// Fallback token lifetime when the fragment omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const MSG_LINK_EXPIRED: &str = "Magic link expired. Please request a new one.";
const MSG_ACCESS_DENIED: &str = "Access denied. Sign-in was cancelled.";

/// What a redirect URL turned out to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Session tokens ready to be exchanged for a verified session.
    Tokens {
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    },
    /// An authentication failure with a user-facing message.
    Error { message: String },
    /// Nothing auth-related in the URL.
    None,
}

/// Inspect a redirect URL for embedded session tokens or error codes.
pub fn parse_redirect(url: &str) -> RedirectOutcome {
    let Ok(parsed) = Url::parse(url) else {
        return RedirectOutcome::None;
    };
    let Some(fragment) = parsed.fragment() else {
        return RedirectOutcome::None;
    };

    // The fragment is itself form-urlencoded; reuse the query parser so
    // percent- and plus-decoding match what the provider produced.
    let Ok(as_query) = Url::parse(&format!("http://localhost/?{fragment}")) else {
        return RedirectOutcome::None;
    };
    let params: HashMap<String, String> = as_query
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if params.contains_key("error") || params.contains_key("error_code") {
        return RedirectOutcome::Error {
            message: error_message(&params),
        };
    }

    match (params.get("access_token"), params.get("refresh_token")) {
        (Some(access), Some(refresh)) => RedirectOutcome::Tokens {
            access_token: access.clone(),
            refresh_token: refresh.clone(),
            expires_in: params
                .get("expires_in")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        },
        _ => RedirectOutcome::None,
    }
}

/// Map provider error codes to the message shown to the user.
///
/// Providers report the specific code either as `error` or (behind a
/// generic `error=access_denied`) as `error_code`, so both are checked.
fn error_message(params: &HashMap<String, String>) -> String {
    let code = params
        .get("error_code")
        .or_else(|| params.get("error"))
        .map(String::as_str);

    match code {
        Some("otp_expired") => MSG_LINK_EXPIRED.to_string(),
        Some("access_denied") => MSG_ACCESS_DENIED.to_string(),
        _ => match params.get("error_description") {
            Some(description) if !description.is_empty() => {
                format!("Sign-in failed: {description}")
            }
            _ => "Sign-in failed.".to_string(),
        },
    }
}

/// Return the URL with auth parameters (query and fragment) removed, for
/// redisplay after the tokens have been processed.
pub fn strip_auth_params(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.set_query(None);
            parsed.into()
        }
        Err(_) => url.to_string(),
    }
}
