use chrono::Utc;
use smart_notifier_domain::{CalendarConnection, TokenSet};
use tracing::warn;

use crate::Context;
use serde::Deserialize;

// https://developers.google.com/identity/protocols/oauth2/web-server#httprest_3

const TOKEN_REFETCH_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh when the access token expires within this threshold
const TOKEN_REFRESH_THRESHOLD_MILLIS: i64 = 1000 * 60 * 2;

struct RefreshTokenRequest {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    access_token: String,
    scope: Option<String>,
    // Access token expiry specified in seconds
    expires_in: i64,
    // Google only rotates the refresh token sometimes
    refresh_token: Option<String>,
}

async fn refresh_access_token(req: RefreshTokenRequest) -> Result<RefreshTokenResponse, ()> {
    let params = [
        ("client_id", req.client_id.as_str()),
        ("client_secret", req.client_secret.as_str()),
        ("refresh_token", req.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let client = reqwest::Client::new();
    let res = client
        .post(TOKEN_REFETCH_ENDPOINT)
        .form(&params)
        .send()
        .await
        .map_err(|_| ())?;

    res.json::<RefreshTokenResponse>().await.map_err(|_| ())
}

/// Returns a bearer token valid for at least the refresh threshold,
/// refreshing and persisting rotated tokens first when needed.
pub async fn get_access_token(connection: &mut CalendarConnection, ctx: &Context) -> Option<String> {
    let now = Utc::now().timestamp_millis();
    if connection.expires_ts - now > TOKEN_REFRESH_THRESHOLD_MILLIS {
        // Current access token is still valid long enough, return it
        return Some(connection.access_token.clone());
    }
    // Access token has or will expire soon, now renew it

    let google_settings = match &ctx.config.google {
        Some(settings) => settings,
        None => {
            warn!("Unable to refresh calendar access token: Google OAuth is not configured");
            return None;
        }
    };

    let refresh_token_req = RefreshTokenRequest {
        client_id: google_settings.client_id.clone(),
        client_secret: google_settings.client_secret.clone(),
        refresh_token: connection.refresh_token.clone(),
    };
    match refresh_access_token(refresh_token_req).await {
        Ok(tokens) => {
            let now = Utc::now().timestamp_millis();
            connection.access_token = tokens.access_token;
            connection.expires_ts = now + tokens.expires_in.max(1) * 1000;
            if let Some(refresh_token) = tokens.refresh_token {
                connection.refresh_token = refresh_token;
            }
            if let Some(scope) = tokens.scope {
                connection.scope = Some(scope);
            }

            let token_set = TokenSet {
                access_token: connection.access_token.clone(),
                refresh_token: connection.refresh_token.clone(),
                expires_ts: connection.expires_ts,
                scope: connection.scope.clone(),
            };
            if let Err(e) = ctx
                .repos
                .calendar_connections
                .save_tokens(&connection.user_id, &token_set)
                .await
            {
                warn!(
                    "Unable to save refreshed calendar tokens for user. Error: {:?}",
                    e
                );
            }

            Some(connection.access_token.clone())
        }
        Err(_) => {
            warn!("Unable to refresh calendar access token for user");
            None
        }
    }
}
