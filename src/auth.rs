use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use crate::models::models::{Account, TokenData};
use crate::core::helpers::{store, verify_password, now_iso};
use crate::core::errors::ApiError;
use crate::config::*;

pub fn login_user(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let creds: serde_json::Value = serde_json::from_slice(req.body())?;
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    let account_id: Option<String> = store.get_json(&username_key(username))?;
    let account = match account_id {
        Some(id) => store.get_json::<Account>(&user_key(&id))?,
        None => None,
    };

    if let Some(account) = account {
        if verify_password(password, &account.password) {
            let token = Uuid::new_v4().to_string();
            let data = TokenData {
                user_id: account.id.clone(),
                created_at: now_iso(),
            };
            store.set_json(&token_key(&token), &data)?;

            let mut tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
            tokens.push(token.clone());
            store.set_json(TOKENS_LIST_KEY, &tokens)?;

            let resp = serde_json::json!({
                "token": token,
                "user_id": account.id
            });
            return Ok(Response::builder()
                .status(200)
                .header("Content-Type", "application/json")
                .body(serde_json::to_vec(&resp)?)
                .build());
        }
    }

    Ok(ApiError::Unauthorized.into())
}

pub fn logout_user(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let auth_header = req.header("Authorization").and_then(|h| h.as_str()).unwrap_or_default();

    if !auth_header.starts_with("Bearer ") {
        return Ok(ApiError::Unauthorized.into());
    }

    let token = auth_header.strip_prefix("Bearer ").unwrap();
    store.delete(&token_key(token))?;

    let mut tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    tokens.retain(|t| t != token);
    store.set_json(TOKENS_LIST_KEY, &tokens)?;

    let resp = serde_json::json!({
        "message": "Logged out successfully"
    });
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&resp)?)
        .build())
}

/// Resolve the caller's account id from the bearer token, if any.
pub fn validate_token(req: &Request) -> Option<String> {
    let store = store();
    let auth_header = req.header("Authorization")?.as_str().unwrap_or_default();
    if !auth_header.starts_with("Bearer ") {
        return None;
    }
    let token = auth_header.strip_prefix("Bearer ").unwrap();
    if let Some(data) = store.get_json::<TokenData>(&token_key(token)).ok()? {
        // Check if token is expired
        if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&data.created_at) {
            let now = chrono::Utc::now();
            let age_hours = (now - created.with_timezone(&chrono::Utc)).num_hours();
            if age_hours > token_expiration_hours() {
                return None;
            }
        }
        // Check if the account still exists
        if store.get_json::<Account>(&user_key(&data.user_id)).ok()?.is_none() {
            return None;
        }
        Some(data.user_id)
    } else {
        None
    }
}
