use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use crate::models::models::{Account, TokenData};
use crate::core::db::Store;
use crate::core::helpers::{store, hash_password, verify_password, strip_html, now_iso};
use crate::core::errors::ApiError;
use crate::auth::validate_token;
use crate::config::*;

pub fn get_account(store: &Store, account_id: &str) -> anyhow::Result<Option<Account>> {
    store.get_json(&user_key(account_id))
}

/// Point lookup by handle through the username index.
pub fn find_account_by_handle(store: &Store, handle: &str) -> anyhow::Result<Option<Account>> {
    let account_id: Option<String> = store.get_json(&username_key(handle))?;
    match account_id {
        Some(id) => store.get_json(&user_key(&id)),
        None => Ok(None),
    }
}

/// Compact identity shape used wherever an account is referenced from
/// someone else's data (feeds, follower lists, comments).
pub fn build_account_summary(account: &Account) -> serde_json::Value {
    serde_json::json!({
        "id": account.id,
        "username": account.username,
        "name": account.name,
        "avatar_url": account.avatar_url,
    })
}

/// Public profile shape. Counts are derived from the edge sets, never stored.
pub fn build_account_json(account: &Account) -> serde_json::Value {
    serde_json::json!({
        "id": account.id,
        "username": account.username,
        "name": account.name,
        "bio": account.bio.as_ref().unwrap_or(&String::new()),
        "avatar_url": account.avatar_url,
        "verified": account.verified,
        "followers_count": account.followers.len(),
        "following_count": account.following.len(),
        "created_at": account.created_at,
    })
}

pub fn create_user(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let body = req.body();

    let new_user: serde_json::Value = serde_json::from_slice(body)?;
    let username = new_user["username"].as_str().unwrap_or("");
    let email = new_user["email"].as_str().unwrap_or("");
    let password = new_user["password"].as_str().unwrap_or("");

    if username.is_empty() {
        return Ok(ApiError::BadRequest("Username is required".to_string()).into());
    }
    if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
        return Ok(ApiError::BadRequest("Username must be 3-50 characters".to_string()).into());
    }
    if email.is_empty() || !email.contains('@') {
        return Ok(ApiError::BadRequest("Valid email is required".to_string()).into());
    }
    if password.is_empty() {
        return Ok(ApiError::BadRequest("Password is required".to_string()).into());
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Ok(ApiError::BadRequest("Password must be at least 3 characters".to_string()).into());
    }

    // Sanitize the handle at input time
    let sanitized_username = strip_html(username);

    if store.get_json::<String>(&username_key(&sanitized_username))?.is_some() {
        return Ok(ApiError::Conflict("Username exists".to_string()).into());
    }
    if store.get_json::<String>(&email_key(email))?.is_some() {
        return Ok(ApiError::Conflict("Email exists".to_string()).into());
    }

    let id = Uuid::new_v4().to_string();
    let account = Account {
        id: id.clone(),
        username: sanitized_username.clone(),
        email: email.to_string(),
        name: new_user["name"].as_str().map(|n| strip_html(n)).filter(|n| !n.is_empty()),
        bio: None,
        avatar_url: None,
        password: hash_password(password)?,
        verified: false,
        followers: Vec::new(),
        following: Vec::new(),
        created_at: now_iso(),
    };

    store.set_json(&user_key(&id), &account)?;
    store.set_json(&username_key(&sanitized_username), &id)?;
    store.set_json(&email_key(email), &id)?;

    // The verification mail itself is an external collaborator; here the
    // token is issued and handed back so dev setups can complete the flow.
    let verification_token = Uuid::new_v4().to_string();
    store.set_json(&verify_key(&verification_token), &id)?;
    log::info!("verification token issued for {}", account.username);

    let mut resp = build_account_json(&account);
    resp["verification_token"] = serde_json::Value::String(verification_token);

    Ok(Response::builder()
        .status(201)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&resp)?)
        .build())
}

/// One-shot `verified` transition. The token is consumed on success, so a
/// replay fails with 404.
pub fn verify_email(path: &str) -> anyhow::Result<Response> {
    let token = path.trim_start_matches("/verify/");

    if token.is_empty() || !crate::core::helpers::validate_uuid(token) {
        return Ok(ApiError::BadRequest("Verification token required".to_string()).into());
    }

    let store = store();
    let account_id: Option<String> = store.get_json(&verify_key(token))?;
    let account_id = match account_id {
        Some(id) => id,
        None => return Ok(ApiError::NotFound("Unknown verification token".to_string()).into()),
    };

    let verified = store.update_json(&user_key(&account_id), |doc: &mut Option<Account>| {
        if let Some(account) = doc.as_mut() {
            account.verified = true;
            true
        } else {
            false
        }
    })?;
    store.delete(&verify_key(token))?;

    if !verified {
        return Ok(ApiError::NotFound("User not found".to_string()).into());
    }

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({"verified": true}))?)
        .build())
}

pub fn get_profile(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    if let Some(account) = get_account(&store, &user_id)? {
        let mut resp = build_account_json(&account);
        resp["email"] = serde_json::Value::String(account.email.clone());
        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&resp)?)
            .build())
    } else {
        Ok(ApiError::NotFound("User not found".to_string()).into())
    }
}

pub fn get_user_details(path: &str) -> anyhow::Result<Response> {
    let handle = path.trim_start_matches("/users/");

    if handle.is_empty() {
        return Ok(ApiError::BadRequest("Username required".to_string()).into());
    }

    let store = store();
    if let Some(account) = find_account_by_handle(&store, handle)? {
        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&build_account_json(&account))?)
            .build())
    } else {
        Ok(ApiError::NotFound("User not found".to_string()).into())
    }
}

pub fn update_profile(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();

    if let Some(mut account) = get_account(&store, &user_id)? {
        let value: serde_json::Value = serde_json::from_slice(req.body())?;
        let mut password_changed = false;

        if let Some(name) = value["name"].as_str() {
            if name.len() > MAX_NAME_LENGTH {
                return Ok(ApiError::BadRequest("Name too long (max 100 chars)".to_string()).into());
            }
            let sanitized = strip_html(name);
            account.name = if sanitized.is_empty() { None } else { Some(sanitized) };
        }

        if let Some(bio) = value["bio"].as_str() {
            if bio.len() > MAX_BIO_LENGTH {
                return Ok(ApiError::BadRequest("Bio too long (max 500 chars)".to_string()).into());
            }
            let sanitized = strip_html(bio);
            account.bio = if sanitized.is_empty() { None } else { Some(sanitized) };
        }

        if let Some(avatar_url) = value["avatar_url"].as_str() {
            account.avatar_url = if avatar_url.is_empty() { None } else { Some(avatar_url.to_string()) };
        }

        if let Some(new_password) = value["new_password"].as_str() {
            if new_password.is_empty() || new_password.len() < MIN_PASSWORD_LENGTH {
                return Ok(ApiError::BadRequest("Password must be 3+ characters".to_string()).into());
            }

            let old_password = value["old_password"].as_str().unwrap_or_default();
            if !verify_password(old_password, &account.password) {
                return Ok(ApiError::Unauthorized.into());
            }

            account.password = hash_password(new_password)?;
            password_changed = true;
        }

        store.set_json(&user_key(&user_id), &account)?;

        // If the password changed, invalidate all tokens for this account and
        // issue a fresh one
        let mut response_data = build_account_json(&account);
        if password_changed {
            let all_tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();

            let filtered_tokens: Vec<String> = all_tokens
                .into_iter()
                .filter(|token| {
                    if let Ok(Some(token_data)) = store.get_json::<TokenData>(&token_key(token)) {
                        if token_data.user_id == user_id {
                            let _ = store.delete(&token_key(token));
                            false
                        } else {
                            true
                        }
                    } else {
                        true
                    }
                })
                .collect();

            let new_token = Uuid::new_v4().to_string();
            let token_data = TokenData {
                user_id: user_id.clone(),
                created_at: now_iso(),
            };
            store.set_json(&token_key(&new_token), &token_data)?;

            let mut updated_tokens = filtered_tokens;
            updated_tokens.push(new_token.clone());
            store.set_json(TOKENS_LIST_KEY, &updated_tokens)?;

            response_data["token"] = serde_json::Value::String(new_token);
        }

        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&response_data)?)
            .build())
    } else {
        Ok(ApiError::NotFound("User not found".to_string()).into())
    }
}
