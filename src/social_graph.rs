use spin_sdk::http::{Request, Response};
use crate::models::models::Account;
use crate::core::db::Store;
use crate::core::helpers::store;
use crate::core::errors::ApiError;
use crate::auth::validate_token;
use crate::users::{find_account_by_handle, get_account, build_account_summary};
use crate::config::*;

pub struct FollowChange {
    pub following: bool,
    pub followers_count: usize,
}

pub enum FollowOutcome {
    Toggled(FollowChange),
    TargetMissing,
    /// The mirror write could not be applied and the first side was rolled back.
    Inconsistent,
}

/// Flip the follow edge between viewer and target.
///
/// Invariant maintained on success: viewer is in target's `followers` exactly
/// when target is in viewer's `following`. The membership decision runs inside
/// `update_json`, so two concurrent toggles cannot both add or both remove.
pub fn follow_toggle(store: &Store, viewer_id: &str, target_id: &str) -> anyhow::Result<FollowOutcome> {
    let change = store.update_json(&user_key(target_id), |doc: &mut Option<Account>| {
        let account = doc.as_mut()?;
        let following = match account.followers.iter().position(|id| id == viewer_id) {
            Some(pos) => {
                account.followers.remove(pos);
                false
            }
            None => {
                account.followers.push(viewer_id.to_string());
                true
            }
        };
        Some(FollowChange {
            following,
            followers_count: account.followers.len(),
        })
    })?;
    let change = match change {
        Some(change) => change,
        None => return Ok(FollowOutcome::TargetMissing),
    };

    // Mirror on the viewer's following set
    let mirrored = store.update_json(&user_key(viewer_id), |doc: &mut Option<Account>| {
        match doc.as_mut() {
            None => false,
            Some(account) => {
                if change.following {
                    if !account.following.iter().any(|id| id == target_id) {
                        account.following.push(target_id.to_string());
                    }
                } else {
                    account.following.retain(|id| id != target_id);
                }
                true
            }
        }
    })?;

    if !mirrored {
        // Undo the first side so a half-applied pair is never reported as success
        log::warn!("rolling back follow edge {} -> {}", viewer_id, target_id);
        store.update_json(&user_key(target_id), |doc: &mut Option<Account>| {
            if let Some(account) = doc.as_mut() {
                if change.following {
                    account.followers.retain(|id| id != viewer_id);
                } else if !account.followers.iter().any(|id| id == viewer_id) {
                    account.followers.push(viewer_id.to_string());
                }
            }
        })?;
        return Ok(FollowOutcome::Inconsistent);
    }

    Ok(FollowOutcome::Toggled(change))
}

/// Expand a list of account ids into identity summaries, skipping dangling ids.
pub fn expand_members(store: &Store, ids: &[String]) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut members = Vec::new();
    for id in ids {
        if let Some(account) = get_account(store, id)? {
            members.push(build_account_summary(&account));
        }
    }
    Ok(members)
}

// === HTTP Handlers ===

pub fn handle_follow_toggle(req: Request) -> anyhow::Result<Response> {
    let viewer_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let handle = req.path().trim_start_matches("/follow/").to_string();
    if handle.is_empty() {
        return Ok(ApiError::BadRequest("Username required".to_string()).into());
    }

    let store = store();
    let target = match find_account_by_handle(&store, &handle)? {
        Some(account) => account,
        None => return Ok(ApiError::NotFound("Target user not found".to_string()).into()),
    };
    if target.id == viewer_id {
        return Ok(ApiError::BadRequest("Cannot follow yourself".to_string()).into());
    }

    match follow_toggle(&store, &viewer_id, &target.id)? {
        FollowOutcome::Toggled(change) => Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&serde_json::json!({
                "following": change.following,
                "followers_count": change.followers_count,
            }))?)
            .build()),
        FollowOutcome::TargetMissing => {
            Ok(ApiError::NotFound("Target user not found".to_string()).into())
        }
        FollowOutcome::Inconsistent => {
            Ok(ApiError::Conflict("Follow state changed concurrently, try again".to_string()).into())
        }
    }
}

pub fn get_followers_list(req: Request) -> anyhow::Result<Response> {
    let viewer_id = validate_token(&req);
    let handle = req.path().trim_start_matches("/followers/").to_string();

    if handle.is_empty() {
        return Ok(ApiError::BadRequest("Username required".to_string()).into());
    }

    let store = store();
    let target = match find_account_by_handle(&store, &handle)? {
        Some(account) => account,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let followers = expand_members(&store, &target.followers)?;
    let is_following = viewer_id
        .as_deref()
        .map(|v| target.followers.iter().any(|id| id == v))
        .unwrap_or(false);

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "followers": followers,
            "count": target.followers.len(),
            "is_following": is_following,
        }))?)
        .build())
}

pub fn get_following_list(req: Request) -> anyhow::Result<Response> {
    let viewer_id = validate_token(&req);
    let handle = req.path().trim_start_matches("/following/").to_string();

    if handle.is_empty() {
        return Ok(ApiError::BadRequest("Username required".to_string()).into());
    }

    let store = store();
    let target = match find_account_by_handle(&store, &handle)? {
        Some(account) => account,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let following = expand_members(&store, &target.following)?;
    let is_following = viewer_id
        .as_deref()
        .map(|v| target.followers.iter().any(|id| id == v))
        .unwrap_or(false);

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&serde_json::json!({
            "following": following,
            "count": target.following.len(),
            "is_following": is_following,
        }))?)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::helpers::now_iso;
    use uuid::Uuid;

    fn seed_account(store: &Store) -> Account {
        let id = Uuid::new_v4().to_string();
        let account = Account {
            id: id.clone(),
            username: format!("user_{}", &id[..8]),
            email: format!("{}@example.com", id),
            name: None,
            bio: None,
            avatar_url: None,
            password: "hash".to_string(),
            verified: false,
            followers: Vec::new(),
            following: Vec::new(),
            created_at: now_iso(),
        };
        store.set_json(&user_key(&id), &account).unwrap();
        store.set_json(&username_key(&account.username), &id).unwrap();
        account
    }

    fn reload(store: &Store, id: &str) -> Account {
        get_account(store, id).unwrap().unwrap()
    }

    #[test]
    fn follow_creates_mirrored_edges() {
        let store = store();
        let alice = seed_account(&store);
        let bob = seed_account(&store);

        let outcome = follow_toggle(&store, &alice.id, &bob.id).unwrap();
        let change = match outcome {
            FollowOutcome::Toggled(change) => change,
            _ => panic!("expected a toggle"),
        };
        assert!(change.following);
        assert_eq!(change.followers_count, 1);

        let bob = reload(&store, &bob.id);
        let alice = reload(&store, &alice.id);
        assert!(bob.followers.contains(&alice.id));
        assert!(alice.following.contains(&bob.id));
        assert!(bob.following.is_empty());
        assert!(alice.followers.is_empty());
    }

    #[test]
    fn double_toggle_restores_original_state() {
        let store = store();
        let alice = seed_account(&store);
        let bob = seed_account(&store);

        follow_toggle(&store, &alice.id, &bob.id).unwrap();
        let outcome = follow_toggle(&store, &alice.id, &bob.id).unwrap();
        let change = match outcome {
            FollowOutcome::Toggled(change) => change,
            _ => panic!("expected a toggle"),
        };
        assert!(!change.following);
        assert_eq!(change.followers_count, 0);

        let bob = reload(&store, &bob.id);
        let alice = reload(&store, &alice.id);
        assert!(bob.followers.is_empty());
        assert!(alice.following.is_empty());
    }

    #[test]
    fn repeated_follows_never_duplicate_edges() {
        let store = store();
        let alice = seed_account(&store);
        let bob = seed_account(&store);

        for _ in 0..4 {
            follow_toggle(&store, &alice.id, &bob.id).unwrap();
        }
        // Even number of toggles: back to the empty state, no duplicates ever
        let bob = reload(&store, &bob.id);
        assert!(bob.followers.is_empty());

        follow_toggle(&store, &alice.id, &bob.id).unwrap();
        let bob = reload(&store, &bob.id);
        assert_eq!(bob.followers.len(), 1);
    }

    #[test]
    fn toggle_against_missing_target() {
        let store = store();
        let alice = seed_account(&store);

        let outcome = follow_toggle(&store, &alice.id, "no-such-account").unwrap();
        assert!(matches!(outcome, FollowOutcome::TargetMissing));
        let alice = reload(&store, &alice.id);
        assert!(alice.following.is_empty());
    }

    #[test]
    fn missing_viewer_rolls_back_target_side() {
        let store = store();
        let bob = seed_account(&store);

        let outcome = follow_toggle(&store, "ghost-viewer", &bob.id).unwrap();
        assert!(matches!(outcome, FollowOutcome::Inconsistent));
        let bob = reload(&store, &bob.id);
        assert!(bob.followers.is_empty());
    }
}
