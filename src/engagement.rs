use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use crate::models::models::{Comment, Post, ViewRecord};
use crate::core::db::Store;
use crate::core::helpers::{store, strip_html, now_iso, now_unix};
use crate::core::errors::ApiError;
use crate::auth::validate_token;
use crate::config::*;

pub struct LikeChange {
    pub liked: bool,
    pub like_count: usize,
}

pub enum CommentDelete {
    Deleted,
    PostMissing,
    CommentMissing,
    NotAllowed,
}

/// Flip the viewer's membership in the post's likes set. Single-document
/// mutation; the decision runs inside the atomic update. `None` means the
/// post does not exist.
pub fn like_toggle(store: &Store, viewer_id: &str, post_id: &str) -> anyhow::Result<Option<LikeChange>> {
    store.update_json(&post_key(post_id), |doc: &mut Option<Post>| {
        let post = doc.as_mut()?;
        let liked = match post.likes.iter().position(|id| id == viewer_id) {
            Some(pos) => {
                post.likes.remove(pos);
                false
            }
            None => {
                post.likes.push(viewer_id.to_string());
                true
            }
        };
        Some(LikeChange {
            liked,
            like_count: post.likes.len(),
        })
    })
}

/// Append a comment to the post. `None` means the post does not exist.
pub fn add_comment(
    store: &Store,
    viewer_id: &str,
    post_id: &str,
    text: &str,
) -> anyhow::Result<Option<Comment>> {
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        author_id: viewer_id.to_string(),
        text: text.to_string(),
        created_at: now_iso(),
    };
    store.update_json(&post_key(post_id), move |doc: &mut Option<Post>| {
        match doc.as_mut() {
            Some(post) => {
                post.comments.push(comment.clone());
                Some(comment)
            }
            None => None,
        }
    })
}

/// Remove one comment. Allowed for the comment's author and the post's
/// author; everyone else gets `NotAllowed`.
pub fn delete_comment(
    store: &Store,
    viewer_id: &str,
    post_id: &str,
    comment_id: &str,
) -> anyhow::Result<CommentDelete> {
    store.update_json(&post_key(post_id), |doc: &mut Option<Post>| {
        let post = match doc.as_mut() {
            Some(post) => post,
            None => return CommentDelete::PostMissing,
        };
        let pos = match post.comments.iter().position(|c| c.id == comment_id) {
            Some(pos) => pos,
            None => return CommentDelete::CommentMissing,
        };
        if post.comments[pos].author_id != viewer_id && post.author_id != viewer_id {
            return CommentDelete::NotAllowed;
        }
        post.comments.remove(pos);
        CommentDelete::Deleted
    })
}

/// Count a view of the post and return the new total. Authenticated repeat
/// views inside the de-duplication window are no-ops; anonymous hits always
/// count and are never logged individually. `None` means the post does not
/// exist.
pub fn track_view(
    store: &Store,
    viewer: Option<&str>,
    post_id: &str,
    now: i64,
) -> anyhow::Result<Option<u64>> {
    store.update_json(&post_key(post_id), |doc: &mut Option<Post>| {
        let post = doc.as_mut()?;
        match viewer {
            Some(viewer_id) => {
                let window = view_dedup_window_secs();
                let seen_recently = post
                    .viewed_by
                    .iter()
                    .any(|v| v.viewer_id == viewer_id && now - v.at < window);
                if !seen_recently {
                    post.viewed_by.push(ViewRecord {
                        viewer_id: viewer_id.to_string(),
                        at: now,
                    });
                    post.view_count += 1;
                }
            }
            None => post.view_count += 1,
        }
        Some(post.view_count)
    })
}

// === HTTP Handlers ===

/// Second path segment of `/posts/{id}/...`.
fn post_id_from_path(path: &str) -> Option<&str> {
    let mut segments = path.trim_start_matches('/').split('/');
    if segments.next() != Some("posts") {
        return None;
    }
    match segments.next() {
        Some(id) if !id.is_empty() => Some(id),
        _ => None,
    }
}

pub fn like_post(req: Request) -> anyhow::Result<Response> {
    let viewer_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let post_id = match post_id_from_path(req.path()) {
        Some(id) => id.to_string(),
        None => return Ok(ApiError::BadRequest("Post ID required".to_string()).into()),
    };

    let store = store();
    match like_toggle(&store, &viewer_id, &post_id)? {
        Some(change) => Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&serde_json::json!({
                "liked": change.liked,
                "like_count": change.like_count,
            }))?)
            .build()),
        None => Ok(ApiError::NotFound("Post not found".to_string()).into()),
    }
}

pub fn comment_on_post(req: Request) -> anyhow::Result<Response> {
    let viewer_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let post_id = match post_id_from_path(req.path()) {
        Some(id) => id.to_string(),
        None => return Ok(ApiError::BadRequest("Post ID required".to_string()).into()),
    };

    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let text = value["text"].as_str().unwrap_or_default();

    if text.trim().is_empty() {
        return Ok(ApiError::BadRequest("Comment text is required".to_string()).into());
    }
    if text.len() > MAX_COMMENT_LENGTH {
        return Ok(ApiError::BadRequest("Comment too long (max 1000 chars)".to_string()).into());
    }
    let sanitized = strip_html(text.trim());

    let store = store();
    match add_comment(&store, &viewer_id, &post_id, &sanitized)? {
        Some(comment) => Ok(Response::builder()
            .status(201)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&comment)?)
            .build()),
        None => Ok(ApiError::NotFound("Post not found".to_string()).into()),
    }
}

pub fn remove_comment(req: Request) -> anyhow::Result<Response> {
    let viewer_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let path = req.path().to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    // posts/{id}/comments/{comment_id}
    if segments.len() != 4
        || segments[0] != "posts"
        || segments[2] != "comments"
        || segments[1].is_empty()
        || segments[3].is_empty()
    {
        return Ok(ApiError::BadRequest("Comment ID required".to_string()).into());
    }
    let post_id = segments[1].to_string();
    let comment_id = segments[3].to_string();

    let store = store();
    match delete_comment(&store, &viewer_id, &post_id, &comment_id)? {
        CommentDelete::Deleted => Ok(Response::builder().status(204).build()),
        CommentDelete::PostMissing => Ok(ApiError::NotFound("Post not found".to_string()).into()),
        CommentDelete::CommentMissing => {
            Ok(ApiError::NotFound("Comment not found".to_string()).into())
        }
        CommentDelete::NotAllowed => Ok(ApiError::Forbidden.into()),
    }
}

/// Works with or without an authenticated caller.
pub fn view_post(req: Request) -> anyhow::Result<Response> {
    let viewer_id = validate_token(&req);

    let post_id = match post_id_from_path(req.path()) {
        Some(id) => id.to_string(),
        None => return Ok(ApiError::BadRequest("Post ID required".to_string()).into()),
    };

    let store = store();
    match track_view(&store, viewer_id.as_deref(), &post_id, now_unix())? {
        Some(view_count) => Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&serde_json::json!({"view_count": view_count}))?)
            .build()),
        None => Ok(ApiError::NotFound("Post not found".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn seed_post(store: &Store, author_id: &str) -> Post {
        let id = Uuid::new_v4().to_string();
        let post = Post {
            id: id.clone(),
            author_id: author_id.to_string(),
            title: "Hello".to_string(),
            description: None,
            content: "body".to_string(),
            images: Vec::new(),
            is_public: true,
            likes: Vec::new(),
            comments: Vec::new(),
            view_count: 0,
            viewed_by: Vec::new(),
            created_at: now_iso(),
            updated_at: None,
        };
        store.set_json(&post_key(&id), &post).unwrap();
        post
    }

    fn reload(store: &Store, id: &str) -> Post {
        store.get_json(&post_key(id)).unwrap().unwrap()
    }

    #[test]
    fn like_toggle_flips_membership() {
        let store = store();
        let post = seed_post(&store, "author");

        let change = like_toggle(&store, "alice", &post.id).unwrap().unwrap();
        assert!(change.liked);
        assert_eq!(change.like_count, 1);

        let change = like_toggle(&store, "alice", &post.id).unwrap().unwrap();
        assert!(!change.liked);
        assert_eq!(change.like_count, 0);
        assert!(reload(&store, &post.id).likes.is_empty());
    }

    #[test]
    fn likes_from_different_accounts_accumulate() {
        let store = store();
        let post = seed_post(&store, "author");

        like_toggle(&store, "alice", &post.id).unwrap().unwrap();
        let change = like_toggle(&store, "bob", &post.id).unwrap().unwrap();
        assert_eq!(change.like_count, 2);
    }

    #[test]
    fn like_toggle_missing_post() {
        let store = store();
        assert!(like_toggle(&store, "alice", "no-such-post").unwrap().is_none());
    }

    #[test]
    fn comment_deletion_authorization() {
        let store = store();
        let post = seed_post(&store, "bob");

        let comment = add_comment(&store, "alice", &post.id, "nice post").unwrap().unwrap();
        assert_eq!(reload(&store, &post.id).comments.len(), 1);

        // A third account may not remove it
        let outcome = delete_comment(&store, "carol", &post.id, &comment.id).unwrap();
        assert!(matches!(outcome, CommentDelete::NotAllowed));
        assert_eq!(reload(&store, &post.id).comments.len(), 1);

        // The comment's author may
        let outcome = delete_comment(&store, "alice", &post.id, &comment.id).unwrap();
        assert!(matches!(outcome, CommentDelete::Deleted));
        assert!(reload(&store, &post.id).comments.is_empty());
    }

    #[test]
    fn post_author_may_remove_any_comment() {
        let store = store();
        let post = seed_post(&store, "bob");

        let comment = add_comment(&store, "alice", &post.id, "spam").unwrap().unwrap();
        let outcome = delete_comment(&store, "bob", &post.id, &comment.id).unwrap();
        assert!(matches!(outcome, CommentDelete::Deleted));
    }

    #[test]
    fn deleting_unknown_comment() {
        let store = store();
        let post = seed_post(&store, "bob");

        let outcome = delete_comment(&store, "bob", &post.id, "no-such-comment").unwrap();
        assert!(matches!(outcome, CommentDelete::CommentMissing));
    }

    #[test]
    fn removing_one_comment_leaves_the_rest() {
        let store = store();
        let post = seed_post(&store, "bob");

        let first = add_comment(&store, "alice", &post.id, "first").unwrap().unwrap();
        add_comment(&store, "alice", &post.id, "second").unwrap().unwrap();

        delete_comment(&store, "alice", &post.id, &first.id).unwrap();
        let post = reload(&store, &post.id);
        assert_eq!(post.comments.len(), 1);
        assert_eq!(post.comments[0].text, "second");
    }

    #[test]
    fn authenticated_views_deduplicate_inside_window() {
        let store = store();
        let post = seed_post(&store, "author");
        let t0 = 1_700_000_000;

        assert_eq!(track_view(&store, Some("alice"), &post.id, t0).unwrap(), Some(1));
        // Repeat inside the window: suppressed
        assert_eq!(track_view(&store, Some("alice"), &post.id, t0 + 10).unwrap(), Some(1));
        // After the window elapses it counts again
        assert_eq!(track_view(&store, Some("alice"), &post.id, t0 + 3601).unwrap(), Some(2));

        let post = reload(&store, &post.id);
        assert_eq!(post.view_count, 2);
        assert_eq!(post.viewed_by.len(), 2);
    }

    #[test]
    fn anonymous_views_always_count() {
        let store = store();
        let post = seed_post(&store, "author");
        let t0 = 1_700_000_000;

        for _ in 0..3 {
            track_view(&store, None, &post.id, t0).unwrap();
        }
        let post = reload(&store, &post.id);
        assert_eq!(post.view_count, 3);
        // Anonymous hits are not logged individually
        assert!(post.viewed_by.is_empty());
    }

    #[test]
    fn mixed_viewers_track_independently() {
        let store = store();
        let post = seed_post(&store, "author");
        let t0 = 1_700_000_000;

        track_view(&store, Some("alice"), &post.id, t0).unwrap();
        track_view(&store, Some("bob"), &post.id, t0 + 5).unwrap();
        track_view(&store, Some("alice"), &post.id, t0 + 9).unwrap();
        track_view(&store, None, &post.id, t0 + 9).unwrap();

        assert_eq!(reload(&store, &post.id).view_count, 3);
    }

    #[test]
    fn view_of_missing_post() {
        let store = store();
        assert!(track_view(&store, None, "no-such-post", 0).unwrap().is_none());
    }
}
