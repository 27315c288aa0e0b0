use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use regex::Regex;
use html_escape::encode_double_quoted_attribute;
use ammonia::Builder;
use std::sync::OnceLock;
use crate::models::models::Post;
use crate::core::db::Store;
use crate::core::helpers::{store, strip_html, now_iso};
use crate::core::errors::ApiError;
use crate::auth::validate_token;
use crate::users::{get_account, build_account_summary};
use crate::config::*;

/// Post shape used in feed listings. Counts are derived from the
/// authoritative collections at response time.
pub fn build_post_json(store: &Store, post: &Post) -> anyhow::Result<serde_json::Value> {
    let author = get_account(store, &post.author_id)?.map(|a| build_account_summary(&a));
    Ok(serde_json::json!({
        "id": post.id,
        "author": author,
        "title": post.title,
        "description": post.description,
        "content": post.content,
        "images": post.images,
        "is_public": post.is_public,
        "like_count": post.likes.len(),
        "comment_count": post.comments.len(),
        "view_count": post.view_count,
        "created_at": post.created_at,
        "updated_at": post.updated_at,
    }))
}

/// Single-post shape: the listing shape plus the expanded comment list.
pub fn build_post_detail_json(store: &Store, post: &Post) -> anyhow::Result<serde_json::Value> {
    let mut json = build_post_json(store, post)?;
    let mut comments = Vec::new();
    for comment in &post.comments {
        let author = get_account(store, &comment.author_id)?.map(|a| build_account_summary(&a));
        comments.push(serde_json::json!({
            "id": comment.id,
            "author": author,
            "text": comment.text,
            "created_at": comment.created_at,
        }));
    }
    json["comments"] = serde_json::Value::Array(comments);
    Ok(json)
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"https?://[^\s]+").expect("Regex should compile")
    })
}

fn filter_post_content(content: &str) -> String {
    // Sanitize HTML to remove dangerous scripts and event handlers
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    // Convert HTTP/HTTPS URLs into clickable links with proper escaping
    url_regex().replace_all(&clean, |caps: &regex::Captures| {
        let url = &caps[0];
        let escaped_url = encode_double_quoted_attribute(url);
        format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
    }).to_string()
}

fn parse_images(value: &serde_json::Value) -> Vec<String> {
    value["images"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub fn create_post(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;

    let title = value["title"].as_str().unwrap_or_default();
    let content = value["content"].as_str().unwrap_or_default();
    let description = value["description"].as_str().unwrap_or_default();

    if title.trim().is_empty() || title.len() > MAX_TITLE_LENGTH {
        return Ok(ApiError::BadRequest("Invalid title".to_string()).into());
    }
    if content.is_empty() || content.len() > MAX_CONTENT_LENGTH {
        return Ok(ApiError::BadRequest("Invalid content".to_string()).into());
    }
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Ok(ApiError::BadRequest("Description too long".to_string()).into());
    }

    let id = Uuid::new_v4().to_string();
    let description = strip_html(description);
    let post = Post {
        id: id.clone(),
        author_id: user_id,
        title: strip_html(title.trim()),
        description: if description.is_empty() { None } else { Some(description) },
        content: filter_post_content(content),
        images: parse_images(&value),
        is_public: value["is_public"].as_bool().unwrap_or(true),
        likes: Vec::new(),
        comments: Vec::new(),
        view_count: 0,
        viewed_by: Vec::new(),
        created_at: now_iso(),
        updated_at: None,
    };

    // Save post object
    store.set_json(&post_key(&id), &post)?;

    // Prepend to the global feed index (newest first)
    let mut feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    feed.insert(0, id.clone());
    store.set_json(FEED_KEY, &feed)?;

    Ok(Response::builder()
        .status(201)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&build_post_json(&store, &post)?)?)
        .build())
}

pub fn get_post(req: Request) -> anyhow::Result<Response> {
    let viewer_id = validate_token(&req);

    let path = req.path().to_string();
    let post_id = path.split('/').last().unwrap_or("");
    if post_id.is_empty() {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();
    if let Some(post) = store.get_json::<Post>(&post_key(post_id))? {
        // Private posts are visible to their author only
        if !post.is_public && viewer_id.as_deref() != Some(post.author_id.as_str()) {
            return Ok(ApiError::NotFound("Post not found".to_string()).into());
        }
        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&build_post_detail_json(&store, &post)?)?)
            .build())
    } else {
        Ok(ApiError::NotFound("Post not found".to_string()).into())
    }
}

pub fn edit_post(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let path = req.path().to_string();
    let post_id = path.split('/').last().unwrap_or("");
    if post_id.is_empty() {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();

    // Check if post exists and belongs to user
    if let Some(mut post) = store.get_json::<Post>(&post_key(post_id))? {
        if post.author_id != user_id {
            return Ok(ApiError::Forbidden.into());
        }

        let value: serde_json::Value = serde_json::from_slice(req.body())?;
        let mut changed = false;

        if let Some(title) = value["title"].as_str() {
            if title.trim().is_empty() || title.len() > MAX_TITLE_LENGTH {
                return Ok(ApiError::BadRequest("Invalid title".to_string()).into());
            }
            let sanitized = strip_html(title.trim());
            if post.title != sanitized {
                post.title = sanitized;
                changed = true;
            }
        }

        if let Some(description) = value["description"].as_str() {
            if description.len() > MAX_DESCRIPTION_LENGTH {
                return Ok(ApiError::BadRequest("Description too long".to_string()).into());
            }
            let sanitized = strip_html(description);
            let next = if sanitized.is_empty() { None } else { Some(sanitized) };
            if post.description != next {
                post.description = next;
                changed = true;
            }
        }

        if let Some(content) = value["content"].as_str() {
            if content.is_empty() || content.len() > MAX_CONTENT_LENGTH {
                return Ok(ApiError::BadRequest("Invalid content".to_string()).into());
            }
            let filtered = filter_post_content(content);
            if post.content != filtered {
                post.content = filtered;
                changed = true;
            }
        }

        if value["images"].is_array() {
            let images = parse_images(&value);
            if post.images != images {
                post.images = images;
                changed = true;
            }
        }

        if let Some(is_public) = value["is_public"].as_bool() {
            if post.is_public != is_public {
                post.is_public = is_public;
                changed = true;
            }
        }

        // Skip the write if nothing changed
        if changed {
            post.updated_at = Some(now_iso());
            store.set_json(&post_key(post_id), &post)?;
        }

        Ok(Response::builder()
            .status(200)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&build_post_json(&store, &post)?)?)
            .build())
    } else {
        Ok(ApiError::NotFound("Post not found".to_string()).into())
    }
}

pub fn delete_post(req: Request) -> anyhow::Result<Response> {
    let user_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let path = req.path().to_string();
    let post_id = path.split('/').last().unwrap_or("");
    if post_id.is_empty() {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();

    // Check if post exists and belongs to user
    if let Some(post) = store.get_json::<Post>(&post_key(post_id))? {
        if post.author_id != user_id {
            return Ok(ApiError::Forbidden.into());
        }

        store.delete(&post_key(post_id))?;

        // Remove from the feed index
        let mut feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
        feed.retain(|id| id != post_id);
        store.set_json(FEED_KEY, &feed)?;

        Ok(Response::builder().status(204).build())
    } else {
        Ok(ApiError::NotFound("Post not found".to_string()).into())
    }
}
