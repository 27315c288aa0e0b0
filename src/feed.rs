use spin_sdk::http::{Request, Response};
use crate::models::models::{Account, Post};
use crate::core::db::Store;
use crate::core::helpers::store;
use crate::core::errors::ApiError;
use crate::core::query_params::{parse_query_params, get_page, get_string};
use crate::auth::validate_token;
use crate::users::find_account_by_handle;
use crate::posts::build_post_json;
use crate::config::*;

/// Resolve the feed index to post documents, skipping dangling ids.
fn load_feed_posts(store: &Store) -> anyhow::Result<Vec<Post>> {
    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    let mut posts = Vec::new();
    for id in feed.iter() {
        if let Some(post) = store.get_json::<Post>(&post_key(id))? {
            posts.push(post);
        }
    }
    Ok(posts)
}

fn sort_newest_first(posts: &mut [Post]) {
    // RFC3339 UTC timestamps order lexicographically
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Global feed: every public post, newest first.
pub fn public_posts(store: &Store) -> anyhow::Result<Vec<Post>> {
    let mut posts = load_feed_posts(store)?;
    posts.retain(|p| p.is_public);
    sort_newest_first(&mut posts);
    Ok(posts)
}

/// Personalized feed: public posts whose author the viewer follows, newest
/// first. An empty following set yields an empty feed.
pub fn following_posts(store: &Store, viewer: &Account) -> anyhow::Result<Vec<Post>> {
    let mut posts = load_feed_posts(store)?;
    posts.retain(|p| p.is_public && viewer.following.contains(&p.author_id));
    sort_newest_first(&mut posts);
    Ok(posts)
}

/// Per-author feed. Private posts are included only for the author's own
/// view of their listing.
pub fn author_posts(store: &Store, author_id: &str, include_private: bool) -> anyhow::Result<Vec<Post>> {
    let mut posts = load_feed_posts(store)?;
    posts.retain(|p| p.author_id == author_id && (include_private || p.is_public));
    sort_newest_first(&mut posts);
    Ok(posts)
}

/// Naive substring scan over public posts. Not a search engine.
pub fn search_public(store: &Store, query: &str) -> anyhow::Result<Vec<Post>> {
    let needle = query.to_lowercase();
    let mut posts = public_posts(store)?;
    posts.retain(|p| {
        p.title.to_lowercase().contains(&needle)
            || p.content.to_lowercase().contains(&needle)
            || p.description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false)
    });
    Ok(posts)
}

// === HTTP Handlers ===

fn respond_page(store: &Store, posts: Vec<Post>, page: usize) -> anyhow::Result<Response> {
    let start_idx = (page - 1) * POSTS_PER_PAGE;
    let mut body = Vec::new();
    for post in posts.into_iter().skip(start_idx).take(POSTS_PER_PAGE) {
        body.push(build_post_json(store, &post)?);
    }
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&body)?)
        .build())
}

pub fn public_feed(req: Request) -> anyhow::Result<Response> {
    let params = parse_query_params(req.uri());
    let page = get_page(&params);

    let store = store();
    let posts = public_posts(&store)?;
    respond_page(&store, posts, page)
}

pub fn following_feed(req: Request) -> anyhow::Result<Response> {
    let viewer_id = match validate_token(&req) {
        Some(uid) => uid,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let params = parse_query_params(req.uri());
    let page = get_page(&params);

    let store = store();
    let viewer = match crate::users::get_account(&store, &viewer_id)? {
        Some(account) => account,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    let posts = following_posts(&store, &viewer)?;
    respond_page(&store, posts, page)
}

pub fn user_feed(req: Request) -> anyhow::Result<Response> {
    let viewer_id = validate_token(&req);

    let path = req.path().to_string();
    let handle = path.trim_start_matches("/posts/by/");
    if handle.is_empty() {
        return Ok(ApiError::BadRequest("Username required".to_string()).into());
    }

    let params = parse_query_params(req.uri());
    let page = get_page(&params);

    let store = store();
    let target = match find_account_by_handle(&store, handle)? {
        Some(account) => account,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };

    let include_private = viewer_id.as_deref() == Some(target.id.as_str());
    let posts = author_posts(&store, &target.id, include_private)?;
    respond_page(&store, posts, page)
}

pub fn search_posts(req: Request) -> anyhow::Result<Response> {
    let params = parse_query_params(req.uri());
    let query = get_string(&params, "q").unwrap_or_default();
    if query.trim().is_empty() {
        return Ok(ApiError::BadRequest("Search query required".to_string()).into());
    }
    let page = get_page(&params);

    let store = store();
    let posts = search_public(&store, query.trim())?;
    respond_page(&store, posts, page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::helpers::now_iso;
    use crate::social_graph::follow_toggle;
    use std::sync::Mutex;
    use uuid::Uuid;

    // Feed tests share the global feed index; serialize them
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn fresh_store() -> Store {
        let store = store();
        store.delete(FEED_KEY).unwrap();
        store
    }

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

    fn seed_post(store: &Store, author_id: &str, title: &str, is_public: bool, created_at: &str) -> Post {
        let id = Uuid::new_v4().to_string();
        let post = Post {
            id: id.clone(),
            author_id: author_id.to_string(),
            title: title.to_string(),
            description: None,
            content: format!("{} body", title),
            images: Vec::new(),
            is_public,
            likes: Vec::new(),
            comments: Vec::new(),
            view_count: 0,
            viewed_by: Vec::new(),
            created_at: created_at.to_string(),
            updated_at: None,
        };
        store.set_json(&post_key(&id), &post).unwrap();
        let mut feed: Vec<String> = store.get_json(FEED_KEY).unwrap().unwrap_or_default();
        feed.insert(0, id);
        store.set_json(FEED_KEY, &feed).unwrap();
        post
    }

    fn titles(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn public_feed_filters_private_and_sorts_newest_first() {
        let _lock = TEST_LOCK.lock().unwrap();
        let store = fresh_store();
        let alice = seed_account(&store);

        seed_post(&store, &alice.id, "oldest", true, "2024-01-01T00:00:00+00:00");
        seed_post(&store, &alice.id, "hidden", false, "2024-01-02T00:00:00+00:00");
        seed_post(&store, &alice.id, "newest", true, "2024-01-03T00:00:00+00:00");

        let posts = public_posts(&store).unwrap();
        assert_eq!(titles(&posts), vec!["newest", "oldest"]);
    }

    #[test]
    fn following_feed_restricted_to_followed_public_posts() {
        let _lock = TEST_LOCK.lock().unwrap();
        let store = fresh_store();
        let alice = seed_account(&store);
        let bob = seed_account(&store);
        let carol = seed_account(&store);

        follow_toggle(&store, &alice.id, &bob.id).unwrap();

        seed_post(&store, &bob.id, "bob public", true, "2024-01-01T00:00:00+00:00");
        seed_post(&store, &bob.id, "bob private", false, "2024-01-02T00:00:00+00:00");
        seed_post(&store, &carol.id, "carol public", true, "2024-01-03T00:00:00+00:00");

        let alice = crate::users::get_account(&store, &alice.id).unwrap().unwrap();
        let posts = following_posts(&store, &alice).unwrap();
        assert_eq!(titles(&posts), vec!["bob public"]);
    }

    #[test]
    fn empty_following_set_yields_empty_feed() {
        let _lock = TEST_LOCK.lock().unwrap();
        let store = fresh_store();
        let alice = seed_account(&store);
        let bob = seed_account(&store);

        seed_post(&store, &bob.id, "bob public", true, "2024-01-01T00:00:00+00:00");

        let posts = following_posts(&store, &alice).unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn author_feed_hides_private_posts_from_others() {
        let _lock = TEST_LOCK.lock().unwrap();
        let store = fresh_store();
        let bob = seed_account(&store);

        seed_post(&store, &bob.id, "public", true, "2024-01-01T00:00:00+00:00");
        seed_post(&store, &bob.id, "private", false, "2024-01-02T00:00:00+00:00");

        let as_stranger = author_posts(&store, &bob.id, false).unwrap();
        assert_eq!(titles(&as_stranger), vec!["public"]);

        let as_owner = author_posts(&store, &bob.id, true).unwrap();
        assert_eq!(titles(&as_owner), vec!["private", "public"]);
    }

    #[test]
    fn search_is_case_insensitive_and_public_only() {
        let _lock = TEST_LOCK.lock().unwrap();
        let store = fresh_store();
        let alice = seed_account(&store);

        seed_post(&store, &alice.id, "Rust tips", true, "2024-01-01T00:00:00+00:00");
        seed_post(&store, &alice.id, "rust secrets", false, "2024-01-02T00:00:00+00:00");
        seed_post(&store, &alice.id, "Gardening", true, "2024-01-03T00:00:00+00:00");

        let posts = search_public(&store, "RUST").unwrap();
        assert_eq!(titles(&posts), vec!["Rust tips"]);
    }
}
