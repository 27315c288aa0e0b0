pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_CONTENT_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 1000;
pub const POSTS_PER_PAGE: usize = 20;

pub const FEED_KEY: &str = "feed";
pub const TOKENS_LIST_KEY: &str = "tokens_list";

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email)
}

pub fn post_key(post_id: &str) -> String {
    format!("post:{}", post_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn verify_key(token: &str) -> String {
    format!("verify:{}", token)
}

pub fn token_expiration_hours() -> i64 {
    std::env::var("TESSERA_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}

/// Repeat authenticated views of the same post inside this window do not
/// increment the view counter.
pub fn view_dedup_window_secs() -> i64 {
    std::env::var("TESSERA_VIEW_DEDUP_WINDOW_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(3600)
}
