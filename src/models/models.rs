use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub password: String,
    pub verified: bool,
    /// Account ids that follow this account.
    pub followers: Vec<String>,
    /// Account ids this account follows. Mirror of `followers` on the other side.
    pub following: Vec<String>,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub description: Option<String>,
    pub content: String,
    pub images: Vec<String>,
    pub is_public: bool,
    /// Account ids that currently like this post. Set semantics.
    pub likes: Vec<String>,
    pub comments: Vec<Comment>,
    pub view_count: u64,
    /// Log of authenticated views, one entry per counted view.
    pub viewed_by: Vec<ViewRecord>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ViewRecord {
    pub viewer_id: String,
    /// Unix seconds, compared against the de-duplication window.
    pub at: i64,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: String,
}
