pub mod auth;
pub mod config;
pub mod core;
pub mod engagement;
pub mod feed;
pub mod models;
pub mod posts;
pub mod social_graph;
pub mod users;

use spin_sdk::http::{Request, Response};
#[cfg(target_arch = "wasm32")]
use spin_sdk::http::IntoResponse;
#[cfg(target_arch = "wasm32")]
use spin_sdk::http_component;

/// Single routing table shared by the Spin component and the native binary.
pub fn route(req: Request) -> anyhow::Result<Response> {
    let path = req.path().to_string();
    let method = req.method().to_string();

    match (method.as_str(), path.as_str()) {
        ("POST", "/users") => users::create_user(req),
        ("POST", "/login") => auth::login_user(req),
        ("POST", "/logout") => auth::logout_user(req),
        ("GET", "/profile") => users::get_profile(req),
        ("PUT", "/profile") => users::update_profile(req),
        ("GET", "/feed/following") => feed::following_feed(req),
        ("GET", "/feed") => feed::public_feed(req),
        ("GET", "/search") => feed::search_posts(req),
        ("POST", "/posts") => posts::create_post(req),
        ("GET", p) if p.starts_with("/verify/") => users::verify_email(p),
        ("POST", p) if p.starts_with("/follow/") => social_graph::handle_follow_toggle(req),
        ("GET", p) if p.starts_with("/followers/") => social_graph::get_followers_list(req),
        ("GET", p) if p.starts_with("/following/") => social_graph::get_following_list(req),
        ("GET", p) if p.starts_with("/users/") && p.len() > 7 => users::get_user_details(p),
        ("GET", p) if p.starts_with("/posts/by/") => feed::user_feed(req),
        ("POST", p) if p.starts_with("/posts/") && p.ends_with("/like") => engagement::like_post(req),
        ("POST", p) if p.starts_with("/posts/") && p.ends_with("/comments") => {
            engagement::comment_on_post(req)
        }
        ("POST", p) if p.starts_with("/posts/") && p.ends_with("/view") => engagement::view_post(req),
        ("DELETE", p) if p.starts_with("/posts/") && p.contains("/comments/") => {
            engagement::remove_comment(req)
        }
        ("GET", p) if p.starts_with("/posts/") => posts::get_post(req),
        ("PUT", p) if p.starts_with("/posts/") => posts::edit_post(req),
        ("DELETE", p) if p.starts_with("/posts/") => posts::delete_post(req),
        _ => Ok(Response::builder().status(404).body("Not found").build()),
    }
}

#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    route(req)
}
