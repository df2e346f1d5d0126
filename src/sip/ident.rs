//! Generated Call-IDs, Via branches and tags.

use uuid::Uuid;

/// RFC 3261 branch prefix.
pub const MAGIC_COOKIE: &str = "z9hG4bK";

pub fn new_call_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_branch() -> String {
    format!("{}{}", MAGIC_COOKIE, short_token())
}

pub fn new_tag() -> String {
    short_token()
}

/// Last 12 hex digits of a fresh UUID.
fn short_token() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[simple.len() - 12..].to_string()
}
