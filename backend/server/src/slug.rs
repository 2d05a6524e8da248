//! # Slugs
//!
//! Post slugs look like `my-chair-ab12cd34`: the title cleaned up and capped at 50 characters,
//! then a random 8 character suffix. The suffix is what makes collisions unlikely, the store
//! still gets asked before a slug is handed out.
use std::sync::LazyLock;

use rand::{Rng, distr::Alphanumeric};
use regex::Regex;

use crate::store::{PostStore, StoreError};

pub const MAX_BASE_LEN: usize = 50;
pub const SHORT_ID_LEN: usize = 8;
pub const MAX_ATTEMPTS: usize = 5;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9 -]").expect("valid slug filter"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid dash pattern"));

pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let s = DISALLOWED.replace_all(&lowered, "");
    let s = WHITESPACE.replace_all(s.trim(), "-");
    let s = DASHES.replace_all(&s, "-");

    // only ascii survives the filter, so byte truncation is safe
    let mut slug = s.trim_matches('-').to_string();
    slug.truncate(MAX_BASE_LEN);

    slug.trim_end_matches('-').to_string()
}

pub fn tag_slug(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let s = DISALLOWED.replace_all(&lowered, "");

    WHITESPACE.replace_all(&s, "-").into_owned()
}

pub fn short_id(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `None` once every attempt collided.
pub async fn unique_slug(store: &dyn PostStore, title: &str) -> Result<Option<String>, StoreError> {
    let base = slugify(title);

    for _ in 0..MAX_ATTEMPTS {
        let candidate = if base.is_empty() {
            short_id(SHORT_ID_LEN)
        } else {
            format!("{base}-{}", short_id(SHORT_ID_LEN))
        };

        if !store.slug_taken(&candidate).await? {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}
