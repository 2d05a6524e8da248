//! # Platform Sniffing
//!
//! Mobile AR viewers only get invoked through user-agent heuristics, there is no capability
//! negotiation to lean on. The patterns live here as constants so they can change without
//! touching the hand-off control flow.
//!
//! Some Android browsers carry iOS-looking substrings, so Android always wins.
use std::sync::LazyLock;

use regex::Regex;

pub const IOS_PATTERN: &str = r"iPhone|iPad|iPod";
pub const ANDROID_PATTERN: &str = r"Android";

static IOS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IOS_PATTERN).expect("IOS_PATTERN is a valid regex"));
static ANDROID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ANDROID_PATTERN).expect("ANDROID_PATTERN is a valid regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    /// Quick Look, opens USDZ assets directly
    Ios,
    /// Scene Viewer, opened through a deep link
    Android,
    Other,
}

pub fn classify(user_agent: &str) -> Platform {
    if ANDROID_RE.is_match(user_agent) {
        Platform::Android
    } else if IOS_RE.is_match(user_agent) {
        Platform::Ios
    } else {
        Platform::Other
    }
}
