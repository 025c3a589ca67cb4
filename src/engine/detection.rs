//! Keyword heuristics over free-text conversation context.

use once_cell::sync::Lazy;
use regex::Regex;

static NEW_FEATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(new feature|implement(ing)?|add(ing)?|create|build(ing)?|develop(ing)?|introduce|support for|feature request)\b",
    )
    .expect("new-feature pattern is valid")
});

/// Whether any of the texts reads like a request for new functionality.
pub fn is_new_feature_request<'a>(texts: impl IntoIterator<Item = &'a str>) -> bool {
    texts.into_iter().any(|t| NEW_FEATURE.is_match(t))
}
