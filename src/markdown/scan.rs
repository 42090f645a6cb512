//! Image reference discovery.

use std::sync::LazyLock;

use regex::Regex;

/// `![alt](target)`, non-greedy on both parts.
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\((.*?)\)").expect("image pattern is valid"));

/// Collect the targets of all Markdown images in `text`.
///
/// Targets are returned in occurrence order and are not deduplicated: a path
/// referenced twice appears twice. No check is made that the target exists.
///
/// # Examples
///
/// ```
/// use mdepub::markdown::scan_images;
///
/// let text = "![a](/book/img/a.png) and ![b](img/b.svg)";
/// assert_eq!(scan_images(text), vec!["/book/img/a.png", "img/b.svg"]);
/// ```
pub fn scan_images(text: &str) -> Vec<String> {
    IMAGE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
