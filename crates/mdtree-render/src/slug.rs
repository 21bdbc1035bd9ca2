//! Heading identifier generation.

use std::collections::HashMap;

/// Fallback id for headings with no usable characters.
const EMPTY_SLUG: &str = "section";

/// Turn heading text into an anchor id.
///
/// Lowercases, keeps alphanumerics, `-` and `_`, maps whitespace to `-` and
/// drops everything else, so `"What's New?"` becomes `whats-new`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() {
            slug.push('-');
        }
    }
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// Hands out unique ids within one document.
///
/// Repeats get `-1`, `-2`, ... in the order they are requested, so the same
/// input always yields the same ids.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    seen: HashMap<String, usize>,
}

impl SlugRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an explicit id so generated ones do not collide with it.
    pub fn reserve(&mut self, id: &str) {
        self.seen.entry(id.to_string()).or_insert(0);
    }

    /// Produce a unique id for heading text.
    pub fn unique(&mut self, text: &str) -> String {
        let base = slugify(text);
        let mut candidate = base.clone();
        if let Some(&last) = self.seen.get(&base) {
            let mut n = last;
            loop {
                n += 1;
                candidate = format!("{base}-{n}");
                if !self.seen.contains_key(&candidate) {
                    break;
                }
            }
            self.seen.insert(base, n);
        }
        self.seen.insert(candidate.clone(), 0);
        candidate
    }
}
