//! Slug helpers shared by pages, articles and events.
//!
//! Page slugs and item url titles share one alphabet: ASCII letters, digits,
//! `_` and `-`. That is exactly what the content routers capture in their
//! detail patterns, so anything outside it could never be dispatched.

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("`{slug}` is not a valid url slug")]
    Invalid { slug: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Whether `candidate` can be used as a page slug or item url title.
pub fn is_url_slug(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-')
}

pub fn ensure_url_slug(candidate: &str) -> Result<(), SlugError> {
    if is_url_slug(candidate) {
        Ok(())
    } else {
        Err(SlugError::Invalid {
            slug: candidate.to_string(),
        })
    }
}

/// Derive a url slug from a human-readable title.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() || !is_url_slug(&candidate) {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Derive a slug that `is_unique` accepts, suffixing `-2`, `-3`, ... on
/// collisions.
pub fn generate_unique_slug<F>(input: &str, mut is_unique: F) -> Result<String, SlugError>
where
    F: FnMut(&str) -> bool,
{
    let base = derive_slug(input)?;

    if is_unique(&base) {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate) {
            return Ok(candidate);
        }
    }

    Err(SlugError::Exhausted { base })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_lowercases_and_hyphenates() {
        assert_eq!(derive_slug("Annual Report 2024").expect("slug"), "annual-report-2024");
        assert_eq!(derive_slug("Café & Bar").expect("slug"), "cafe-bar");
    }

    #[test]
    fn derive_slug_rejects_empty_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
        assert!(matches!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn generate_unique_slug_appends_counter() {
        let mut existing = vec!["events".to_string()];
        let slug = generate_unique_slug("Events", |candidate| {
            if existing.iter().any(|slug| slug == candidate) {
                false
            } else {
                existing.push(candidate.to_string());
                true
            }
        })
        .expect("unique slug");

        assert_eq!(slug, "events-2");
    }

    #[test]
    fn generate_unique_slug_exhausted() {
        assert_eq!(
            generate_unique_slug("News", |_| false),
            Err(SlugError::Exhausted {
                base: "news".to_string()
            })
        );
    }

    #[test]
    fn url_slug_alphabet() {
        assert!(is_url_slug("spring_fair-2024"));
        assert!(!is_url_slug("with space"));
        assert!(!is_url_slug("nested/path"));
        assert!(!is_url_slug(""));
        assert!(ensure_url_slug("ok").is_ok());
    }
}
