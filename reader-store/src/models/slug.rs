//! URL slugs for articles, categories and tags

const MAX_SLUG_LEN: usize = 80;

/// Lowercase alphanumeric runs joined by `-`.
///
/// Non-ASCII letters and digits are kept (titles are frequently CJK);
/// punctuation, whitespace and symbols become separators.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut last_was_dash = false;
    let mut len = 0;

    // `len` counts emitted chars: lowercasing can expand one char into two
    'chars: for ch in input.chars() {
        if len >= MAX_SLUG_LEN {
            break;
        }
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                if len >= MAX_SLUG_LEN {
                    break 'chars;
                }
                slug.push(lower);
                len += 1;
            }
            last_was_dash = false;
        } else if !slug.is_empty() && !last_was_dash {
            slug.push('-');
            len += 1;
            last_was_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

/// Slug for `input`, or `fallback` when nothing sluggable remains.
pub fn slugify_or(input: &str, fallback: &str) -> String {
    let slug = slugify(input);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Candidate for the `n`th collision (n >= 2).
pub fn with_suffix(base: &str, n: u32) -> String {
    format!("{base}-{n}")
}
