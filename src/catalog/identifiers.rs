use regex::Regex;
use std::sync::LazyLock;

/// A trailing `-digits` or `-digits_digits...` suffix
static NUMERIC_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+(?:_\d+)*$").expect("valid suffix pattern"));

/// Strips a trailing numeric suffix from a catalog identifier
///
/// Suffixes are stripped until none is left, so applying it twice gives the
/// same result as applying it once. The cost is that stacked numbers go
/// together: a number that belongs to the name, as the `4` in
/// `transmission-4-148`, is stripped along with the suffix.
///
/// # Examples
///
/// ```
/// use catalog_harvest::catalog::normalize_identifier;
///
/// assert_eq!(normalize_identifier("engine-engine-assy-148"), "engine-engine-assy");
/// assert_eq!(normalize_identifier("a-t-brake-67980_67981"), "a-t-brake");
/// assert_eq!(normalize_identifier("engine/assy"), "engine/assy");
/// assert_eq!(normalize_identifier("transmission-4-148"), "transmission");
/// ```
pub fn normalize_identifier(id: &str) -> String {
    let mut current = id.to_string();
    loop {
        let stripped = NUMERIC_SUFFIX.replace(&current, "").into_owned();
        if stripped == current || stripped.is_empty() {
            return current;
        }
        current = stripped;
    }
}

/// Derives the base name an image file is grouped under
///
/// The extension and any trailing numeric suffix are removed, so
/// `engine-rocker-cover-12159.png` and `engine-rocker-cover.png` share the
/// base `engine-rocker-cover`.
pub fn image_base_name(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    normalize_identifier(stem)
}

/// Turns a heading into a URL-safe slug
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Dashes become spaces and each word is capitalized: `fuel-system` gives `Fuel System`
pub fn humanize_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Makes an identifier safe to use as a file stem (at most 100 chars)
pub fn safe_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect()
}
