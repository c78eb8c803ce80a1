//! File naming for persisted media

use chrono::{DateTime, TimeZone};
use studio_interfaces::MediaLabel;

/// Longest prompt slug embedded in a file name
pub const MAX_SLUG_LEN: usize = 40;

/// Reduce a prompt to lowercase ASCII alphanumerics separated by single dashes
pub fn prompt_slug(prompt: &str) -> String {
    let mut slug = String::with_capacity(prompt.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in prompt.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    let trimmed = slug.trim_end_matches('-');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<type>_<HHMMSS>_<seed>_<slug>`, without extension
pub fn media_file_stem<Tz: TimeZone>(label: &MediaLabel, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}_{}_{}",
        label.generation_type,
        at.format("%H%M%S"),
        label.seed,
        prompt_slug(&label.prompt)
    )
}
