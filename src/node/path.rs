//! Id derivation helpers
//!
//! Every driver goes through these so ids stay comparable across backends.

use crate::error::StorageError;
use unicode_normalization::UnicodeNormalization;

/// Separator between path segments of a node id.
pub const SEPARATOR: char = '/';

/// `parent/name`, or just `name` for root-level nodes.
pub fn join(parent_id: Option<&str>, name: &str) -> String {
    match parent_id {
        Some(parent) if !parent.is_empty() => format!("{}{}{}", parent, SEPARATOR, name),
        _ => name.to_string(),
    }
}

/// Split an id into its parent id (if any) and leaf name.
pub fn split_parent(id: &str) -> (Option<&str>, &str) {
    match id.rfind(SEPARATOR) {
        Some(pos) => (Some(&id[..pos]), &id[pos + 1..]),
        None => (None, id),
    }
}

/// Leaf name of an id.
pub fn leaf_name(id: &str) -> &str {
    split_parent(id).1
}

/// True when `id` lies strictly below `ancestor_id`.
pub fn is_descendant(id: &str, ancestor_id: &str) -> bool {
    id.len() > ancestor_id.len()
        && id.starts_with(ancestor_id)
        && id[ancestor_id.len()..].starts_with(SEPARATOR)
}

/// Replace the `old_prefix` of `id` (itself or an ancestor) with `new_prefix`.
pub fn rebase(id: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if id == old_prefix {
        Some(new_prefix.to_string())
    } else if is_descendant(id, old_prefix) {
        Some(format!("{}{}", new_prefix, &id[old_prefix.len()..]))
    } else {
        None
    }
}

/// Segments of an id, outermost first.
pub fn segments(id: &str) -> impl Iterator<Item = &str> {
    id.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Number of segments in an id (root-level nodes have depth 1).
pub fn depth(id: &str) -> usize {
    segments(id).count()
}

/// NFC-normalize a display name so the same visible name maps to one id.
pub fn normalize_name(name: &str) -> String {
    name.nfc().collect()
}

/// Validate a single node name.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidName("name cannot be empty".to_string()));
    }
    if name.contains(SEPARATOR) || name.contains('\\') {
        return Err(StorageError::InvalidName(format!(
            "{} contains a path separator",
            name
        )));
    }
    if name.starts_with('.') {
        return Err(StorageError::InvalidName(format!(
            "{} starts with a dot",
            name
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(StorageError::InvalidName(format!(
            "{:?} contains control characters",
            name
        )));
    }
    Ok(())
}

/// Validate every segment of an id.
pub fn validate_id(id: &str) -> Result<(), StorageError> {
    if id.is_empty() {
        return Err(StorageError::InvalidName("id cannot be empty".to_string()));
    }
    for segment in id.split(SEPARATOR) {
        validate_name(segment)?;
    }
    Ok(())
}

/// First free name among `desired`, `desired 1`, `desired 2`, ...
pub fn unique_name<'a, I>(siblings: I, desired: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: std::collections::HashSet<&str> = siblings.into_iter().collect();
    if !taken.contains(desired) {
        return desired.to_string();
    }
    let mut counter = 1usize;
    loop {
        let candidate = format!("{} {}", desired, counter);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        counter += 1;
    }
}
