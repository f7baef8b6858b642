//! Entity registry records — the identity a user-visible entity keeps
//! across restarts.

use serde::{Deserialize, Serialize};

use crate::id::{EntityId, EntryId};
use crate::time::Timestamp;

/// One registered entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub id: EntityId,
    /// User-visible id, `<domain>.<object id>`. Automations and history
    /// bind to this, so it never changes once assigned.
    pub entity_id: String,
    pub platform: String,
    pub domain: String,
    pub unique_id: String,
    pub original_name: Option<String>,
    pub config_entry_id: Option<EntryId>,
    pub created_at: Timestamp,
}

/// Turn a display name into an object id: lowercase ASCII alphanumerics
/// separated by single underscores.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

/// Pick the first free entity id for `domain` and `name`, appending `_2`,
/// `_3`, … when the plain slug is taken.
#[must_use]
pub fn generate_entity_id(
    domain: &str,
    name: Option<&str>,
    unique_id: &str,
    is_taken: impl Fn(&str) -> bool,
) -> String {
    let base = format!("{domain}.{}", slugify(name.unwrap_or(unique_id)));
    if !is_taken(&base) {
        return base;
    }
    (2u32..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or(base)
}
