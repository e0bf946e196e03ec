//! Case-insensitive substring search over anchors and items.
//!
//! Case folding is SQLite `LIKE` folding, so it covers ASCII letters only.
//!
//! # Invariants
//! - `%`, `_` and `\` in user text match literally.
//! - Ordering: every anchor hit (by name) precedes every item hit (newest
//!   first). There is no relevance scoring.

use crate::model::{AnchorId, CallerId, ItemId, ItemStatus, ItemType};
use crate::repo::anchor_repo::{parse_anchor_row, ANCHOR_COLUMNS};
use crate::repo::item_repo::{parse_item_row, ITEM_COLUMNS};
use crate::repo::{query_scoped, RepoResult};
use crate::scope::{ResourceKind, ScopeResolver, UnscopedPolicy};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;

/// Per-kind hit cap used by [`SearchQuery::new`].
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 100;
/// Item bodies are cut to this many characters in hits.
pub const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    /// Maximum hits per resource kind, clamped to `[1, 100]`.
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Single search hit returned by [`search_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchHit {
    Anchor {
        id: AnchorId,
        anchor_key: String,
        name: String,
        description: Option<String>,
    },
    Item {
        id: ItemId,
        title: String,
        #[serde(rename = "type")]
        item_type: ItemType,
        status: ItemStatus,
        snippet: Option<String>,
    },
}

/// Searches anchor names/descriptions and item titles/bodies.
///
/// Returns an empty list for blank queries.
pub fn search_all(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    query: &SearchQuery,
) -> RepoResult<Vec<SearchHit>> {
    let text = query.text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = Value::Text(format!("%{}%", escape_like(text)));
    let limit = Value::Integer(i64::from(query.limit.clamp(1, MAX_SEARCH_LIMIT)));
    let resolver = ScopeResolver::new(conn, policy);

    let anchors = query_scoped(
        conn,
        resolver.filter(caller, ResourceKind::Anchor),
        ANCHOR_COLUMNS,
        "AND (a.name LIKE ? ESCAPE '\\' OR a.description LIKE ? ESCAPE '\\')
         ORDER BY a.name ASC, a.anchor_key ASC LIMIT ?",
        vec![pattern.clone(), pattern.clone(), limit.clone()],
        parse_anchor_row,
    )?;
    let items = query_scoped(
        conn,
        resolver.filter(caller, ResourceKind::Item),
        ITEM_COLUMNS,
        "AND (i.title LIKE ? ESCAPE '\\' OR i.body LIKE ? ESCAPE '\\')
         ORDER BY i.created_at DESC, i.id ASC LIMIT ?",
        vec![pattern.clone(), pattern, limit],
        parse_item_row,
    )?;

    let mut hits = Vec::with_capacity(anchors.len() + items.len());
    hits.extend(anchors.into_iter().map(|anchor| SearchHit::Anchor {
        id: anchor.id,
        anchor_key: anchor.anchor_key,
        name: anchor.name,
        description: anchor.description,
    }));
    hits.extend(items.into_iter().map(|item| SearchHit::Item {
        id: item.id,
        title: item.title,
        item_type: item.kind,
        status: item.status,
        snippet: item.body.as_deref().map(snippet),
    }));
    Ok(hits)
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::{escape_like, snippet, SNIPPET_MAX_CHARS};

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn snippet_counts_characters_not_bytes() {
        let body = "é".repeat(SNIPPET_MAX_CHARS + 10);
        assert_eq!(snippet(&body).chars().count(), SNIPPET_MAX_CHARS);
    }
}
