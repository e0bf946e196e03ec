//! Ownership closure resolution and SQL predicate construction.

use super::UnscopedPolicy;
use crate::model::{
    normalize_anchor_key, AnchorId, BreadcrumbId, CallerId, CaptureId, ItemId, RouteSetId,
    ScanLogId, ZoneId,
};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Resource kinds with a fixed ownership join path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Zone,
    Anchor,
    Item,
    Capture,
    Breadcrumb,
    ScanLog,
    RouteSet,
}

/// Join path from a resource table up to `zones.owner_id`.
struct ClosurePath {
    joins: &'static str,
    /// Expression yielding the effective owner, `NULL` when unscoped.
    owner: &'static str,
    /// Column consulted by [`UnscopedPolicy::Creator`]. `None` for roots.
    creator: Option<&'static str>,
    /// Per-row owner that must also match (presence sessions).
    session_owner: Option<&'static str>,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::Anchor => "anchor",
            Self::Item => "item",
            Self::Capture => "capture",
            Self::Breadcrumb => "breadcrumb",
            Self::ScanLog => "scan_log",
            Self::RouteSet => "routeset",
        }
    }

    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Zone => "zones",
            Self::Anchor => "anchors",
            Self::Item => "items",
            Self::Capture => "captures",
            Self::Breadcrumb => "breadcrumbs",
            Self::ScanLog => "scan_logs",
            Self::RouteSet => "routesets",
        }
    }

    /// Alias of the main table inside scoped queries.
    pub(crate) fn alias(self) -> &'static str {
        match self {
            Self::Zone => "z",
            Self::Anchor => "a",
            Self::Item => "i",
            Self::Capture => "c",
            Self::Breadcrumb => "b",
            Self::ScanLog => "s",
            Self::RouteSet => "r",
        }
    }

    fn closure(self) -> ClosurePath {
        match self {
            Self::Zone => ClosurePath {
                joins: "",
                owner: "z.owner_id",
                creator: None,
                session_owner: None,
            },
            Self::Anchor => ClosurePath {
                joins: "LEFT JOIN zones az ON az.id = a.zone_id",
                owner: "az.owner_id",
                creator: Some("a.created_by"),
                session_owner: None,
            },
            Self::Item => ClosurePath {
                joins: "LEFT JOIN zones iz ON iz.id = i.zone_id \
                        LEFT JOIN anchors ia ON ia.id = i.anchor_id \
                        LEFT JOIN zones iaz ON iaz.id = ia.zone_id",
                owner: "COALESCE(iz.owner_id, iaz.owner_id)",
                creator: Some("i.created_by"),
                session_owner: None,
            },
            Self::Capture => ClosurePath {
                joins: "LEFT JOIN zones cz ON cz.id = c.zone_id \
                        LEFT JOIN anchors ca ON ca.id = c.anchor_id \
                        LEFT JOIN zones caz ON caz.id = ca.zone_id",
                owner: "COALESCE(cz.owner_id, caz.owner_id)",
                creator: Some("c.created_by"),
                session_owner: None,
            },
            Self::Breadcrumb => ClosurePath {
                joins: "INNER JOIN anchors ba ON ba.id = b.anchor_id \
                        LEFT JOIN zones baz ON baz.id = ba.zone_id",
                owner: "baz.owner_id",
                creator: Some("ba.created_by"),
                session_owner: Some("b.owner_id"),
            },
            Self::ScanLog => ClosurePath {
                joins: "INNER JOIN anchors sa ON sa.id = s.anchor_id \
                        LEFT JOIN zones saz ON saz.id = sa.zone_id",
                owner: "saz.owner_id",
                creator: Some("sa.created_by"),
                session_owner: None,
            },
            // Owned directly, like a zone; stops are checked per anchor.
            Self::RouteSet => ClosurePath {
                joins: "",
                owner: "r.owner_id",
                creator: None,
                session_owner: None,
            },
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer to one resource, by id or (anchors only) by external key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Zone(ZoneId),
    Anchor(AnchorId),
    /// Raw anchor key in any casing.
    AnchorKey(String),
    Item(ItemId),
    Capture(CaptureId),
    Breadcrumb(BreadcrumbId),
    ScanLog(ScanLogId),
    RouteSet(RouteSetId),
}

impl ResourceRef {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Zone(_) => ResourceKind::Zone,
            Self::Anchor(_) | Self::AnchorKey(_) => ResourceKind::Anchor,
            Self::Item(_) => ResourceKind::Item,
            Self::Capture(_) => ResourceKind::Capture,
            Self::Breadcrumb(_) => ResourceKind::Breadcrumb,
            Self::ScanLog(_) => ResourceKind::ScanLog,
            Self::RouteSet(_) => ResourceKind::RouteSet,
        }
    }

    /// Identifier as reported in `NotFound` errors.
    pub fn display_id(&self) -> String {
        match self {
            Self::AnchorKey(key) => normalize_anchor_key(key).unwrap_or_else(|_| key.clone()),
            Self::Zone(id)
            | Self::Anchor(id)
            | Self::Item(id)
            | Self::Capture(id)
            | Self::Breadcrumb(id)
            | Self::ScanLog(id)
            | Self::RouteSet(id) => id.to_string(),
        }
    }

    /// Lookup column and bound value. `None` when the key can never match.
    fn lookup(&self) -> Option<(&'static str, Value)> {
        let by_id = |id: &Uuid| Some(("id", Value::Text(id.to_string())));
        match self {
            Self::AnchorKey(key) => normalize_anchor_key(key)
                .ok()
                .map(|normalized| ("anchor_key", Value::Text(normalized))),
            Self::Zone(id)
            | Self::Anchor(id)
            | Self::Item(id)
            | Self::Capture(id)
            | Self::Breadcrumb(id)
            | Self::ScanLog(id)
            | Self::RouteSet(id) => by_id(id),
        }
    }
}

/// Outcome of a point authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

/// Zone/anchor references carried by a create or re-parent write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteRefs {
    pub zone_id: Option<ZoneId>,
    pub anchor_id: Option<AnchorId>,
}

impl WriteRefs {
    pub fn new(zone_id: Option<ZoneId>, anchor_id: Option<AnchorId>) -> Self {
        Self { zone_id, anchor_id }
    }

    pub fn is_empty(&self) -> bool {
        self.zone_id.is_none() && self.anchor_id.is_none()
    }
}

/// Composable visibility predicate for one resource kind.
///
/// Rendered as `FROM <table> <alias> <joins> WHERE <clause>`; callers append
/// extra `AND` conditions and their own binds after [`ScopeFilter::binds`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeFilter {
    kind: ResourceKind,
    joins: &'static str,
    clause: String,
    binds: Vec<Value>,
}

impl ScopeFilter {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn alias(&self) -> &'static str {
        self.kind.alias()
    }

    /// Boolean SQL expression; placeholders are positional `?`.
    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn binds(&self) -> &[Value] {
        &self.binds
    }

    pub fn from_where(&self) -> String {
        format!(
            "FROM {} {} {} WHERE {}",
            self.kind.table(),
            self.kind.alias(),
            self.joins,
            self.clause
        )
    }

    pub fn into_binds(self) -> Vec<Value> {
        self.binds
    }
}

/// Evaluates ownership closures against the entity store.
///
/// Holds no state beyond the connection and policy, so every decision reads
/// the current rows.
#[derive(Clone, Copy)]
pub struct ScopeResolver<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> ScopeResolver<'conn> {
    pub fn new(conn: &'conn Connection, policy: UnscopedPolicy) -> Self {
        Self { conn, policy }
    }

    pub fn policy(&self) -> UnscopedPolicy {
        self.policy
    }

    /// Builds the list predicate for `kind` as seen by `caller`.
    pub fn filter(&self, caller: &CallerId, kind: ResourceKind) -> ScopeFilter {
        build_filter(self.policy, caller, kind)
    }

    pub fn authorize(&self, caller: &CallerId, resource: &ResourceRef) -> RepoResult<Access> {
        let Some((column, key)) = resource.lookup() else {
            return Ok(Access::Denied);
        };
        let kind = resource.kind();
        let filter = self.filter(caller, kind);
        let sql = format!(
            "SELECT EXISTS(SELECT 1 {} AND {}.{column} = ?);",
            filter.from_where(),
            kind.alias()
        );
        let mut binds = filter.into_binds();
        binds.push(key);

        let visible: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(if visible == 1 {
            Access::Allowed
        } else {
            Access::Denied
        })
    }

    /// Like [`ScopeResolver::authorize`], rendering a denial as `NotFound`.
    pub fn require(&self, caller: &CallerId, resource: &ResourceRef) -> RepoResult<()> {
        match self.authorize(caller, resource)? {
            Access::Allowed => Ok(()),
            Access::Denied => Err(RepoError::NotFound {
                kind: resource.kind(),
                id: resource.display_id(),
            }),
        }
    }

    /// Checks every reference a write would persist.
    ///
    /// The first unresolvable or foreign reference fails the write with
    /// `NotFound` naming that reference.
    pub fn authorize_write(&self, caller: &CallerId, refs: &WriteRefs) -> RepoResult<()> {
        if let Some(zone_id) = refs.zone_id {
            self.require(caller, &ResourceRef::Zone(zone_id))?;
        }
        if let Some(anchor_id) = refs.anchor_id {
            self.require(caller, &ResourceRef::Anchor(anchor_id))?;
        }
        Ok(())
    }

    /// Resolves a raw anchor key to a visible anchor id.
    ///
    /// Malformed keys fail validation; absent or foreign anchors are
    /// `NotFound` keyed by the normalized key.
    pub fn resolve_anchor_key(&self, caller: &CallerId, raw_key: &str) -> RepoResult<AnchorId> {
        let key = normalize_anchor_key(raw_key)?;
        let filter = self.filter(caller, ResourceKind::Anchor);
        let sql = format!("SELECT a.id {} AND a.anchor_key = ?;", filter.from_where());
        let mut binds = filter.into_binds();
        binds.push(Value::Text(key.clone()));

        let found: Option<String> = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))
            .optional()?;
        match found {
            Some(id) => Uuid::parse_str(&id).map_err(|_| {
                RepoError::InvalidData(format!("invalid uuid value `{id}` in anchors.id"))
            }),
            None => Err(RepoError::NotFound {
                kind: ResourceKind::Anchor,
                id: key,
            }),
        }
    }
}

fn build_filter(policy: UnscopedPolicy, caller: &CallerId, kind: ResourceKind) -> ScopeFilter {
    let path = kind.closure();
    let caller_value = || Value::Text(caller.as_str().to_string());
    let mut clause = String::new();
    let mut binds = Vec::new();

    if let Some(column) = path.session_owner {
        clause.push_str(&format!("{column} = ? AND "));
        binds.push(caller_value());
    }

    clause.push_str(&format!("({} = ?", path.owner));
    binds.push(caller_value());
    if let Some(creator) = path.creator {
        match policy {
            UnscopedPolicy::Hidden => {}
            UnscopedPolicy::Creator => {
                clause.push_str(&format!(" OR ({} IS NULL AND {creator} = ?)", path.owner));
                binds.push(caller_value());
            }
            UnscopedPolicy::Shared => {
                clause.push_str(&format!(" OR {} IS NULL", path.owner));
            }
        }
    }
    clause.push(')');

    ScopeFilter {
        kind,
        joins: path.joins,
        clause,
        binds,
    }
}

#[cfg(test)]
mod tests {
    use super::{build_filter, ResourceKind, ResourceRef};
    use crate::model::CallerId;
    use crate::scope::UnscopedPolicy;

    fn caller() -> CallerId {
        CallerId::new("u1").unwrap()
    }

    #[test]
    fn bind_count_matches_placeholders() {
        for policy in [
            UnscopedPolicy::Hidden,
            UnscopedPolicy::Creator,
            UnscopedPolicy::Shared,
        ] {
            for kind in [
                ResourceKind::Zone,
                ResourceKind::Anchor,
                ResourceKind::Item,
                ResourceKind::Capture,
                ResourceKind::Breadcrumb,
                ResourceKind::ScanLog,
                ResourceKind::RouteSet,
            ] {
                let filter = build_filter(policy, &caller(), kind);
                let placeholders = filter.clause().matches('?').count();
                assert_eq!(placeholders, filter.binds().len(), "{policy} {kind}");
            }
        }
    }

    #[test]
    fn zones_ignore_unscoped_policy() {
        let hidden = build_filter(UnscopedPolicy::Hidden, &caller(), ResourceKind::Zone);
        let shared = build_filter(UnscopedPolicy::Shared, &caller(), ResourceKind::Zone);
        assert_eq!(hidden, shared);
    }

    #[test]
    fn routesets_are_owned_directly() {
        let filter = build_filter(UnscopedPolicy::Shared, &caller(), ResourceKind::RouteSet);
        assert_eq!(filter.clause(), "(r.owner_id = ?)");
        assert_eq!(filter.binds().len(), 1);
    }

    #[test]
    fn hidden_policy_has_no_unscoped_branch() {
        let filter = build_filter(UnscopedPolicy::Hidden, &caller(), ResourceKind::Item);
        assert!(!filter.clause().contains("IS NULL"));
    }

    #[test]
    fn anchor_key_ref_reports_normalized_key() {
        let key = ResourceRef::AnchorKey(" hq-desk-01 ".to_string());
        assert_eq!(key.kind(), ResourceKind::Anchor);
        assert_eq!(key.display_id(), "HQ-DESK-01");
    }
}
