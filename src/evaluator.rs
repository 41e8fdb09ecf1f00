//! Pure permission checks over a resolved [`KeyInfo`].
//!
//! Every function accepts `Option<&KeyInfo>`; `None` is evaluated as an
//! identity with no permission rows and is therefore denied everything.
use std::collections::BTreeSet;

use crate::actions::{Action, ParsedRequest};
use crate::permissions::{KeyInfo, Permission};

/// Which check rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("no permissions")]
    NoPermissions,
    #[error("zone {0} is not permitted")]
    ZoneNotPermitted(i64),
    #[error("record type '{0}' is not permitted")]
    RecordTypeNotPermitted(&'static str),
    #[error("action '{0}' is not permitted")]
    ActionNotPermitted(Action),
    #[error("action '{0}' requires an admin token")]
    AdminRequired(Action),
}

fn rows(key: Option<&KeyInfo>) -> &[Permission] {
    match key {
        Some(k) => &k.permissions,
        None => &[],
    }
}

/// Rows whose zone scope covers `zone_id`.
fn matching_rows(key: Option<&KeyInfo>, zone_id: i64) -> impl Iterator<Item = &Permission> {
    rows(key).iter().filter(move |p| p.scope().covers(zone_id))
}

pub fn has_all_zones_permission(key: Option<&KeyInfo>) -> bool {
    rows(key).iter().any(Permission::is_wildcard_zone)
}

/// `None` means every zone; otherwise the de-duplicated scoped set.
pub fn get_permitted_zone_ids(key: Option<&KeyInfo>) -> Option<Vec<i64>> {
    if has_all_zones_permission(key) {
        return None;
    }
    let ids: BTreeSet<i64> = rows(key).iter().map(|p| p.zone_id).collect();
    Some(ids.into_iter().collect())
}

pub fn is_record_type_permitted(key: Option<&KeyInfo>, zone_id: i64, record_type: &str) -> bool {
    matching_rows(key, zone_id).any(|p| p.allows_record_type(record_type))
}

/// Union of the record types granted by `group`; `None` if any row is unrestricted.
fn merged_record_types<'a>(group: impl Iterator<Item = &'a Permission>) -> Option<Vec<String>> {
    let mut types = BTreeSet::new();
    for p in group {
        if p.record_types.is_empty() {
            return None;
        }
        types.extend(p.record_types.iter().cloned());
    }
    Some(types.into_iter().collect())
}

/// `None` means every record type; `Some(vec![])` when no row covers the zone.
///
/// Rows scoped to exactly `zone_id` are merged; the wildcard rows are merged
/// the same way only when no exact row exists.
pub fn get_permitted_record_types(key: Option<&KeyInfo>, zone_id: i64) -> Option<Vec<String>> {
    let rows = rows(key);
    let has_exact = rows.iter().any(|p| p.zone_id == zone_id);
    if has_exact {
        merged_record_types(rows.iter().filter(|p| p.zone_id == zone_id))
    } else if rows.iter().any(Permission::is_wildcard_zone) {
        merged_record_types(rows.iter().filter(|p| p.is_wildcard_zone()))
    } else {
        Some(Vec::new())
    }
}

/// Decide whether `key` may perform `req`.
///
/// A row grants the request when it covers the zone, accepts the record type
/// (record-mutating actions only) and accepts the action name. Rows are
/// considered as a union.
pub fn check_permission(key: Option<&KeyInfo>, req: &ParsedRequest) -> Result<(), Denial> {
    let Some(info) = key else {
        return Err(Denial::NoPermissions);
    };
    if info.permissions.is_empty() {
        return Err(Denial::NoPermissions);
    }

    if req.action.requires_admin() && !info.is_admin {
        return Err(Denial::AdminRequired(req.action));
    }

    // Listing is filtered downstream by get_permitted_zone_ids.
    if req.action == Action::ListZones {
        return Ok(());
    }

    let candidates: Vec<&Permission> = if req.action.is_zoneless() {
        info.permissions.iter().collect()
    } else {
        matching_rows(key, req.zone_id).collect()
    };
    if candidates.is_empty() {
        return Err(Denial::ZoneNotPermitted(req.zone_id));
    }

    let record_type = req.record_type_name();
    let typed: Vec<&Permission> = if req.action.is_record_mutating() {
        candidates
            .into_iter()
            .filter(|p| p.allows_record_type(record_type))
            .collect()
    } else {
        candidates
    };
    if typed.is_empty() {
        return Err(Denial::RecordTypeNotPermitted(record_type));
    }

    if typed.iter().any(|p| p.allows_action(req.action.as_str())) {
        Ok(())
    } else {
        Err(Denial::ActionNotPermitted(req.action))
    }
}

pub fn is_action_permitted(key: Option<&KeyInfo>, req: &ParsedRequest) -> bool {
    check_permission(key, req).is_ok()
}
