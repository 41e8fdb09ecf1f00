//! Permission rows and the per-request identity they are resolved into.
use serde::{Deserialize, Serialize};

/// Zone id that stands for "every zone".
pub const ALL_ZONES: i64 = 0;

/// Explicit view over the `zone_id == 0` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneScope {
    All,
    Specific(i64),
}

impl ZoneScope {
    pub fn from_zone_id(zone_id: i64) -> Self {
        if zone_id == ALL_ZONES {
            ZoneScope::All
        } else {
            ZoneScope::Specific(zone_id)
        }
    }

    pub fn covers(self, zone_id: i64) -> bool {
        match self {
            ZoneScope::All => true,
            ZoneScope::Specific(id) => id == zone_id,
        }
    }
}

/// One scoping rule attached to a token.
///
/// Empty `record_types` or `allowed_actions` lists mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub token_id: i64,
    pub zone_id: i64,
    pub record_types: Vec<String>,
    pub allowed_actions: Vec<String>,
}

impl Permission {
    /// Implicit rule carried by master and admin identities.
    pub fn all_access(token_id: i64) -> Self {
        Self {
            id: 0,
            token_id,
            zone_id: ALL_ZONES,
            record_types: Vec::new(),
            allowed_actions: Vec::new(),
        }
    }

    pub fn scope(&self) -> ZoneScope {
        ZoneScope::from_zone_id(self.zone_id)
    }

    pub fn is_wildcard_zone(&self) -> bool {
        self.zone_id == ALL_ZONES
    }

    pub fn allows_record_type(&self, record_type: &str) -> bool {
        self.record_types.is_empty() || self.record_types.iter().any(|t| t == record_type)
    }

    pub fn allows_action(&self, action: &str) -> bool {
        self.allowed_actions.is_empty() || self.allowed_actions.iter().any(|a| a == action)
    }
}

/// Input for creating a permission row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub zone_id: i64,
    #[serde(default)]
    pub record_types: Vec<String>,
    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

/// Identity and permission set resolved for one presented key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    pub key_id: i64,
    pub key_name: String,
    pub permissions: Vec<Permission>,
    pub is_admin: bool,
    pub is_master: bool,
}

impl KeyInfo {
    /// A scoped identity limited to its permission rows.
    pub fn scoped(key_id: i64, key_name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            key_id,
            key_name: key_name.into(),
            permissions,
            is_admin: false,
            is_master: false,
        }
    }

    /// An identity with unrestricted access.
    pub fn privileged(key_id: i64, key_name: impl Into<String>, is_master: bool) -> Self {
        Self {
            key_id,
            key_name: key_name.into(),
            permissions: vec![Permission::all_access(key_id)],
            is_admin: true,
            is_master,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_zone_id_is_the_wildcard_scope() {
        assert_eq!(ZoneScope::from_zone_id(0), ZoneScope::All);
        assert_eq!(ZoneScope::from_zone_id(7), ZoneScope::Specific(7));
        assert!(ZoneScope::All.covers(12345));
        assert!(ZoneScope::Specific(7).covers(7));
        assert!(!ZoneScope::Specific(7).covers(8));
    }

    #[test]
    fn empty_lists_are_unrestricted() {
        let perm = Permission {
            zone_id: 1,
            ..Default::default()
        };
        assert!(perm.allows_record_type("MX"));
        assert!(perm.allows_action("delete_record"));

        let perm = Permission {
            zone_id: 1,
            record_types: vec!["TXT".into()],
            allowed_actions: vec!["add_record".into()],
            ..Default::default()
        };
        assert!(perm.allows_record_type("TXT"));
        assert!(!perm.allows_record_type("A"));
        assert!(perm.allows_action("add_record"));
        assert!(!perm.allows_action("delete_record"));
    }

    #[test]
    fn privileged_identities_carry_a_wildcard_row() {
        let key = KeyInfo::privileged(3, "master", true);
        assert!(key.is_admin);
        assert_eq!(key.permissions, vec![Permission::all_access(3)]);
        assert!(key.permissions[0].is_wildcard_zone());
    }
}
