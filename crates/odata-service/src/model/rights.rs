//! Visibility and verb rights for resource sets and operations.
//!
//! Rights are looked up by name in an [`AccessRules`] table. A rule for the exact
//! name wins over the `*` wildcard rule; a name with no rule at all gets no rights.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::ops::BitOr;
use std::str::FromStr;

/// Flag set of rights on an entity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntitySetRights(u32);

impl EntitySetRights {
    pub const NONE: Self = Self(0);
    pub const READ_SINGLE: Self = Self(1);
    pub const READ_MULTIPLE: Self = Self(2);
    pub const WRITE_APPEND: Self = Self(4);
    pub const WRITE_REPLACE: Self = Self(8);
    pub const WRITE_DELETE: Self = Self(16);
    pub const WRITE_MERGE: Self = Self(32);
    pub const ALL_READ: Self = Self(1 | 2);
    pub const ALL_WRITE: Self = Self(4 | 8 | 16 | 32);
    pub const ALL: Self = Self(63);

    const NAMES: [(&'static str, Self); 10] = [
        ("None", Self::NONE),
        ("ReadSingle", Self::READ_SINGLE),
        ("ReadMultiple", Self::READ_MULTIPLE),
        ("WriteAppend", Self::WRITE_APPEND),
        ("WriteReplace", Self::WRITE_REPLACE),
        ("WriteDelete", Self::WRITE_DELETE),
        ("WriteMerge", Self::WRITE_MERGE),
        ("AllRead", Self::ALL_READ),
        ("AllWrite", Self::ALL_WRITE),
        ("All", Self::ALL),
    ];

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any right at all makes the set visible.
    pub fn is_visible(self) -> bool {
        self.0 != 0
    }
}

impl BitOr for EntitySetRights {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Parses `"AllRead"`, `"ReadSingle | WriteMerge"` and similar.
impl FromStr for EntitySetRights {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(['|', ','])
            .map(str::trim)
            .try_fold(Self::NONE, |acc, name| {
                Self::NAMES
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(name))
                    .map(|(_, rights)| acc | *rights)
                    .ok_or_else(|| format!("unknown entity set right '{name}'"))
            })
    }
}

impl TryFrom<String> for EntitySetRights {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntitySetRights> for String {
    fn from(value: EntitySetRights) -> Self {
        value.to_string()
    }
}

impl Display for EntitySetRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((name, _)) = Self::NAMES.iter().find(|(_, r)| r == self) {
            return f.write_str(name);
        }
        let names: Vec<&str> = Self::NAMES[1..7]
            .iter()
            .filter(|(_, r)| self.contains(*r))
            .map(|(n, _)| *n)
            .collect();
        f.write_str(&names.join(" | "))
    }
}

/// Rights on an action or service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperationRights {
    #[default]
    None,
    Invoke,
}

impl OperationRights {
    pub fn is_visible(self) -> bool {
        self == OperationRights::Invoke
    }
}

pub type ServiceActionRights = OperationRights;
pub type ServiceOperationRights = OperationRights;

/// Name-or-wildcard rights table.
///
/// ```rust
/// use odata_service::model::{AccessRules, EntitySetRights};
///
/// let rules = AccessRules::new()
///     .with("*", EntitySetRights::ALL_READ)
///     .with("Secrets", EntitySetRights::NONE);
/// assert_eq!(rules.lookup("Customers"), EntitySetRights::ALL_READ);
/// assert_eq!(rules.lookup("Secrets"), EntitySetRights::NONE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessRules<R> {
    rules: BTreeMap<String, R>,
}

impl<R> Default for AccessRules<R> {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }
}

impl<R: Copy + Default> AccessRules<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the rule for `name` (`*` for the wildcard).
    pub fn with(mut self, name: &str, rights: R) -> Self {
        self.set(name, rights);
        self
    }

    pub fn set(&mut self, name: &str, rights: R) {
        self.rules.insert(name.to_string(), rights);
    }

    pub fn lookup(&self, name: &str) -> R {
        self.lookup_any(&[name])
    }

    /// Like [`AccessRules::lookup`], trying several exact names before the wildcard.
    pub fn lookup_any(&self, names: &[&str]) -> R {
        names
            .iter()
            .find_map(|name| self.rules.get(*name))
            .or_else(|| self.rules.get("*"))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rights_flags() {
        assert!(EntitySetRights::ALL.contains(EntitySetRights::WRITE_MERGE));
        assert!(!EntitySetRights::ALL_READ.contains(EntitySetRights::WRITE_APPEND));
        assert!(!EntitySetRights::NONE.is_visible());
        assert!(EntitySetRights::READ_SINGLE.is_visible());
    }

    #[test]
    fn test_rights_parse_and_display() {
        let rights: EntitySetRights = "ReadSingle | WriteMerge".parse().unwrap();
        assert_eq!(
            rights,
            EntitySetRights::READ_SINGLE | EntitySetRights::WRITE_MERGE
        );
        assert_eq!(rights.to_string(), "ReadSingle | WriteMerge");
        assert_eq!(EntitySetRights::ALL_READ.to_string(), "AllRead");
        assert!("Everything".parse::<EntitySetRights>().is_err());
    }

    #[test]
    fn test_exact_rule_beats_wildcard() {
        let rules = AccessRules::new()
            .with("*", OperationRights::Invoke)
            .with("Hidden", OperationRights::None);
        assert_eq!(rules.lookup("Hidden"), OperationRights::None);
        assert_eq!(rules.lookup("Other"), OperationRights::Invoke);
        assert_eq!(
            AccessRules::<OperationRights>::new().lookup("Other"),
            OperationRights::None
        );
    }

    #[test]
    fn test_rules_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Tables {
            sets: AccessRules<EntitySetRights>,
            actions: AccessRules<OperationRights>,
        }
        let tables: Tables = toml::from_str(
            r#"
            [sets]
            "*" = "AllRead"
            Orders = "All"

            [actions]
            "*" = "Invoke"
            "#,
        )
        .unwrap();
        assert_eq!(tables.sets.lookup("Orders"), EntitySetRights::ALL);
        assert_eq!(tables.sets.lookup("Customers"), EntitySetRights::ALL_READ);
        assert_eq!(tables.actions.lookup("Anything"), OperationRights::Invoke);
    }
}
