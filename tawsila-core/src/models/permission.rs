//! Permission directory
//!
//! Every permission identifier the backend can grant, grouped into the
//! dashboard modules that use them. The enumeration, the module sets and the
//! static tables are all generated from the single `permission_directory!`
//! invocation below, so adding a permission is a one-line change.
//!
//! Snapshots coming from the backend are kept as raw strings: identifiers this
//! build does not know are preserved (the cache must round-trip them) but
//! never satisfy a check.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Error returned when parsing an identifier that is not in the directory
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission: {0}")]
pub struct UnknownPermission(pub String);

/// Generates `Permission`, `PermissionModule`, `PERMISSIONS` and
/// `PERMISSION_MODULES` from one table.
///
/// ```rust,ignore
/// permission_directory! {
///     Users => [ListUsers = "list-users", CreateUser = "create-user"],
/// }
/// ```
macro_rules! permission_directory {
    ($( $module:ident ($module_key:literal) => [ $( $variant:ident = $wire:literal ),+ $(,)? ] ),+ $(,)?) => {
        /// A single backend permission identifier
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Permission {
            $($(
                #[serde(rename = $wire)]
                $variant,
            )+)+
        }

        /// Dashboard module a permission belongs to
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum PermissionModule {
            $($module,)+
        }

        /// Every permission in the directory, in declaration order
        pub const PERMISSIONS: &[Permission] = &[$($(Permission::$variant,)+)+];

        /// Module to permission-set table
        pub const PERMISSION_MODULES: &[(PermissionModule, &[Permission])] = &[
            $((PermissionModule::$module, &[$(Permission::$variant,)+]),)+
        ];

        impl Permission {
            /// Wire identifier, e.g. `"list-users"`
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($(Self::$variant => $wire,)+)+
                }
            }

            #[must_use]
            pub const fn module(self) -> PermissionModule {
                match self {
                    $($(Self::$variant => PermissionModule::$module,)+)+
                }
            }
        }

        impl FromStr for Permission {
            type Err = UnknownPermission;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($($wire => Ok(Self::$variant),)+)+
                    _ => Err(UnknownPermission(s.to_string())),
                }
            }
        }

        impl PermissionModule {
            /// All modules, in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$module,)+];

            /// Named permission set of this module
            #[must_use]
            pub const fn permissions(self) -> &'static [Permission] {
                match self {
                    $(Self::$module => &[$(Permission::$variant,)+],)+
                }
            }

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$module => $module_key,)+
                }
            }
        }
    };
}

permission_directory! {
    Users("users") => [
        ListUsers = "list-users",
        ShowUser = "show-user",
        CreateUser = "create-user",
        EditUser = "edit-user",
        DeleteUser = "delete-user",
    ],
    Roles("roles") => [
        ListRoles = "list-roles",
        ShowRole = "show-role",
        CreateRole = "create-role",
        EditRole = "edit-role",
        DeleteRole = "delete-role",
    ],
    Vendors("vendors") => [
        ListVendors = "list-vendors",
        ShowVendor = "show-vendor",
        CreateVendor = "create-vendor",
        EditVendor = "edit-vendor",
        DeleteVendor = "delete-vendor",
    ],
    Orders("orders") => [
        ListOrders = "list-orders",
        ShowOrder = "show-order",
        CreateOrder = "create-order",
        EditOrder = "edit-order",
        DeleteOrder = "delete-order",
        AssignOrder = "assign-order",
    ],
    Inventories("inventories") => [
        ListInventories = "list-inventories",
        ShowInventory = "show-inventory",
        CreateInventory = "create-inventory",
        EditInventory = "edit-inventory",
        DeleteInventory = "delete-inventory",
    ],
    Wallets("wallets") => [
        ListWallets = "list-wallets",
        ShowWallet = "show-wallet",
    ],
    Transactions("transactions") => [
        ListTransactions = "list-transactions",
        ShowTransaction = "show-transaction",
    ],
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for PermissionModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialized list of permission strings in effect for a session
///
/// Order is preserved: two snapshots are equal only when they hold the same
/// strings in the same order, which is how the cache decides whether the
/// authoritative list diverged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSnapshot(Vec<String>);

impl PermissionSnapshot {
    #[must_use]
    pub const fn new(permissions: Vec<String>) -> Self {
        Self(permissions)
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Check if has specific permission
    #[must_use]
    pub fn has(&self, permission: Permission) -> bool {
        self.0.iter().any(|p| p == permission.as_str())
    }

    /// Check if has any of the specified permissions (false for an empty list)
    #[must_use]
    pub fn has_any(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has(*p))
    }

    /// Check if has all specified permissions (true for an empty list)
    #[must_use]
    pub fn has_all(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has(*p))
    }

    /// Known permissions in the snapshot; unknown identifiers are skipped
    pub fn known(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().filter_map(|p| p.parse().ok())
    }

    /// Identifiers the directory does not know
    pub fn unknown(&self) -> impl Iterator<Item = &str> + '_ {
        self.0
            .iter()
            .filter(|p| p.parse::<Permission>().is_err())
            .map(String::as_str)
    }

    /// Modules with at least one permission present
    #[must_use]
    pub fn visible_modules(&self) -> Vec<PermissionModule> {
        PermissionModule::ALL
            .iter()
            .copied()
            .filter(|module| self.has_any(module.permissions()))
            .collect()
    }
}

impl From<Vec<String>> for PermissionSnapshot {
    fn from(permissions: Vec<String>) -> Self {
        Self(permissions)
    }
}

impl FromIterator<Permission> for PermissionSnapshot {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().map(|p| p.as_str().to_string()).collect())
    }
}
