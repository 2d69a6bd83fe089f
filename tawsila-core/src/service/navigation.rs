//! Sidebar navigation filtering
//!
//! Items list the permissions that reveal them; holding any one is enough.
//! Groups left without a visible item are dropped entirely.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::permission::PermissionsState;
use crate::models::{Locale, LocalizedText, Permission};

/// Leaf entry of the sidebar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
    pub key: String,
    pub label: LocalizedText,
    /// Locale-less path, e.g. `/users`
    pub href: String,
    /// Empty: visible to every signed-in user
    #[serde(default)]
    pub required: Vec<Permission>,
}

impl NavItem {
    pub fn new(key: &str, label: LocalizedText, href: &str, required: &[Permission]) -> Self {
        Self {
            key: key.to_string(),
            label,
            href: href.to_string(),
            required: required.to_vec(),
        }
    }

    #[must_use]
    pub fn is_gated(&self) -> bool {
        !self.required.is_empty()
    }

    /// Locale-prefixed link target
    #[must_use]
    pub fn localized_href(&self, locale: Locale) -> String {
        locale.prefix(&self.href)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavGroup {
    pub key: String,
    pub title: LocalizedText,
    pub items: Vec<NavItem>,
}

impl NavGroup {
    pub fn new(key: &str, title: LocalizedText, items: Vec<NavItem>) -> Self {
        Self {
            key: key.to_string(),
            title,
            items,
        }
    }
}

/// Filters the navigation tree for one mounted sidebar
///
/// Gated items stay hidden until permissions have resolved once, so the
/// sidebar never shows entries the user is about to lose.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationFilter {
    hydrated: bool,
}

impl NavigationFilter {
    #[must_use]
    pub const fn new() -> Self {
        Self { hydrated: false }
    }

    #[must_use]
    pub const fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn filter(&mut self, tree: &[NavGroup], state: &PermissionsState) -> Vec<NavGroup> {
        if !state.is_loading {
            self.hydrated = true;
        }

        let visible: Vec<NavGroup> = tree
            .iter()
            .filter_map(|group| {
                let items: Vec<NavItem> = group
                    .items
                    .iter()
                    .filter(|item| self.is_visible(item, state))
                    .cloned()
                    .collect();
                (!items.is_empty()).then(|| NavGroup {
                    items,
                    ..group.clone()
                })
            })
            .collect();

        debug!(
            hydrated = self.hydrated,
            groups = visible.len(),
            "Navigation filtered"
        );
        visible
    }

    fn is_visible(&self, item: &NavItem, state: &PermissionsState) -> bool {
        if !item.is_gated() {
            return true;
        }
        self.hydrated && state.has_any_permission(&item.required)
    }
}

/// The dashboard sidebar
#[must_use]
pub fn default_navigation() -> Vec<NavGroup> {
    use Permission::*;

    vec![
        NavGroup::new(
            "overview",
            LocalizedText::new("Overview", "نظرة عامة"),
            vec![NavItem::new(
                "dashboard",
                LocalizedText::new("Dashboard", "لوحة التحكم"),
                "/",
                &[],
            )],
        ),
        NavGroup::new(
            "management",
            LocalizedText::new("Management", "الإدارة"),
            vec![
                NavItem::new(
                    "organizations",
                    LocalizedText::new("Organizations", "المنظمات"),
                    "/organizations",
                    &[ListVendors],
                ),
                NavItem::new("roles", LocalizedText::new("Roles", "الأدوار"), "/roles", &[ListRoles]),
                NavItem::new("users", LocalizedText::new("Users", "المستخدمون"), "/users", &[ListUsers]),
            ],
        ),
        NavGroup::new(
            "operations",
            LocalizedText::new("Operations", "العمليات"),
            vec![
                NavItem::new(
                    "inventories",
                    LocalizedText::new("Inventories", "المخازن"),
                    "/inventories",
                    &[ListInventories],
                ),
                NavItem::new(
                    "orders",
                    LocalizedText::new("Orders", "الطلبات"),
                    "/orders",
                    &[ListOrders, AssignOrder],
                ),
            ],
        ),
        NavGroup::new(
            "finance",
            LocalizedText::new("Finance", "المالية"),
            vec![
                NavItem::new(
                    "wallets",
                    LocalizedText::new("Wallets", "المحافظ"),
                    "/wallets",
                    &[ListWallets],
                ),
                NavItem::new(
                    "transactions",
                    LocalizedText::new("Transactions", "المعاملات"),
                    "/transactions",
                    &[ListTransactions],
                ),
            ],
        ),
        NavGroup::new(
            "reports",
            LocalizedText::new("Reports", "التقارير"),
            vec![
                NavItem::new(
                    "agent-performance",
                    LocalizedText::new("Agent performance", "أداء المندوبين"),
                    "/reports/agent-performance",
                    &[ListUsers, ListOrders],
                ),
                NavItem::new(
                    "top-agents",
                    LocalizedText::new("Top agents", "أفضل المندوبين"),
                    "/reports/top-agents",
                    &[ListUsers, ListOrders],
                ),
                NavItem::new(
                    "top-vendors",
                    LocalizedText::new("Top vendors", "أفضل التجار"),
                    "/reports/top-vendors",
                    &[ListVendors, ListOrders],
                ),
            ],
        ),
    ]
}
