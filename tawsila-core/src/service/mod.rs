pub mod guard;
pub mod navigation;
pub mod permission;

pub use guard::{GuardState, MatchMode, PageGuard, PageRequirement};
pub use navigation::{default_navigation, NavGroup, NavItem, NavigationFilter};
pub use permission::{PermissionSynchronizer, PermissionsState, RefreshTrigger};
