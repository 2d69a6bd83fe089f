pub mod locale;
pub mod permission;
pub mod session;

pub use locale::{Locale, LocalizedText};
pub use permission::{
    Permission, PermissionModule, PermissionSnapshot, UnknownPermission, PERMISSIONS,
    PERMISSION_MODULES,
};
pub use session::{ProfileRole, UserProfile, UserSession};
