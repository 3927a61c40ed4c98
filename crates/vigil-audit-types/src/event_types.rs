//! Well-known event type tokens.
//!
//! Event types are open strings so producers can evolve without a
//! coordinated release of this crate; these constants name the types the
//! platform's own services emit and the detection engine watches for.

/// Successful login.
pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
/// Failed login attempt.
pub const LOGIN_FAILURE: &str = "LOGIN_FAILURE";
/// Explicit logout.
pub const LOGOUT: &str = "LOGOUT";
/// Access token refresh.
pub const TOKEN_REFRESH: &str = "TOKEN_REFRESH";
/// Password changed by its owner.
pub const PASSWORD_CHANGED: &str = "PASSWORD_CHANGED";
/// Password reset requested.
pub const PASSWORD_RESET_REQUESTED: &str = "PASSWORD_RESET_REQUESTED";
/// Multi-factor authentication turned on.
pub const MFA_ENABLED: &str = "MFA_ENABLED";
/// Multi-factor authentication turned off.
pub const MFA_DISABLED: &str = "MFA_DISABLED";

/// Clinical record viewed.
pub const RECORD_VIEWED: &str = "RECORD_VIEWED";
/// Clinical record created.
pub const RECORD_CREATED: &str = "RECORD_CREATED";
/// Clinical record updated.
pub const RECORD_UPDATED: &str = "RECORD_UPDATED";
/// Clinical record deleted.
pub const RECORD_DELETED: &str = "RECORD_DELETED";
/// Patient chart opened.
pub const PATIENT_ACCESSED: &str = "PATIENT_ACCESSED";
/// Bulk export requested.
pub const EXPORT_REQUESTED: &str = "EXPORT_REQUESTED";

/// User role changed.
pub const ROLE_CHANGED: &str = "ROLE_CHANGED";
/// Permission grant changed.
pub const PERMISSION_CHANGED: &str = "PERMISSION_CHANGED";
/// User account created.
pub const USER_CREATED: &str = "USER_CREATED";
/// User account deleted.
pub const USER_DELETED: &str = "USER_DELETED";
/// Administrator account created.
pub const ADMIN_CREATED: &str = "ADMIN_CREATED";
/// Administrator account deleted.
pub const ADMIN_DELETED: &str = "ADMIN_DELETED";
/// Data retention policy changed.
pub const RETENTION_CHANGED: &str = "RETENTION_CHANGED";

/// Operation refused by access control.
pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
/// Operation allowed by access control.
pub const ACCESS_GRANTED: &str = "ACCESS_GRANTED";

/// New platform user registered (synthesized by ingestion).
pub const USER_REGISTERED: &str = "USER_REGISTERED";
/// Patient assigned to a clinician (synthesized by ingestion).
pub const PATIENT_ASSIGNED: &str = "PATIENT_ASSIGNED";
/// Care-team assignment created.
pub const ASSIGNMENT_CREATED: &str = "ASSIGNMENT_CREATED";
/// Care-team assignment removed.
pub const ASSIGNMENT_REMOVED: &str = "ASSIGNMENT_REMOVED";
/// Patient consent granted.
pub const CONSENT_GRANTED: &str = "CONSENT_GRANTED";
/// Patient consent revoked.
pub const CONSENT_REVOKED: &str = "CONSENT_REVOKED";
