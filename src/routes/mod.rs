/// Router Module Index
///
/// Organizes routing into access-segregated modules. Access control is applied at
/// the module level with route layers, so a handler is never reachable without
/// the checks its module declares.

/// Routes open to anonymous callers: signup, login, logout.
pub mod public;

/// Routes behind `protect` (bearer token or `jwt` cookie).
pub mod authenticated;

/// Routes behind `protect` plus a role check.
pub mod admin;

/// Page routes, gated by the server-side session.
pub mod views;
