//! Error types for ringlink
//!
//! Only the configuration gate fails through this type; every other layer
//! has its own error enum next to the code that produces it.

use thiserror::Error;

/// Why a fetch cycle cannot start
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RinglinkError {
    #[error("Not configured: no access token")]
    NotConfigured,

    #[error("Access token expired")]
    TokenExpired,
}
