//! Token secrets and the cached token record.

pub mod record;
pub mod secret;
