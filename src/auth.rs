//! Auth-domain identifiers, scope sets, accounts, and cached token models.

pub mod account;
pub mod id;
pub mod scope;
pub mod token;

pub use account::*;
pub use id::*;
pub use scope::*;
pub use token::{record::*, secret::*};
