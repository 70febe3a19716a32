//! Certsync Core - Shared model types
//!
//! This crate contains the types shared between the certificate synchronizer
//! (`certsync-server`) and its collaborators: the secret record model, the
//! content checksum, hostname matching, and the payload pushed to the
//! dynamic certificate endpoint.
//!
//! Certificate parsing, persistence and listener reloads live in the
//! `certsync-server` crate.

mod checksum;
mod hostname;
mod protocol;
mod secret;

pub use checksum::Checksum;
pub use hostname::is_valid_hostname;
pub use protocol::*;
pub use secret::*;
