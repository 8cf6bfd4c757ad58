//! Types and primitives shared by every Strand crate: thread identity
//! derivation, the content codec, and wire types.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::{CryptoError, IdentityError, ProtocolError};
pub use identity::{generate_phrase, NodeIdentity, ThreadIdentity};
pub use protocol::{Announcement, PhotoList, PhotoMetadata};
pub use types::{ContentPath, Part, ThreadId};
