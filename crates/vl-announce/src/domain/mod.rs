//! Domain layer: wire formats, validation rules, and protocol policy.

pub mod backoff;
pub mod config;
pub mod errors;
pub mod message;
pub mod payloads;

pub use backoff::query_backoff;
pub use config::AnnounceConfig;
pub use errors::AnnounceError;
pub use message::{Message, MessageCode};
pub use payloads::{
    decode_version_rows, encode_version_rows, version_signing_digest, EncryptedEnodeUrl,
    EnodeCertificate, QueryEnodePayload, VersionRow,
};
