//! `marketsync-core`: domain building blocks for the offline sync engine.
//!
//! This crate contains **pure domain** types (no storage or network concerns):
//! identifiers, cache metadata, offline mutation payloads and the service
//! listing model.

pub mod error;
pub mod id;
pub mod metadata;
pub mod mutation;
pub mod profile;
pub mod service;

pub use error::{DomainError, DomainResult};
pub use id::{ClientTempId, ServerId};
pub use metadata::SyncMetadata;
pub use mutation::{
    BidMutation, BookingMutation, MessageMutation, MessageType, MutationKind, OfflineMutation,
};
pub use profile::UserProfile;
pub use service::{FilterSignature, ServiceFilter, ServiceRecord};
