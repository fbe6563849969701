//! The legacy calling convention, layered over [`crate::driver`].
//!
//! ```text
//! MongoClient ──connect──▶ LegacyDb ──collection──▶ LegacyCollection ──find──▶ LegacyCursor
//!      │                      │                           │                        │
//!   Driver              DatabaseHandle             CollectionHandle           CursorHandle
//! ```
//!
//! Each adapter wraps its driver handle in [`Emulated`] and dereferences to
//! it, so everything the driver offers remains reachable; the adapter only
//! adds or overrides the operations whose shape changed.

pub mod client;
pub mod collection;
pub mod cursor;
pub mod database;
pub mod dispatch;
pub mod wrap;

pub use client::{ConnectCall, MongoClient};
pub use collection::{
    AggregateCall, AggregateReply, CountCall, Docs, FindOneCall, IndexCall, InsertCall,
    LegacyCollection, Pipeline, RemoveCall, UpdateCall, UpdateRoute,
};
pub use cursor::LegacyCursor;
pub use database::LegacyDb;
pub use dispatch::Pending;
pub use wrap::{Emulated, NEVER_FORWARD};
