// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyed record persistence for signal flow graphs.
//!
//! Records live in named [`Collection`]s. Each collection keeps a full
//! in-memory cache that is authoritative for reads; durable writes go
//! through a background worker and failures surface as [`StoreNotice`]s.
//!
//! ```text
//! Collection::put ──► cache ──► Writer thread ──► Backend
//!                                   │
//!                                   └─ failure ──► StoreNotice
//! ```

pub mod backend;
pub mod collection;
pub mod config;
pub mod error;
pub mod store;
mod writer;

pub use backend::{Backend, DirBackend, MemoryBackend};
pub use collection::{Collection, SyncReport};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::Store;
pub use writer::{NoticeOp, StoreNotice};
