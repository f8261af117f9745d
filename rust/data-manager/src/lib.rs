#![warn(missing_docs)]

//! This crate contains a generic key/value store that lets several storage
//! strategies coexist behind one read/write interface.
//!
//! Callers only ever deal with a [DataManager] and the keys of their data.
//! Specialized strategies - a store keeping some values in a more compact
//! form, an index deriving lookups from other values, and so on - implement
//! [DedicatedStorage] and get registered with the manager. For every key, the
//! manager decides which registered storage owns the data (falling back to a
//! plain [MemoryStorage] when none is able to), remembers that decision, and
//! notifies every other storage that depends on the key whenever it changes:
//!
//! ```no_run
//! use data_manager::{DataManager, SharedStorage};
//!
//! # async fn example(
//! #     index: SharedStorage<String, String>,
//! # ) -> Result<(), data_manager::DataManagerError> {
//! let manager = DataManager::<String, String>::new();
//!
//! manager.set("greeting".into(), "hello".into()).await?;
//!
//! // Move the data the new storage cares about into it
//! manager.add_storage(index.clone(), true).await?;
//!
//! assert_eq!(
//!     manager.get(&"greeting".to_string()).await?,
//!     Some("hello".to_string())
//! );
//! # Ok(())
//! # }
//! ```
//!
//! A [DataManager] is itself a [ReadWriteStorage], so managers may be nested:
//! one can serve as the fallback of another.

mod sync;
pub use sync::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod storage;
pub use storage::*;

mod responsibility;
pub use responsibility::*;

mod manager;
pub use manager::*;

#[cfg(any(test, feature = "helpers"))]
mod helpers;
#[cfg(any(test, feature = "helpers"))]
pub use helpers::*;
