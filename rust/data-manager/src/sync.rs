//! Cross-target bounds for storage strategies
//!
//! Storage strategies are shared between the [DataManager](crate::DataManager)
//! and its callers. On native targets that means they may be driven from
//! several threads, so they must be `Send + Sync`. On `wasm32` everything runs
//! on one thread and these traits add no bound at all.

/// Implemented by every `Send` type. Futures returned by storage strategies
/// and values crossing an `await` are bound by it.
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSend: Send {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSend for S where S: Send {}

/// Implemented by every `Send + Sync` type. Storage strategies and their keys
/// are bound by it, since the manager hands out shared references to them.
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSync for S where S: Send + Sync {}

/// Implemented by every type, as nothing leaves the single wasm32 thread
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSend {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSend for S {}

/// Implemented by every type, as nothing leaves the single wasm32 thread
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSync {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSync for S {}
