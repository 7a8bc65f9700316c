// # Update Dispatcher Trait
//
// Defines the interface between the batching worker and whatever applies a
// batch of record changes to DNS.
//
// ## Implementations
//
// - nsupdate: `crate::nsupdate::NsUpdateDispatcher`
//
// ## Usage
//
// ```rust,ignore
// use mydyns_core::traits::{UpdateBatch, UpdateDispatcher};
//
// let mut batch = UpdateBatch::new();
// batch.insert("example".to_string(), "8.8.8.8".parse()?);
// dispatcher.dispatch(&batch).await?;
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Coalesced record changes: hostname label → new address
///
/// Ordered so that rendered scripts are deterministic.
pub type UpdateBatch = BTreeMap<String, IpAddr>;

/// Trait for update dispatcher implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Retry
///
/// Dispatchers execute exactly one attempt per call and report failure by
/// returning an error. The worker keeps the batch and retries it on its
/// next tick together with anything that arrived meanwhile, so a
/// dispatcher must not sleep or loop on its own.
///
/// # Atomicity
///
/// A batch is applied as a whole or reported as failed. After an error the
/// same hostnames will be dispatched again, so applying a record twice must
/// be harmless.
#[async_trait]
pub trait UpdateDispatcher: Send + Sync {
    /// Apply a batch of record changes
    ///
    /// # Parameters
    ///
    /// - `batch`: Non-empty map of hostname labels to their new address
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Every record in the batch was applied
    /// - `Err(Error)`: Nothing can be assumed applied
    async fn dispatch(&self, batch: &UpdateBatch) -> Result<(), crate::Error>;

    /// Get the dispatcher name (for logging/debugging)
    fn dispatcher_name(&self) -> &'static str;
}
