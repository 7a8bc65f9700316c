// # mydyns-core
//
// Core library for the token-authenticated dynamic DNS service.
//
// ## Architecture Overview
//
// - **TokenCodec**: Signs and verifies opaque capability tokens
// - **CredentialDb**: Reloadable snapshot of the user, host and security databases
// - **ip**: Client address resolution and policy
// - **UpdateWorker**: Single task that batches pending updates and flushes them
// - **UpdateDispatcher**: Trait for applying a batch (nsupdate in production)
// - **DynDns**: Request-level operations tying the above together
//
// ## Request Flow
//
// 1. `issue_token`: Basic auth → host check → security value → token
// 2. `apply_update`: token → security check → host check → address → queue
// 3. Every tick the worker drains the queue and dispatches the work-set

pub mod config;
pub mod credentials;
pub mod error;
pub mod ip;
pub mod nsupdate;
pub mod service;
pub mod token;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use config::{ServiceConfig, NsUpdateConfig, WorkerConfig};
pub use credentials::{CredentialDb, Credentials};
pub use error::{Error, Result};
pub use nsupdate::NsUpdateDispatcher;
pub use service::{BasicAuth, DynDns, UpdateOutcome, UpdateRequest};
pub use token::{TokenCodec, TokenData, UPDATE_TOKEN_PURPOSE};
pub use traits::{UpdateBatch, UpdateDispatcher};
pub use worker::{PendingUpdate, UpdateQueue, UpdateWorker, WorkerEvent};
