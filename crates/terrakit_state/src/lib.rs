//! # terrakit_state
//!
//! Provisioning state model and a bounded local cache for state snapshots.
//!
//! # Features
//!
//! - **State Model**: serde types for the tool's JSON state file with
//!   structural validation
//! - **State Cache**: content-addressed snapshot files with LRU eviction
//!   under a size bound and TTL expiry
//! - **Diff and Merge**: compare two cached states by resource address and
//!   output name, or merge several into one
//! - **Import, Export and Streaming**: validated import, indented export,
//!   raw byte streaming
//! - **Background Sweep**: periodic expiry on a tokio interval
//!
//! # Example
//!
//! ```rust,no_run
//! use terrakit_state::{CacheConfig, Metadata, State, StateCache};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = StateCache::new(CacheConfig::new("/tmp/terrakit-cache"))?;
//!
//!     let state = State::new("1.6.2", "6e0f5c1a-0000-4000-8000-000000000000");
//!     cache.put("dev", &state, Metadata::new())?;
//!
//!     let cached = cache.get("dev")?;
//!     println!("serial {}", cached.serial);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod diff;
pub mod error;
pub mod model;

pub use cache::{CacheStats, EntryInfo, Metadata, StateCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use diff::StateDiff;
pub use error::{StateError, StateResult};
pub use model::{
    CheckResult, State, StateOutput, StateResource, MAX_STATE_VERSION, MIN_STATE_VERSION,
};
