//! Collaborators around the engine: where inputs come from and where past results go.

mod error;
pub mod history;
pub mod kv;
pub mod query;
pub mod state;

pub use error::{StoreError, StoreResult};
pub use history::{HistoryItem, HistoryPeriod, HistorySnapshot, HistoryStore};
pub use kv::{JsonFileStore, KeyValueStore, MemoryStore};
pub use query::{QueryParams, inputs_to_shareable_url, parse_inputs_from_query};
pub use state::{InputSource, InputsRecord, STATE_KEY, StoredInputSource};
