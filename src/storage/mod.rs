//! Storage contract, adapter and built-in backends.

pub mod adapter;
pub mod backend;
pub mod black_hole;
pub mod capabilities;
pub mod contract;
pub mod event;
pub mod memory;
pub mod options;
pub mod pipeline;

pub use adapter::StorageAdapter;
pub use backend::Backend;
pub use black_hole::BlackHoleBackend;
pub use capabilities::{Capabilities, CapabilitiesBuilder, DataType, DataTypeSupport, MaxKeyLength};
pub use contract::{
    AvailableSpace, CasToken, ClearByNamespace, ClearByPrefix, ClearExpired, Flushable, Storage,
    Taggable, TotalSpace,
};
pub use event::{Event, Hook, Operation, Outcome, Params, Phase};
pub use memory::MemoryBackend;
pub use options::AdapterOptions;
pub use pipeline::{EventPipeline, Listener, ListenerHandle};
