//! # Node Runtime
//!
//! Everything that turns the ISAAC engine into a running validator.
//!
//! ## Modules
//!
//! - `ports/` - the transport port and its message envelope
//! - `adapters/` - in-process network, store selection, account reader
//! - `config` - node configuration (file + environment)
//! - `driver/` - round/state driver and its per-state timer
//! - `runner` - [`NodeRunner`]: intake loop, driver worker, sweeper
//!
//! ## Startup Sequence
//!
//! 1. Load and validate configuration
//! 2. Open the store, write genesis if absent
//! 3. Build the engine and the finalizer
//! 4. Spawn intake, driver and sweeper tasks
//! 5. Start the first round once enough peers are connected

pub mod adapters;
pub mod config;
pub mod driver;
pub mod error;
pub mod ports;
pub mod runner;

pub use adapters::{open_store, MemoryNetwork, MemoryTransport, StorageAccountReader};
pub use config::{devnet_keypair, ConfigError, DriverConfig, NodeConfig};
pub use driver::{DriverRequest, IsaacStateManager, StateTimer, TimerKind};
pub use error::{RuntimeError, RuntimeResult};
pub use ports::{MessageKind, NetworkMessage, Transport};
pub use runner::{NodeDependencies, NodeEngine, NodeInfo, NodeRunner, NodeStatus};
