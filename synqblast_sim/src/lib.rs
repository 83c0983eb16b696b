//! SynqBlast Deterministic Simulation Testing (DST) Harness
//!
//! A controlled environment where several game peers, a pub/sub channel
//! and the ledger all run against one virtual clock.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual wall clock anchored at UTC midnight, advanced per tick
//! - **Network**: channels with configurable latency, jitter, loss and partitions
//! - **Randomness**: all entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock, seeded RNG)               │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │  Peer   │◄────────────►│  Peer   │     ...               │
//! │  │ replica │   Pub/Sub    │ replica │                       │
//! │  │ engine  │   Channels   │ engine  │                       │
//! │  └────┬────┘              └────┬────┘                       │
//! │       │                        │                            │
//! │  ┌────▼────────────────────────▼────┐                       │
//! │  │            SimLedger             │                       │
//! │  │  (authoritative, fault-injected) │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use synqblast_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).run(ScenarioId::SplitBrain);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod ledger;
mod network;
mod runner;
pub mod scenarios;
mod world;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{PeerFrame, SimEvent, SimExport, SimFrame};
pub use ledger::{LedgerStats, SimLedger};
pub use network::{NetworkMessage, SimNetworkController, SimPubSub};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimPeer, SimWorld, WorldMetrics};
