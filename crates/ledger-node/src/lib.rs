//! A ledger node: one chain, one pool and one wallet behind async locks, an
//! HTTP request surface, and a pluggable bus to its peers.

pub mod api;
pub mod bus;
pub mod constants;
pub mod state;

pub use state::{NodeError, NodeState, WalletInfo};
