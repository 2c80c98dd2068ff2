//! Shared data model for the Oasis indexer.
//!
//! This crate defines nothing that talks to the network or a database; it is
//! the common vocabulary every other crate in the workspace builds on:
//! height/round identifiers, addresses and their preimages, transactions and
//! events, and the per-round [`changeset::ChangeSet`].

pub mod address;
pub mod block;
pub mod changeset;
pub mod consensus;
pub mod error;
pub mod hash;
pub mod height;
pub mod tx;

pub use address::{Address, AddressPreimage, PreimageSet};
pub use changeset::ChangeSet;
pub use error::{DeterministicRpcFailure, IndexerError, Result};
pub use hash::Hash;
pub use height::{BlockRange, BlockState, Height, ProcessedBlockRecord, Round};
