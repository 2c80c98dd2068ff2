//! The versioned node-API abstraction (spec.md section 4.2-4.3).
//!
//! [`ConsensusApi`] and [`RuntimeApi`] are the capability sets every era
//! adapter implements. [`era::GenericJsonRpcAdapter`] is a concrete adapter
//! over a plain JSON-RPC transport; [`cached::CachedApi`] layers the
//! persistent response cache over any adapter; [`history::HistoryRouter`]
//! dispatches a call to whichever adapter's era covers the requested
//! height/round.

pub mod cached;
pub mod consensus_api;
pub mod era;
pub mod error;
pub mod history;
pub mod runtime_api;
pub mod transport;
pub mod types;

pub use cached::CachedApi;
pub use consensus_api::{ConsensusApi, ConsensusBlock};
pub use era::{EraKind, GenericJsonRpcAdapter};
pub use error::{HistoryError, NodeApiError};
pub use history::{HistoryRouter, HEIGHT_LATEST};
pub use runtime_api::{RawRuntimeEvent, RuntimeApi};
pub use transport::JsonRpcTransport;
