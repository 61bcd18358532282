//! Typed schemas for the monitoring endpoint responses stored in an archive.
//!
//! Every struct tolerates missing fields (`#[serde(default)]`) so archives
//! captured from older or newer servers still decode. The models are read-side
//! views: the gatherer stores documents as the server sent them and only
//! decodes them here to validate their shape.

mod account;
mod jetstream;
mod server;

pub use account::{AccountClaims, AccountInfo, AccountLimits, NatsClaims};
pub use jetstream::{
    AccountDetail, ApiStats, ClusterInfo, JetStreamStats, JsInfo, MetaClusterInfo, PeerInfo,
    StreamConfig, StreamDetail, StreamState,
};
pub use server::{
    Accountz, ApiError, ApiResponse, Connz, Gatewayz, HealthStatus, Leafz, ProfilezStatus,
    RouteInfo, Routez, ServerInfo, Subsz, Varz,
};

/// Unrecognized fields of a response, preserved verbatim.
pub type Extra = serde_json::Map<String, serde_json::Value>;
