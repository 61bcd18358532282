//! Capture driver: discovers a cluster through its system API and stores the
//! monitoring endpoint responses in an archive.

mod endpoints;
mod gatherer;
mod response;
mod transport;

pub use endpoints::{
    EndpointCapture, GatherConfig, default_account_endpoints, default_server_endpoints,
};
pub use gatherer::{GatherSummary, Gatherer};
pub use response::{EndpointResponse, ResponseKind};
pub use transport::{
    ACCOUNTZ_PING, ConnectionInfo, JSZ_PING, SERVER_PING, Transport, account_subject,
    server_subject,
};
