use serde::Serialize;

use crate::model::{
    AccountInfo, Accountz, Connz, Gatewayz, HealthStatus, JetStreamStats, JsInfo, Leafz, Routez,
    Subsz, Varz,
};

/// Schema of an endpoint's `data` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Varz,
    Connz,
    Routez,
    Gatewayz,
    Leafz,
    Subsz,
    JsInfo,
    Accountz,
    Health,
    AccountInfo,
    JetStreamStats,
}

impl ResponseKind {
    /// Decodes a raw `data` document into the matching response variant.
    pub fn decode(self, data: &str) -> serde_json::Result<EndpointResponse> {
        Ok(match self {
            ResponseKind::Varz => EndpointResponse::Varz(serde_json::from_str(data)?),
            ResponseKind::Connz => EndpointResponse::Connz(serde_json::from_str(data)?),
            ResponseKind::Routez => EndpointResponse::Routez(serde_json::from_str(data)?),
            ResponseKind::Gatewayz => EndpointResponse::Gatewayz(serde_json::from_str(data)?),
            ResponseKind::Leafz => EndpointResponse::Leafz(serde_json::from_str(data)?),
            ResponseKind::Subsz => EndpointResponse::Subsz(serde_json::from_str(data)?),
            ResponseKind::JsInfo => EndpointResponse::JsInfo(Box::new(serde_json::from_str(data)?)),
            ResponseKind::Accountz => EndpointResponse::Accountz(serde_json::from_str(data)?),
            ResponseKind::Health => EndpointResponse::Health(serde_json::from_str(data)?),
            ResponseKind::AccountInfo => {
                EndpointResponse::AccountInfo(Box::new(serde_json::from_str(data)?))
            }
            ResponseKind::JetStreamStats => {
                EndpointResponse::JetStreamStats(serde_json::from_str(data)?)
            }
        })
    }

    /// Checks `data` against this schema and returns the document exactly as
    /// sent, including fields the typed models do not declare.
    pub fn capture(self, data: &str) -> serde_json::Result<serde_json::Value> {
        self.decode(data)?;
        serde_json::from_str(data)
    }
}

/// A decoded endpoint response. Serializes as the inner document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EndpointResponse {
    Varz(Varz),
    Connz(Connz),
    Routez(Routez),
    Gatewayz(Gatewayz),
    Leafz(Leafz),
    Subsz(Subsz),
    JsInfo(Box<JsInfo>),
    Accountz(Accountz),
    Health(HealthStatus),
    AccountInfo(Box<AccountInfo>),
    JetStreamStats(JetStreamStats),
}

impl EndpointResponse {
    pub fn kind(&self) -> ResponseKind {
        match self {
            EndpointResponse::Varz(_) => ResponseKind::Varz,
            EndpointResponse::Connz(_) => ResponseKind::Connz,
            EndpointResponse::Routez(_) => ResponseKind::Routez,
            EndpointResponse::Gatewayz(_) => ResponseKind::Gatewayz,
            EndpointResponse::Leafz(_) => ResponseKind::Leafz,
            EndpointResponse::Subsz(_) => ResponseKind::Subsz,
            EndpointResponse::JsInfo(_) => ResponseKind::JsInfo,
            EndpointResponse::Accountz(_) => ResponseKind::Accountz,
            EndpointResponse::Health(_) => ResponseKind::Health,
            EndpointResponse::AccountInfo(_) => ResponseKind::AccountInfo,
            EndpointResponse::JetStreamStats(_) => ResponseKind::JetStreamStats,
        }
    }
}
