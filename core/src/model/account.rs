use serde::{Deserialize, Serialize};

use super::Extra;

/// Limits carried by an account's JWT. A value of `-1` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountLimits {
    pub conn: i64,
    pub leaf: i64,
    pub subs: i64,
    pub streams: i64,
    pub consumer: i64,
    pub mem_storage: i64,
    pub disk_storage: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsClaims {
    pub limits: AccountLimits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountClaims {
    pub sub: String,
    pub iss: String,
    pub name: String,
    pub nats: NatsClaims,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Per-server report on one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountInfo {
    pub account_name: String,
    pub is_system: bool,
    pub expired: bool,
    pub complete: bool,
    pub jetstream_enabled: bool,
    pub leafnode_connections: i64,
    pub client_connections: i64,
    pub subscriptions: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_jwt: Option<AccountClaims>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl AccountInfo {
    /// JWT limits, if the account is backed by a decoded JWT.
    pub fn limits(&self) -> Option<&AccountLimits> {
        self.decoded_jwt.as_ref().map(|claims| &claims.nats.limits)
    }
}
