use crate::error::GatherError;

pub const SERVER_PING: &str = "$SYS.REQ.SERVER.PING";
pub const ACCOUNTZ_PING: &str = "$SYS.REQ.SERVER.PING.ACCOUNTZ";
pub const JSZ_PING: &str = "$SYS.REQ.SERVER.PING.JSZ";

pub fn server_subject(server_id: &str, suffix: &str) -> String {
    format!("$SYS.REQ.SERVER.{server_id}.{suffix}")
}

pub fn account_subject(account: &str, suffix: &str) -> String {
    format!("$SYS.REQ.ACCOUNT.{account}.{suffix}")
}

/// Details of the connection a transport is using, for capture metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub server_name: String,
    pub server_version: String,
    pub url: String,
}

/// Request/response access to the cluster's system API.
pub trait Transport {
    /// Sends `payload` to `subject` and collects the replies.
    ///
    /// With `expected = Some(n)` the call returns after `n` replies (or its own
    /// timeout); with `None` it gathers every reply that arrives before the
    /// timeout, which is how broadcast discovery works.
    fn request(
        &mut self,
        subject: &str,
        payload: Option<&[u8]>,
        expected: Option<usize>,
    ) -> Result<Vec<Vec<u8>>, GatherError>;

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::default()
    }
}
