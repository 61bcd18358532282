use crate::gather::response::ResponseKind;
use crate::tag::artifact;

/// One monitoring endpoint to capture: the API subject suffix, the schema of
/// its response and the artifact type it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCapture {
    pub api_suffix: String,
    pub kind: ResponseKind,
    pub artifact_type: String,
}

impl EndpointCapture {
    pub fn new(api_suffix: impl Into<String>, kind: ResponseKind, artifact_type: impl Into<String>) -> Self {
        Self {
            api_suffix: api_suffix.into(),
            kind,
            artifact_type: artifact_type.into(),
        }
    }
}

/// What a gather run requests and stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherConfig {
    pub server_endpoints: Vec<EndpointCapture>,
    pub account_endpoints: Vec<EndpointCapture>,
    pub profile_types: Vec<String>,
    pub capture_server_endpoints: bool,
    pub capture_account_endpoints: bool,
    pub capture_streams: bool,
    pub capture_consumers: bool,
    pub capture_profiles: bool,
    /// Recorded in the capture metadata.
    pub tool_version: String,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            server_endpoints: default_server_endpoints(),
            account_endpoints: default_account_endpoints(),
            profile_types: ["goroutine", "heap", "allocs"]
                .into_iter()
                .map(String::from)
                .collect(),
            capture_server_endpoints: true,
            capture_account_endpoints: true,
            capture_streams: true,
            capture_consumers: true,
            capture_profiles: false,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub fn default_server_endpoints() -> Vec<EndpointCapture> {
    vec![
        EndpointCapture::new("VARZ", ResponseKind::Varz, artifact::VARIABLES),
        EndpointCapture::new("CONNZ", ResponseKind::Connz, artifact::CONNECTIONS),
        EndpointCapture::new("ROUTEZ", ResponseKind::Routez, artifact::ROUTES),
        EndpointCapture::new("GATEWAYZ", ResponseKind::Gatewayz, artifact::GATEWAYS),
        EndpointCapture::new("LEAFZ", ResponseKind::Leafz, artifact::LEAFS),
        EndpointCapture::new("SUBSZ", ResponseKind::Subsz, artifact::SUBS),
        EndpointCapture::new("JSZ", ResponseKind::JsInfo, artifact::JETSTREAM),
        EndpointCapture::new("ACCOUNTZ", ResponseKind::Accountz, artifact::ACCOUNTS),
        EndpointCapture::new("HEALTHZ", ResponseKind::Health, artifact::HEALTH),
    ]
}

pub fn default_account_endpoints() -> Vec<EndpointCapture> {
    vec![
        EndpointCapture::new("CONNZ", ResponseKind::Connz, artifact::ACCOUNT_CONNECTIONS),
        EndpointCapture::new("LEAFZ", ResponseKind::Leafz, artifact::ACCOUNT_LEAFS),
        EndpointCapture::new("SUBSZ", ResponseKind::Subsz, artifact::ACCOUNT_SUBS),
        EndpointCapture::new("INFO", ResponseKind::AccountInfo, artifact::ACCOUNT_INFO),
        EndpointCapture::new("JSZ", ResponseKind::JetStreamStats, artifact::ACCOUNT_JETSTREAM),
    ]
}
