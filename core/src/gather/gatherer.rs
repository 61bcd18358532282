use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::container::ContainerWriter;
use crate::error::GatherError;
use crate::gather::endpoints::{EndpointCapture, GatherConfig};
use crate::gather::transport::{
    ACCOUNTZ_PING, JSZ_PING, SERVER_PING, Transport, account_subject, server_subject,
};
use crate::model::{Accountz, ApiResponse, JsInfo, ProfilezStatus, ServerInfo};
use crate::tag::Tag;
use crate::writer::{CaptureMetadata, Sideband, Writer};

/// Counters describing a finished gather run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatherSummary {
    pub servers: usize,
    pub accounts: usize,
    pub system_account: Option<String>,
    pub server_responses: usize,
    pub profiles: usize,
    pub account_responses: usize,
    pub streams: usize,
    pub warnings: usize,
}

#[derive(Serialize)]
struct ProfilezOptions<'a> {
    name: &'a str,
    debug: u8,
}

#[derive(Serialize)]
struct JszOptions<'a> {
    account: &'a str,
    streams: bool,
    consumer: bool,
    config: bool,
    raft: bool,
}

/// Drives one capture: discovers servers and accounts through `T`, then
/// stores every configured endpoint response in a [`Writer`].
///
/// Individual bad responses are logged and skipped. The run stops on archive
/// errors and on discovery failures. The writer is left open for the caller
/// to close.
pub struct Gatherer<T: Transport> {
    transport: T,
    config: GatherConfig,
    log: String,
    summary: GatherSummary,
    servers: BTreeMap<String, ServerInfo>,
    // account name -> number of servers reporting it
    accounts: BTreeMap<String, usize>,
}

impl<T: Transport> Gatherer<T> {
    pub fn new(transport: T, config: GatherConfig) -> Self {
        Self {
            transport,
            config,
            log: String::new(),
            summary: GatherSummary::default(),
            servers: BTreeMap::new(),
            accounts: BTreeMap::new(),
        }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Runs every enabled step, then stores the capture log sideband.
    pub fn run<C: ContainerWriter>(
        &mut self,
        writer: &mut Writer<C>,
    ) -> Result<GatherSummary, GatherError> {
        let outcome = self.run_steps(writer);
        let log = std::mem::take(&mut self.log);
        if let Err(err) = writer.add_sideband(Sideband::CaptureLog, log.as_bytes()) {
            tracing::warn!(error = %err, "failed to add capture log to archive");
            if outcome.is_ok() {
                return Err(err.into());
            }
        }
        outcome.map(|()| self.summary.clone())
    }

    fn run_steps<C: ContainerWriter>(&mut self, writer: &mut Writer<C>) -> Result<(), GatherError> {
        self.capture_metadata(writer)?;
        self.discover_servers()?;
        self.discover_accounts()?;

        if self.config.capture_server_endpoints {
            self.capture_server_endpoints(writer)?;
        } else {
            self.progress("Skipping server endpoints data gathering".to_string());
        }
        if self.config.capture_profiles {
            self.capture_profiles(writer)?;
        } else {
            self.progress("Skipping server profiles gathering".to_string());
        }
        if self.config.capture_account_endpoints {
            self.capture_account_endpoints(writer)?;
        } else {
            self.progress("Skipping account endpoints data gathering".to_string());
        }
        if self.config.capture_streams {
            self.capture_streams(writer)?;
        } else {
            self.progress("Skipping streams data gathering".to_string());
        }
        Ok(())
    }

    fn capture_metadata<C: ContainerWriter>(&mut self, writer: &mut Writer<C>) -> Result<(), GatherError> {
        let connection = self.transport.connection_info();
        let metadata = CaptureMetadata {
            timestamp: Utc::now(),
            connected_server_name: connection.server_name,
            connected_server_version: connection.server_version,
            connect_url: connection.url,
            user_name: current_user_name(),
            tool_version: self.config.tool_version.clone(),
        };
        writer.add_capture_metadata(&metadata)?;
        Ok(())
    }

    fn discover_servers(&mut self) -> Result<(), GatherError> {
        self.progress("Broadcasting PING to discover servers".to_string());
        let replies = self.transport.request(SERVER_PING, None, None)?;
        for reply in replies {
            let response = match decode_envelope(SERVER_PING, &reply) {
                Ok(response) => response,
                Err(err) => {
                    self.warning(format!("Failed to deserialize PING response: {err}"));
                    continue;
                }
            };
            let server = response.server;
            if self.servers.contains_key(&server.id) {
                self.warning(format!(
                    "Duplicate server {} ({}) response to PING, ignoring",
                    server.id, server.name
                ));
                continue;
            }
            self.progress(format!("Discovered server '{}' ({})", server.name, server.id));
            self.servers.insert(server.id.clone(), server);
        }
        self.summary.servers = self.servers.len();
        self.progress(format!("Discovered {} servers", self.servers.len()));
        Ok(())
    }

    fn discover_accounts(&mut self) -> Result<(), GatherError> {
        self.progress("Broadcasting PING to discover accounts".to_string());
        let replies = self
            .transport
            .request(ACCOUNTZ_PING, None, Some(self.servers.len()))?;

        for reply in replies {
            let Some((server, data)) = self.known_server_data(ACCOUNTZ_PING, &reply) else {
                continue;
            };
            let accountz: Accountz = match serde_json::from_str(&data) {
                Ok(accountz) => accountz,
                Err(err) => {
                    self.warning(format!("Failed to deserialize PING.ACCOUNTZ response: {err}"));
                    continue;
                }
            };

            self.progress(format!(
                "Discovered {} accounts on server {}",
                accountz.accounts.len(),
                server.name
            ));
            for account in accountz.accounts {
                *self.accounts.entry(account).or_default() += 1;
            }

            let system_account = accountz.system_account;
            if system_account.is_empty() {
                self.warning(format!("Server {} system account is not set", server.name));
                continue;
            }
            match self.summary.system_account.clone() {
                None => {
                    self.progress(format!("Discovered system account name: {system_account}"));
                    self.summary.system_account = Some(system_account);
                }
                Some(known) if known != system_account => {
                    self.warning(format!(
                        "Multiple system accounts detected ({known}, {system_account})"
                    ));
                }
                Some(_) => {}
            }
        }

        self.summary.accounts = self.accounts.len();
        self.progress(format!(
            "Discovered {} accounts over {} servers",
            self.accounts.len(),
            self.servers.len()
        ));
        Ok(())
    }

    fn capture_server_endpoints<C: ContainerWriter>(
        &mut self,
        writer: &mut Writer<C>,
    ) -> Result<(), GatherError> {
        self.progress(format!(
            "Querying {} endpoints on {} known servers",
            self.config.server_endpoints.len(),
            self.servers.len()
        ));
        let servers: Vec<ServerInfo> = self.servers.values().cloned().collect();
        let endpoints = self.config.server_endpoints.clone();

        for server in &servers {
            for endpoint in &endpoints {
                let subject = server_subject(&server.id, &endpoint.api_suffix);
                let Some(data) = self.single_reply_data(&subject, None, &endpoint.api_suffix, server) else {
                    continue;
                };
                let document = match endpoint.kind.capture(&data) {
                    Ok(document) => document,
                    Err(err) => {
                        self.warning(format!(
                            "Failed to deserialize {} response data from server {}: {err}",
                            endpoint.api_suffix, server.name
                        ));
                        continue;
                    }
                };

                let tags = [
                    Tag::server(&server.name),
                    Tag::artifact_type(&endpoint.artifact_type),
                    cluster_tag(server.cluster_name()),
                ];
                writer.add(&document, &tags)?;
                self.summary.server_responses += 1;
            }
        }

        self.progress(format!(
            "Captured {} endpoint responses from {} servers",
            self.summary.server_responses,
            servers.len()
        ));
        Ok(())
    }

    fn capture_profiles<C: ContainerWriter>(&mut self, writer: &mut Writer<C>) -> Result<(), GatherError> {
        self.progress(format!(
            "Querying {} profiles on {} known servers",
            self.config.profile_types.len(),
            self.servers.len()
        ));
        let servers: Vec<ServerInfo> = self.servers.values().cloned().collect();
        let profile_types = self.config.profile_types.clone();

        for server in &servers {
            for profile_type in &profile_types {
                let subject = server_subject(&server.id, "PROFILEZ");
                let payload = serde_json::to_vec(&ProfilezOptions {
                    name: profile_type,
                    debug: 0,
                })
                .map_err(|source| GatherError::Encode {
                    subject: subject.clone(),
                    source,
                })?;
                let Some(data) = self.single_reply_data(&subject, Some(&payload), "PROFILEZ", server) else {
                    continue;
                };

                let status: ProfilezStatus = match serde_json::from_str(&data) {
                    Ok(status) => status,
                    Err(err) => {
                        self.warning(format!(
                            "Failed to deserialize PROFILEZ response from server {}: {err}",
                            server.name
                        ));
                        continue;
                    }
                };
                if !status.error.is_empty() {
                    self.warning(format!(
                        "Failed to retrieve profile {profile_type} from server {}: {}",
                        server.name, status.error
                    ));
                    continue;
                }
                let profile = match status.decode_profile() {
                    Ok(profile) => profile,
                    Err(err) => {
                        self.warning(format!(
                            "Failed to decode profile {profile_type} from server {}: {err}",
                            server.name
                        ));
                        continue;
                    }
                };

                let tags = [
                    Tag::server(&server.name),
                    Tag::server_profile(),
                    Tag::profile_name(profile_type),
                    cluster_tag(server.cluster_name()),
                ];
                writer.add_raw(profile.as_slice(), &tags)?;
                self.summary.profiles += 1;
            }
        }

        self.progress(format!(
            "Captured {} server profiles from {} servers",
            self.summary.profiles,
            servers.len()
        ));
        Ok(())
    }

    fn capture_account_endpoints<C: ContainerWriter>(
        &mut self,
        writer: &mut Writer<C>,
    ) -> Result<(), GatherError> {
        self.progress(format!(
            "Querying {} endpoints for {} known accounts",
            self.config.account_endpoints.len(),
            self.accounts.len()
        ));
        let accounts: Vec<(String, usize)> =
            self.accounts.iter().map(|(name, count)| (name.clone(), *count)).collect();
        let endpoints = self.config.account_endpoints.clone();

        for (account, servers_count) in &accounts {
            for endpoint in &endpoints {
                let responses = self.collect_account_endpoint(account, *servers_count, endpoint);
                for (server, document) in responses.into_values() {
                    let tags = [
                        Tag::account(account),
                        Tag::server(&server.name),
                        Tag::artifact_type(&endpoint.artifact_type),
                        cluster_tag(server.cluster_name()),
                    ];
                    writer.add(&document, &tags)?;
                    self.summary.account_responses += 1;
                }
            }
        }

        self.progress(format!(
            "Captured {} endpoint responses from {} accounts",
            self.summary.account_responses,
            accounts.len()
        ));
        Ok(())
    }

    /// One response per known server for an account endpoint, keyed by server name.
    fn collect_account_endpoint(
        &mut self,
        account: &str,
        servers_count: usize,
        endpoint: &EndpointCapture,
    ) -> BTreeMap<String, (ServerInfo, Value)> {
        let subject = account_subject(account, &endpoint.api_suffix);
        let mut responses = BTreeMap::new();
        let replies = match self.transport.request(&subject, None, Some(servers_count)) {
            Ok(replies) => replies,
            Err(err) => {
                self.warning(format!(
                    "Failed to request {} for account {account}: {err}",
                    endpoint.api_suffix
                ));
                return responses;
            }
        };

        for reply in replies {
            let Some((server, data)) = self.known_server_data(&subject, &reply) else {
                continue;
            };
            let document = match endpoint.kind.capture(&data) {
                Ok(document) => document,
                Err(err) => {
                    self.warning(format!(
                        "Failed to deserialize ACCOUNT.{} response for account {account}: {err}",
                        endpoint.api_suffix
                    ));
                    continue;
                }
            };
            if responses.contains_key(&server.name) {
                self.warning(format!(
                    "Ignoring duplicate ACCOUNT.{} response from server {}",
                    endpoint.api_suffix, server.name
                ));
                continue;
            }
            responses.insert(server.name.clone(), (server, document));
        }
        responses
    }

    fn capture_streams<C: ContainerWriter>(&mut self, writer: &mut Writer<C>) -> Result<(), GatherError> {
        self.progress("Gathering streams data".to_string());
        let accounts: Vec<(String, usize)> =
            self.accounts.iter().map(|(name, count)| (name.clone(), *count)).collect();

        for (account, servers_count) in &accounts {
            if self.summary.system_account.as_deref() == Some(account.as_str()) {
                continue;
            }

            let reports = self.collect_stream_reports(account, *servers_count);
            let mut streams_seen: Vec<String> = Vec::new();

            for (server_name, streams) in reports {
                for stream in streams {
                    if !streams_seen.contains(&stream.name) {
                        self.progress(format!("Discovered stream {} in account {account}", stream.name));
                        streams_seen.push(stream.name.clone());
                    }
                    let tags = [
                        Tag::account(account),
                        Tag::server(&server_name),
                        Tag::stream_details(),
                        Tag::stream(&stream.name),
                        cluster_tag(stream.cluster.as_deref()),
                    ];
                    writer.add(&stream.document, &tags)?;
                }
            }

            self.progress(format!(
                "Discovered {} streams in account {account}",
                streams_seen.len()
            ));
            self.summary.streams += streams_seen.len();
        }

        self.progress(format!(
            "Discovered {} streams in {} accounts",
            self.summary.streams,
            accounts.len()
        ));
        Ok(())
    }

    /// Stream details from the JetStream reports scoped to `account`, keyed by
    /// the reporting server.
    fn collect_stream_reports(
        &mut self,
        account: &str,
        servers_count: usize,
    ) -> BTreeMap<String, Vec<StreamReport>> {
        let mut reports = BTreeMap::new();
        let options = JszOptions {
            account,
            streams: true,
            consumer: self.config.capture_consumers,
            config: true,
            raft: true,
        };
        let payload = match serde_json::to_vec(&options) {
            Ok(payload) => payload,
            Err(err) => {
                self.warning(format!("Failed to encode JSZ options for account {account}: {err}"));
                return reports;
            }
        };
        let replies = match self
            .transport
            .request(JSZ_PING, Some(&payload), Some(servers_count))
        {
            Ok(replies) => replies,
            Err(err) => {
                self.warning(format!("Failed to request JSZ for account {account}: {err}"));
                return reports;
            }
        };

        for reply in replies {
            let Some((server, data)) = self.known_server_data(JSZ_PING, &reply) else {
                continue;
            };
            if reports.contains_key(&server.name) {
                self.warning(format!(
                    "Ignoring duplicate JSZ response for account {account} from server {}",
                    server.name
                ));
                continue;
            }
            let streams = match stream_reports(&data) {
                Ok(Some(streams)) => streams,
                // Servers answer with every account when the requested one is unknown to them.
                Ok(None) => continue,
                Err(err) => {
                    self.warning(format!(
                        "Failed to deserialize JSZ response data for account {account}: {err}"
                    ));
                    continue;
                }
            };
            reports.insert(server.name, streams);
        }
        reports
    }

    /// Sends a request expecting exactly one reply and returns its `data` document.
    fn single_reply_data(
        &mut self,
        subject: &str,
        payload: Option<&[u8]>,
        label: &str,
        server: &ServerInfo,
    ) -> Option<String> {
        let replies = match self.transport.request(subject, payload, Some(1)) {
            Ok(replies) => replies,
            Err(err) => {
                self.warning(format!("Failed to request {label} from server {}: {err}", server.name));
                return None;
            }
        };
        let [reply] = replies.as_slice() else {
            self.warning(format!(
                "Unexpected number of responses to {label} from server {}: {}",
                server.name,
                replies.len()
            ));
            return None;
        };
        let response = match decode_envelope(subject, reply) {
            Ok(response) => response,
            Err(err) => {
                self.warning(format!("Failed to deserialize {label} response from server {}: {err}", server.name));
                return None;
            }
        };
        self.envelope_data(label, &server.name, response)
    }

    /// Decodes a broadcast reply, dropping it unless it comes from a discovered server.
    fn known_server_data(&mut self, subject: &str, reply: &[u8]) -> Option<(ServerInfo, String)> {
        let response = match decode_envelope(subject, reply) {
            Ok(response) => response,
            Err(err) => {
                self.warning(err.to_string());
                return None;
            }
        };
        let Some(server) = self.servers.get(&response.server.id).cloned() else {
            self.warning(format!(
                "Ignoring {subject} response from unknown server: {}",
                response.server.name
            ));
            return None;
        };
        let data = self.envelope_data(subject, &server.name, response)?;
        Some((server, data))
    }

    fn envelope_data(&mut self, label: &str, server_name: &str, response: ApiResponse) -> Option<String> {
        if let Some(error) = response.error {
            self.warning(format!(
                "Server {server_name} returned an error for {label}: {}",
                error.description
            ));
            return None;
        }
        match response.data {
            Some(data) => Some(data.get().to_string()),
            None => {
                self.warning(format!("Empty {label} response from server {server_name}"));
                None
            }
        }
    }

    fn progress(&mut self, message: String) {
        tracing::info!("{message}");
        let _ = writeln!(self.log, "{message}");
    }

    fn warning(&mut self, message: String) {
        tracing::warn!("{message}");
        let _ = writeln!(self.log, "WARNING: {message}");
        self.summary.warnings += 1;
    }
}

/// One replica's stream detail, stored as the server sent it.
struct StreamReport {
    name: String,
    cluster: Option<String>,
    document: Value,
}

/// Splits an account-scoped JSZ document into its stream details. `None`
/// unless the document describes exactly one account.
fn stream_reports(data: &str) -> serde_json::Result<Option<Vec<StreamReport>>> {
    let info: JsInfo = serde_json::from_str(data)?;
    let [details] = info.account_details.as_slice() else {
        return Ok(None);
    };
    let mut sent: Value = serde_json::from_str(data)?;
    let raw = match sent
        .get_mut("account_details")
        .and_then(|accounts| accounts.get_mut(0))
        .and_then(|account| account.get_mut("stream_detail"))
        .map(Value::take)
    {
        Some(Value::Array(raw)) => raw,
        _ => Vec::new(),
    };
    let streams = details
        .stream_detail
        .iter()
        .zip(raw)
        .map(|(stream, document)| StreamReport {
            name: stream.name.clone(),
            cluster: stream.cluster_name().map(str::to_string),
            document,
        })
        .collect();
    Ok(Some(streams))
}

fn decode_envelope(subject: &str, reply: &[u8]) -> Result<ApiResponse, GatherError> {
    serde_json::from_slice(reply).map_err(|source| GatherError::Decode {
        subject: subject.to_string(),
        source,
    })
}

fn cluster_tag(cluster: Option<&str>) -> Tag {
    match cluster {
        Some(name) => Tag::cluster(name),
        None => Tag::no_cluster(),
    }
}

fn current_user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "?".to_string())
}
