//! The analyzer checks, run in the order of [`CHECKS`].
//!
//! Each check walks the archive's derived topology, loads the artifacts it
//! needs, and records examples of whatever looks wrong. Missing artifacts are
//! reported and skipped; any other archive error ends the check.

use std::collections::BTreeMap;

use clustercap_core::model::{AccountInfo, Gatewayz, HealthStatus, JsInfo, Routez, StreamDetail, Varz};
use clustercap_core::{ArchiveError, Tag};

use crate::{Check, CheckRun, CheckStatus};

pub(crate) const CHECKS: [Check; 13] = [
    Check { name: "Server health", run: check_server_health },
    Check { name: "Uniform server version", run: check_server_versions },
    Check { name: "Slow consumers", run: check_slow_consumers },
    Check { name: "Cluster memory usage", run: check_cluster_memory_usage },
    Check { name: "Lagging stream replicas", run: check_lagging_stream_replicas },
    Check { name: "CPU usage", run: check_cpu_usage },
    Check { name: "High cardinality streams", run: check_high_cardinality_streams },
    Check { name: "High number of HA assets", run: check_ha_assets },
    Check { name: "Reserved resources usage", run: check_reserved_resources },
    Check { name: "Account limits", run: check_account_limits },
    Check { name: "Stream limits", run: check_stream_limits },
    Check { name: "Meta cluster state", run: check_meta_cluster },
    Check { name: "Routes and gateways", run: check_routes_and_gateways },
];

const MIB: u64 = 1024 * 1024;

/// Formats a byte count with binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Fraction of `limit` used by `actual`, or `None` when the limit is
/// disabled (0) or unlimited (-1).
fn limit_usage(limit: i64, actual: i64) -> Option<f64> {
    if limit == 0 || limit == -1 {
        return None;
    }
    Some(1.0 - (limit - actual) as f64 / limit as f64)
}

fn check_server_health(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let (mut healthy, mut unhealthy) = (0, 0);

    for server_tag in reader.list_server_tags() {
        let server = server_tag.value().to_string();
        let query = [server_tag, Tag::health()];
        let Some(health) = run.load_or_warn::<HealthStatus>(&query, || {
            format!("Artifact 'HEALTHZ' is missing for server {server}")
        })?
        else {
            continue;
        };

        if health.is_ok() {
            healthy += 1;
        } else {
            run.examples
                .add(format!("{server}: {} - {}", health.status_code, health.status));
            unhealthy += 1;
        }
    }

    if unhealthy > 0 {
        run.issue(format!(
            "{unhealthy}/{} servers are not healthy",
            healthy + unhealthy
        ));
        return Ok(CheckStatus::SomeIssues);
    }
    run.info(format!("{healthy}/{healthy} servers are healthy"));
    Ok(CheckStatus::Pass)
}

fn check_server_versions(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let mut versions: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for server_tag in reader.list_server_tags() {
        let server = server_tag.value().to_string();
        let query = [server_tag, Tag::server_vars()];
        let Some(varz) = run.load_or_warn::<Varz>(&query, || {
            format!("Artifact 'VARZ' is missing for server {server}")
        })?
        else {
            continue;
        };
        versions.entry(varz.version).or_default().push(server);
    }

    match versions.len() {
        0 => {
            run.info("No server variables found");
            Ok(CheckStatus::Pass)
        }
        1 => {
            if let Some(version) = versions.keys().next() {
                run.info(format!("All servers are running version {version}"));
            }
            Ok(CheckStatus::Pass)
        }
        count => {
            for (version, servers) in &versions {
                run.examples.add(format!("{version}: {}", servers.join(", ")));
            }
            run.issue(format!("Servers are running {count} different versions"));
            Ok(CheckStatus::SomeIssues)
        }
    }
}

fn check_slow_consumers(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let mut total = 0;
    let mut servers = 0;

    for server_tag in reader.list_server_tags() {
        let server = server_tag.value().to_string();
        let query = [server_tag, Tag::server_vars()];
        let Some(varz) = run.load_or_warn::<Varz>(&query, || {
            format!("Artifact 'VARZ' is missing for server {server}")
        })?
        else {
            continue;
        };
        if varz.slow_consumers > 0 {
            run.examples
                .add(format!("{server}: {} slow consumers", varz.slow_consumers));
            total += varz.slow_consumers;
            servers += 1;
        }
    }

    if total > 0 {
        run.issue(format!("Total slow consumers: {total} over {servers} servers"));
        return Ok(CheckStatus::SomeIssues);
    }
    Ok(CheckStatus::Pass)
}

fn check_cluster_memory_usage(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let outlier = run.config.memory_outlier_threshold;
    let mut clusters_with_issues = 0;

    for cluster in reader.cluster_names() {
        let mut usage: BTreeMap<String, f64> = BTreeMap::new();
        for server in reader.cluster_server_names(&cluster) {
            let query = [Tag::cluster(&cluster), Tag::server(&server), Tag::server_vars()];
            let Some(varz) = run.load_or_warn::<Varz>(&query, || {
                format!("Artifact 'VARZ' is missing for server {server} in cluster {cluster}")
            })?
            else {
                continue;
            };
            usage.insert(server, varz.mem as f64);
        }
        if usage.is_empty() {
            continue;
        }

        let mean = usage.values().sum::<f64>() / usage.len() as f64;
        let threshold = mean + mean * outlier;
        let before = run.examples.count();
        for (server, mem) in &usage {
            if *mem > threshold {
                run.examples.add(format!(
                    "Cluster {cluster} avg: {}, server {server}: {}",
                    format_bytes(mean as u64),
                    format_bytes(*mem as u64),
                ));
            }
        }
        if run.examples.count() > before {
            clusters_with_issues += 1;
        }
    }

    if clusters_with_issues > 0 {
        let count = run.examples.count();
        run.issue(format!(
            "Servers with memory usage {:.0}% above cluster average: {count} in {clusters_with_issues} clusters",
            outlier * 100.0
        ));
        return Ok(CheckStatus::SomeIssues);
    }
    Ok(CheckStatus::Pass)
}

fn check_lagging_stream_replicas(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let lag_fraction = run.config.lagging_replica_threshold;
    let accounts = reader.account_names();
    if accounts.is_empty() {
        run.info("No accounts found in archive");
    }

    let mut accounts_with_streams = 0;
    let mut streams_inspected = 0;
    let mut lagging = 0;

    for account in &accounts {
        let streams = reader.account_stream_names(account);
        if streams.is_empty() {
            run.debug(format!("No streams found in account: {account}"));
            continue;
        }
        accounts_with_streams += 1;

        for stream in &streams {
            let servers = reader.stream_server_names(account, stream);
            run.debug(format!(
                "Inspecting account '{account}' stream '{stream}', found {} servers: {servers:?}",
                servers.len()
            ));

            let mut last_seqs: BTreeMap<&str, u64> = BTreeMap::new();
            for server in &servers {
                let query = [
                    Tag::account(account),
                    Tag::stream(stream),
                    Tag::server(server),
                    Tag::stream_details(),
                ];
                let Some(detail) = run.load_or_warn::<StreamDetail>(&query, || {
                    format!("Artifact not found: stream_info for stream {stream} in account {account} by server {server}")
                })?
                else {
                    continue;
                };
                last_seqs.insert(server, detail.state.last_seq);
            }
            if last_seqs.is_empty() {
                continue;
            }
            streams_inspected += 1;

            let Some((leader, highest)) = last_seqs
                .iter()
                .max_by_key(|(_, seq)| **seq)
                .map(|(server, seq)| (*server, *seq))
            else {
                continue;
            };
            if highest == 0 {
                continue;
            }
            run.debug(format!(
                "Stream {account} / {stream} highest last sequence: {highest} @ {leader}"
            ));

            let threshold = (highest as f64 - highest as f64 * lag_fraction).max(0.0) as u64;
            for (server, last_seq) in &last_seqs {
                if *last_seq < threshold {
                    run.examples.add(format!(
                        "{account}/{stream} server {server} lastSequence: {last_seq} is behind highest lastSequence: {highest} on server: {leader}"
                    ));
                    lagging += 1;
                }
            }
        }
    }

    run.info(format!(
        "Inspected {streams_inspected} streams across {accounts_with_streams} accounts"
    ));
    if lagging > 0 {
        run.issue(format!("Found {lagging} replicas lagging behind"));
        return Ok(CheckStatus::SomeIssues);
    }
    Ok(CheckStatus::Pass)
}

fn check_cpu_usage(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let threshold = run.config.cpu_usage_threshold;

    for server_tag in reader.list_server_tags() {
        let server = server_tag.value().to_string();
        let query = [server_tag, Tag::server_vars()];
        let Some(varz) = run.load_or_warn::<Varz>(&query, || {
            format!("Artifact 'VARZ' is missing for server {server}")
        })?
        else {
            continue;
        };
        if varz.cores == 0 {
            run.debug(format!("Server {server} reports no cores"));
            continue;
        }
        // cpu is a percentage summed over all cores
        let per_core = varz.cpu / f64::from(varz.cores);
        if per_core / 100.0 > threshold {
            run.examples.add(format!("{server}: {per_core:.0}%"));
        }
    }

    Ok(run.finish("Found servers with high CPU usage"))
}

fn check_high_cardinality_streams(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let threshold = run.config.high_cardinality_subjects;

    for account in reader.account_names() {
        for stream in reader.account_stream_names(&account) {
            for server in reader.stream_server_names(&account, &stream) {
                let query = [
                    Tag::server(&server),
                    Tag::account(&account),
                    Tag::stream(&stream),
                    Tag::stream_details(),
                ];
                let Some(detail) = run.load_or_warn::<StreamDetail>(&query, || {
                    format!("Artifact 'STREAM_DETAILS' is missing for stream {stream} in account {account}")
                })?
                else {
                    continue;
                };
                if detail.state.num_subjects > threshold {
                    run.examples.add(format!(
                        "{account}/{stream}: {} subjects",
                        detail.state.num_subjects
                    ));
                    // one example per stream
                    break;
                }
            }
        }
    }

    Ok(run.finish("Found streams with high subjects cardinality"))
}

/// Loads the server-level JSZ of every clustered server, in cluster order.
fn for_each_jetstream_info(
    run: &mut CheckRun<'_>,
    mut visit: impl FnMut(&mut CheckRun<'_>, &str, JsInfo),
) -> Result<(), ArchiveError> {
    let reader = run.reader;
    for cluster_tag in reader.list_cluster_tags() {
        let cluster = cluster_tag.value().to_string();
        for server in reader.cluster_server_names(&cluster) {
            let query = [cluster_tag.clone(), Tag::server(&server), Tag::jetstream()];
            let Some(info) = run.load_or_warn::<JsInfo>(&query, || {
                format!("Artifact 'JSZ' is missing for server {server} cluster {cluster}")
            })?
            else {
                continue;
            };
            visit(run, &server, info);
        }
    }
    Ok(())
}

fn check_ha_assets(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let threshold = run.config.ha_assets_threshold;
    for_each_jetstream_info(run, |run, server, info| {
        if info.stats.ha_assets > threshold {
            run.examples
                .add(format!("{server}: {} HA assets", info.stats.ha_assets));
        }
    })?;
    Ok(run.finish("Found servers with a large amount of HA assets"))
}

fn check_reserved_resources(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let threshold = run.config.reserved_usage_threshold;
    for_each_jetstream_info(run, |run, server, info| {
        let stats = &info.stats;
        if stats.reserved_memory > 0
            && stats.memory as f64 / stats.reserved_memory as f64 > threshold
        {
            run.examples.add(format!(
                "{server} memory: usage: {}Mb, reserved: {}Mb",
                stats.memory / MIB,
                stats.reserved_memory / MIB
            ));
        }
        if stats.reserved_storage > 0
            && stats.storage as f64 / stats.reserved_storage as f64 > threshold
        {
            run.examples.add(format!(
                "{server} storage: usage: {}Mb, reserved: {}Mb",
                stats.storage / MIB,
                stats.reserved_storage / MIB
            ));
        }
    })?;
    Ok(run.finish("Found servers with high memory/storage usage"))
}

fn check_account_limits(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let thresholds = run.config.account_limits.clone();
    let servers = reader.list_server_tags();

    for account in reader.account_names() {
        let streams = reader.account_stream_names(&account).len() as i64;
        for server_tag in &servers {
            let query = [server_tag.clone(), Tag::account(&account), Tag::account_info()];
            let info = match reader.load::<AccountInfo>(&query) {
                Ok(info) => info,
                // not every server hosts every account
                Err(err) if err.is_no_matches() => {
                    run.debug(format!(
                        "Account info for {account} is missing on server {}",
                        server_tag.value()
                    ));
                    continue;
                }
                Err(err) => return Err(err),
            };
            let Some(limits) = info.limits() else {
                continue;
            };

            let checks = [
                ("Connections", thresholds.connections, limits.conn, info.client_connections),
                ("Leafnodes", thresholds.leafnodes, limits.leaf, info.leafnode_connections),
                ("Subscriptions", thresholds.subscriptions, limits.subs, info.subscriptions),
                ("Streams", thresholds.streams, limits.streams, streams),
            ];
            for (description, threshold, limit, actual) in checks {
                if limit_usage(limit, actual).is_some_and(|usage| usage > threshold) {
                    run.examples
                        .add(format!("{account} - {description}: {actual}/{limit}"));
                }
            }
        }
    }

    Ok(run.finish("Found accounts with high usage of limits"))
}

fn check_stream_limits(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;
    let thresholds = run.config.stream_limits.clone();

    for account in reader.account_names() {
        for stream in reader.account_stream_names(&account) {
            for server in reader.stream_server_names(&account, &stream) {
                let query = [
                    Tag::server(&server),
                    Tag::account(&account),
                    Tag::stream(&stream),
                    Tag::stream_details(),
                ];
                let Some(detail) = run.load_or_warn::<StreamDetail>(&query, || {
                    format!("Artifact 'STREAM_DETAILS' is missing for stream {stream} in account {account}")
                })?
                else {
                    continue;
                };
                let Some(config) = &detail.config else {
                    run.debug(format!("Stream {account}/{stream} on {server} has no config"));
                    continue;
                };

                let state = &detail.state;
                let checks = [
                    ("Messages", thresholds.messages, config.max_msgs, state.messages),
                    ("Bytes", thresholds.bytes, config.max_bytes, state.bytes),
                    ("Consumers", thresholds.consumers, config.max_consumers, state.consumer_count),
                ];
                for (description, threshold, limit, actual) in checks {
                    let actual = i64::try_from(actual).unwrap_or(i64::MAX);
                    if limit_usage(limit, actual).is_some_and(|usage| usage > threshold) {
                        run.examples.add(format!(
                            "{account}/{stream} - {description}: {actual}/{limit}"
                        ));
                    }
                }
            }
        }
    }

    Ok(run.finish("Found streams with high usage of limits"))
}

fn check_meta_cluster(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    for_each_jetstream_info(run, |run, server, info| {
        let Some(meta) = info.meta_cluster else {
            run.debug(format!(
                "Server {server} does not have meta cluster information"
            ));
            return;
        };
        for replica in &meta.replicas {
            if replica.offline {
                let role = if replica.name == meta.leader { "leader" } else { "replica" };
                run.examples
                    .add(format!("{server} reports {role} {} as offline", replica.name));
            }
            if !replica.current {
                run.examples
                    .add(format!("{server} reports replica {} as not current", replica.name));
            }
        }
    })?;
    Ok(run.finish("Found unhealthy nodes in meta cluster"))
}

fn check_routes_and_gateways(run: &mut CheckRun<'_>) -> Result<CheckStatus, ArchiveError> {
    let reader = run.reader;

    for cluster in reader.cluster_names() {
        let mut routes: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut inbound: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut outbound: BTreeMap<usize, Vec<String>> = BTreeMap::new();

        for server in reader.cluster_server_names(&cluster) {
            let query = [Tag::cluster(&cluster), Tag::server(&server), Tag::routes()];
            let routez: Routez = run
                .load_or_warn(&query, || {
                    format!("Artifact 'ROUTEZ' is missing for server {server} cluster {cluster}")
                })?
                .unwrap_or_default();
            let query = [Tag::cluster(&cluster), Tag::server(&server), Tag::gateways()];
            let gatewayz: Gatewayz = run
                .load_or_warn(&query, || {
                    format!("Artifact 'GATEWAYZ' is missing for server {server} cluster {cluster}")
                })?
                .unwrap_or_default();

            routes.entry(routez.num_routes).or_default().push(server.clone());
            inbound
                .entry(gatewayz.inbound_gateways.len())
                .or_default()
                .push(server.clone());
            outbound
                .entry(gatewayz.outbound_gateways.len())
                .or_default()
                .push(server);
        }

        let mut report = String::new();
        for (counts, what) in [
            (&routes, "routes"),
            (&inbound, "inbound gateways"),
            (&outbound, "outbound gateways"),
        ] {
            if counts.len() > 1 {
                for (count, servers) in counts {
                    report.push_str(&format!("\n     - {servers:?}: {count} {what}"));
                }
            }
        }
        if !report.is_empty() {
            run.examples.add(format!("Cluster {cluster}:{report}"));
        }
    }

    Ok(run.finish("Found nodes with inconsistent routes or gateways"))
}
