//! Tag model and the naming scheme that maps a tag set to an archive path.
//!
//! Every artifact in a capture is classified by a small set of dimension tags
//! (`server`, `cluster`, `account`, `stream`, `artifact_type`, `profile_name`).
//! [`name_for`] turns such a set into a hierarchical path:
//!
//! ```text
//! capture/clusters/<cluster>/<server>/<type>.json
//! capture/accounts/<account>/servers/<cluster>__<server>/<type>.json
//! capture/accounts/<account>/streams/<stream>/replicas/<cluster>__<server>/<type>.json
//! capture/profiles/<cluster>/<server>__<profile_name>.prof
//! capture/manifest.json
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

pub const ROOT_PREFIX: &str = "capture/";
pub const MANIFEST_PATH: &str = "capture/manifest.json";
/// Cluster value used for servers that are not part of a cluster.
pub const NO_CLUSTER: &str = "unclustered";

const SEPARATOR: &str = "__";
const DATA_EXTENSION: &str = ".json";
const PROFILE_EXTENSION: &str = ".prof";

/// Values of the `artifact_type` dimension.
pub mod artifact {
    // Server artifacts
    pub const HEALTH: &str = "health";
    pub const VARIABLES: &str = "variables";
    pub const CONNECTIONS: &str = "connections";
    pub const ROUTES: &str = "routes";
    pub const GATEWAYS: &str = "gateways";
    pub const LEAFS: &str = "leafs";
    pub const SUBS: &str = "subs";
    pub const JETSTREAM: &str = "jetstream_info";
    pub const ACCOUNTS: &str = "accounts";
    // Account artifacts
    pub const ACCOUNT_CONNECTIONS: &str = "account_connections";
    pub const ACCOUNT_LEAFS: &str = "account_leafs";
    pub const ACCOUNT_SUBS: &str = "account_subs";
    pub const ACCOUNT_JETSTREAM: &str = "account_jetstream_info";
    pub const ACCOUNT_INFO: &str = "account_info";
    pub const STREAM_DETAILS: &str = "stream_info";
    // Other artifacts
    pub const PROFILE: &str = "profile";
    pub(crate) const MANIFEST: &str = "manifest";
}

/// The closed set of dimensions an artifact can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagLabel {
    Server,
    Cluster,
    Account,
    Stream,
    ArtifactType,
    ProfileName,
}

impl TagLabel {
    pub const ALL: [TagLabel; 6] = [
        TagLabel::Server,
        TagLabel::Cluster,
        TagLabel::Account,
        TagLabel::Stream,
        TagLabel::ArtifactType,
        TagLabel::ProfileName,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TagLabel::Server => "server",
            TagLabel::Cluster => "cluster",
            TagLabel::Account => "account",
            TagLabel::Stream => "stream",
            TagLabel::ArtifactType => "artifact_type",
            TagLabel::ProfileName => "profile_name",
        }
    }
}

impl fmt::Display for TagLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable `(label, value)` classifier attached to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Name")]
    name: TagLabel,
    #[serde(rename = "Value")]
    value: String,
}

impl Tag {
    #[must_use]
    pub fn new(name: TagLabel, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> TagLabel {
        self.name
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn server(server_name: impl Into<String>) -> Self {
        Self::new(TagLabel::Server, server_name)
    }

    pub fn cluster(cluster_name: impl Into<String>) -> Self {
        Self::new(TagLabel::Cluster, cluster_name)
    }

    /// Cluster tag for servers that do not belong to a cluster.
    #[must_use]
    pub fn no_cluster() -> Self {
        Self::new(TagLabel::Cluster, NO_CLUSTER)
    }

    pub fn account(account_name: impl Into<String>) -> Self {
        Self::new(TagLabel::Account, account_name)
    }

    pub fn stream(stream_name: impl Into<String>) -> Self {
        Self::new(TagLabel::Stream, stream_name)
    }

    pub fn artifact_type(artifact_type: impl Into<String>) -> Self {
        Self::new(TagLabel::ArtifactType, artifact_type)
    }

    pub fn profile_name(profile_type: impl Into<String>) -> Self {
        Self::new(TagLabel::ProfileName, profile_type)
    }

    #[must_use]
    pub fn health() -> Self {
        Self::artifact_type(artifact::HEALTH)
    }

    #[must_use]
    pub fn server_vars() -> Self {
        Self::artifact_type(artifact::VARIABLES)
    }

    #[must_use]
    pub fn connections() -> Self {
        Self::artifact_type(artifact::CONNECTIONS)
    }

    #[must_use]
    pub fn routes() -> Self {
        Self::artifact_type(artifact::ROUTES)
    }

    #[must_use]
    pub fn gateways() -> Self {
        Self::artifact_type(artifact::GATEWAYS)
    }

    #[must_use]
    pub fn leafs() -> Self {
        Self::artifact_type(artifact::LEAFS)
    }

    #[must_use]
    pub fn subs() -> Self {
        Self::artifact_type(artifact::SUBS)
    }

    #[must_use]
    pub fn jetstream() -> Self {
        Self::artifact_type(artifact::JETSTREAM)
    }

    #[must_use]
    pub fn accounts() -> Self {
        Self::artifact_type(artifact::ACCOUNTS)
    }

    #[must_use]
    pub fn account_connections() -> Self {
        Self::artifact_type(artifact::ACCOUNT_CONNECTIONS)
    }

    #[must_use]
    pub fn account_leafs() -> Self {
        Self::artifact_type(artifact::ACCOUNT_LEAFS)
    }

    #[must_use]
    pub fn account_subs() -> Self {
        Self::artifact_type(artifact::ACCOUNT_SUBS)
    }

    #[must_use]
    pub fn account_jetstream() -> Self {
        Self::artifact_type(artifact::ACCOUNT_JETSTREAM)
    }

    #[must_use]
    pub fn account_info() -> Self {
        Self::artifact_type(artifact::ACCOUNT_INFO)
    }

    #[must_use]
    pub fn stream_details() -> Self {
        Self::artifact_type(artifact::STREAM_DETAILS)
    }

    #[must_use]
    pub fn server_profile() -> Self {
        Self::artifact_type(artifact::PROFILE)
    }

    pub(crate) fn manifest() -> Self {
        Self::artifact_type(artifact::MANIFEST)
    }

    fn is_manifest_sentinel(&self) -> bool {
        self.name == TagLabel::ArtifactType && self.value == artifact::MANIFEST
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Renders a tag list as `a=1, b=2` for error messages and logs.
pub(crate) fn describe(tags: &[Tag]) -> String {
    tags.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// At most one value per dimension, borrowed from the input tags.
#[derive(Default)]
struct Dimensions<'a> {
    server: Option<&'a str>,
    cluster: Option<&'a str>,
    account: Option<&'a str>,
    stream: Option<&'a str>,
    artifact_type: Option<&'a str>,
    profile_name: Option<&'a str>,
}

impl<'a> Dimensions<'a> {
    fn collect(tags: &'a [Tag]) -> Result<Self> {
        let mut dims = Self::default();
        for tag in tags {
            if tag.is_manifest_sentinel() {
                return Err(ArchiveError::SpecialTagCombined { label: tag.name });
            }
            let slot = match tag.name {
                TagLabel::Server => &mut dims.server,
                TagLabel::Cluster => &mut dims.cluster,
                TagLabel::Account => &mut dims.account,
                TagLabel::Stream => &mut dims.stream,
                TagLabel::ArtifactType => &mut dims.artifact_type,
                TagLabel::ProfileName => &mut dims.profile_name,
            };
            if slot.is_some() {
                return Err(ArchiveError::MultipleValues { label: tag.name });
            }
            *slot = Some(tag.value.as_str());
        }
        Ok(dims)
    }
}

fn required(value: Option<&str>, label: TagLabel) -> Result<&str> {
    value.ok_or(ArchiveError::MissingRequiredTag { label })
}

/// Computes the canonical archive path for an artifact with the given tags.
///
/// The result depends only on the set of tags, never on their order.
///
/// Profiles are stricter than the other artifact types: a `profile` tagged
/// with an account or stream is rejected with `IncompatibleTags` instead of
/// being placed under the account tree, and a profile name on any other
/// artifact type is rejected the same way.
pub fn name_for(tags: &[Tag]) -> Result<String> {
    match tags {
        [] => return Err(ArchiveError::EmptyTags),
        [only] if only.is_manifest_sentinel() => return Ok(MANIFEST_PATH.to_string()),
        _ => {}
    }

    let dims = Dimensions::collect(tags)?;

    let kind = required(dims.artifact_type, TagLabel::ArtifactType)?;
    let server = required(dims.server, TagLabel::Server)?;
    let is_profile = kind == artifact::PROFILE;

    if dims.profile_name.is_some() && !is_profile {
        return Err(ArchiveError::IncompatibleTags {
            reason: format!("profile name is only valid on '{}' artifacts", artifact::PROFILE)
                .into(),
        });
    }
    if is_profile && (dims.account.is_some() || dims.stream.is_some()) {
        return Err(ArchiveError::IncompatibleTags {
            reason: "profile artifacts cannot be tagged with an account or stream".into(),
        });
    }

    let name = if let Some(stream) = dims.stream {
        let account = required(dims.account, TagLabel::Account)?;
        let cluster = required(dims.cluster, TagLabel::Cluster)?;
        format!(
            "accounts/{account}/streams/{stream}/replicas/{cluster}{SEPARATOR}{server}/{kind}{DATA_EXTENSION}"
        )
    } else if let Some(account) = dims.account {
        let cluster = dims.cluster.unwrap_or(NO_CLUSTER);
        format!("accounts/{account}/servers/{cluster}{SEPARATOR}{server}/{kind}{DATA_EXTENSION}")
    } else if is_profile {
        let cluster = dims.cluster.unwrap_or(NO_CLUSTER);
        let profile_name = required(dims.profile_name, TagLabel::ProfileName)?;
        format!("profiles/{cluster}/{server}{SEPARATOR}{profile_name}{PROFILE_EXTENSION}")
    } else {
        let cluster = dims.cluster.unwrap_or(NO_CLUSTER);
        format!("clusters/{cluster}/{server}/{kind}{DATA_EXTENSION}")
    };

    Ok(format!("{ROOT_PREFIX}{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Case {
        name: &'static str,
        tags: Vec<Tag>,
        want: Option<&'static str>,
    }

    fn cases() -> Vec<Case> {
        vec![
            Case {
                name: "server health",
                tags: vec![Tag::cluster("C1"), Tag::server("S1"), Tag::health()],
                want: Some("capture/clusters/C1/S1/health.json"),
            },
            Case {
                name: "server vars",
                tags: vec![Tag::cluster("C1"), Tag::server("S1"), Tag::server_vars()],
                want: Some("capture/clusters/C1/S1/variables.json"),
            },
            Case {
                name: "server without cluster",
                tags: vec![Tag::server("S1"), Tag::health()],
                want: Some("capture/clusters/unclustered/S1/health.json"),
            },
            Case {
                name: "server profile",
                tags: vec![
                    Tag::cluster("C1"),
                    Tag::server("S1"),
                    Tag::server_profile(),
                    Tag::profile_name("heap"),
                ],
                want: Some("capture/profiles/C1/S1__heap.prof"),
            },
            Case {
                name: "server profile with missing name",
                tags: vec![Tag::cluster("C1"), Tag::server("S1"), Tag::server_profile()],
                want: None,
            },
            Case {
                name: "profile tagged with an account",
                tags: vec![
                    Tag::account("A1"),
                    Tag::server("S1"),
                    Tag::server_profile(),
                    Tag::profile_name("heap"),
                ],
                want: None,
            },
            Case {
                name: "profile name on a non-profile artifact",
                tags: vec![Tag::server("S1"), Tag::health(), Tag::profile_name("heap")],
                want: None,
            },
            Case {
                name: "account info",
                tags: vec![
                    Tag::account("A1"),
                    Tag::cluster("C1"),
                    Tag::server("S1"),
                    Tag::account_info(),
                ],
                want: Some("capture/accounts/A1/servers/C1__S1/account_info.json"),
            },
            Case {
                name: "account info without cluster",
                tags: vec![Tag::account("A1"), Tag::server("S1"), Tag::account_info()],
                want: Some("capture/accounts/A1/servers/unclustered__S1/account_info.json"),
            },
            Case {
                name: "account connections without source server",
                tags: vec![Tag::account("A1"), Tag::account_connections()],
                want: None,
            },
            Case {
                name: "stream info",
                tags: vec![
                    Tag::account("A1"),
                    Tag::stream("ORDERS"),
                    Tag::server("S1"),
                    Tag::cluster("C1"),
                    Tag::stream_details(),
                ],
                want: Some("capture/accounts/A1/streams/ORDERS/replicas/C1__S1/stream_info.json"),
            },
            Case {
                name: "stream info without type",
                tags: vec![
                    Tag::account("A1"),
                    Tag::stream("ORDERS"),
                    Tag::cluster("C1"),
                    Tag::server("S1"),
                ],
                want: None,
            },
            Case {
                name: "stream info without source server",
                tags: vec![
                    Tag::account("A1"),
                    Tag::stream("ORDERS"),
                    Tag::cluster("C1"),
                    Tag::stream_details(),
                ],
                want: None,
            },
            Case {
                name: "stream info without account",
                tags: vec![
                    Tag::server("S1"),
                    Tag::stream("ORDERS"),
                    Tag::no_cluster(),
                    Tag::stream_details(),
                ],
                want: None,
            },
            Case {
                name: "stream info without cluster",
                tags: vec![
                    Tag::account("A1"),
                    Tag::server("S1"),
                    Tag::stream("ORDERS"),
                    Tag::stream_details(),
                ],
                want: None,
            },
            Case {
                name: "manifest",
                tags: vec![Tag::manifest()],
                want: Some(MANIFEST_PATH),
            },
            Case {
                name: "manifest with other tag",
                tags: vec![Tag::manifest(), Tag::server("S1")],
                want: None,
            },
            Case {
                name: "no tags",
                tags: vec![],
                want: None,
            },
        ]
    }

    #[test]
    fn name_for_table() {
        for case in cases() {
            let got = name_for(&case.tags);
            match (case.want, got) {
                (Some(want), Ok(got)) => assert_eq!(got, want, "case '{}'", case.name),
                (None, Err(_)) => {}
                (want, got) => panic!("case '{}': want {want:?}, got {got:?}", case.name),
            }
        }
    }

    #[test]
    fn name_is_independent_of_tag_order() {
        let tags = vec![
            Tag::account("A1"),
            Tag::stream("ORDERS"),
            Tag::cluster("C2"),
            Tag::server("B"),
            Tag::stream_details(),
        ];
        let expected = name_for(&tags).unwrap();

        let mut rotated = tags.clone();
        for _ in 0..tags.len() {
            rotated.rotate_left(1);
            assert_eq!(name_for(&rotated).unwrap(), expected);
        }
        let mut reversed = tags;
        reversed.reverse();
        assert_eq!(name_for(&reversed).unwrap(), expected);
    }

    #[test]
    fn duplicate_dimension_is_rejected() {
        for label in TagLabel::ALL {
            let mut tags = vec![
                Tag::cluster("C1"),
                Tag::server("S1"),
                Tag::account("A1"),
                Tag::stream("ORDERS"),
                Tag::stream_details(),
                Tag::profile_name("heap"),
            ];
            tags.push(Tag::new(label, "other"));
            let err = name_for(&tags).unwrap_err();
            assert!(
                matches!(err, ArchiveError::MultipleValues { label: l } if l == label),
                "label {label}: unexpected {err:?}"
            );
        }
    }

    #[test]
    fn missing_required_dimension_is_named() {
        let err = name_for(&[Tag::cluster("C1"), Tag::health()]).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MissingRequiredTag {
                label: TagLabel::Server
            }
        ));

        let err = name_for(&[Tag::cluster("C1"), Tag::server("S1")]).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MissingRequiredTag {
                label: TagLabel::ArtifactType
            }
        ));
    }

    #[test]
    fn tag_serializes_with_manifest_field_names() {
        let json = serde_json::to_string(&Tag::cluster("C1")).unwrap();
        assert_eq!(json, r#"{"Name":"cluster","Value":"C1"}"#);

        let tag: Tag = serde_json::from_str(r#"{"Name":"artifact_type","Value":"health"}"#).unwrap();
        assert_eq!(tag, Tag::health());

        assert!(serde_json::from_str::<Tag>(r#"{"Name":"color","Value":"red"}"#).is_err());
    }
}
