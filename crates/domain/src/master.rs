use std::net::Ipv4Addr;

use mesosync_core::{AppError, AppResult, HostPort};
use prost::Message;
use serde::Deserialize;

const PROTOBUF_NODE_PREFIX: &str = "info_";
const JSON_NODE_PREFIX: &str = "json.info_";

/// Serialization used by one participant node payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Binary protobuf `MasterInfo` (`info_<seq>` nodes).
    Protobuf,
    /// JSON `MasterInfo` (`json.info_<seq>` nodes).
    Json,
}

/// One ephemeral sequential registration node under the election path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantNode {
    name: String,
    sequence: u64,
    encoding: PayloadEncoding,
}

impl ParticipantNode {
    /// Parses a child node name.
    ///
    /// Returns `Ok(None)` for children that are not participants and an error
    /// for participant-looking names whose sequence suffix is not numeric.
    pub fn parse(name: &str) -> AppResult<Option<Self>> {
        let (suffix, encoding) = if let Some(suffix) = name.strip_prefix(JSON_NODE_PREFIX) {
            (suffix, PayloadEncoding::Json)
        } else if let Some(suffix) = name.strip_prefix(PROTOBUF_NODE_PREFIX) {
            (suffix, PayloadEncoding::Protobuf)
        } else {
            return Ok(None);
        };

        let sequence = suffix.parse::<u64>().map_err(|error| {
            AppError::Decode(format!("unexpected participant node format '{name}': {error}"))
        })?;

        Ok(Some(Self {
            name: name.to_owned(),
            sequence,
            encoding,
        }))
    }

    /// Returns the child node name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the monotonic sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the payload encoding implied by the node name.
    #[must_use]
    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }
}

/// Selects the participant with the lowest sequence number.
#[must_use]
pub fn select_leader_node(participants: &[ParticipantNode]) -> Option<&ParticipantNode> {
    participants
        .iter()
        .min_by_key(|participant| participant.sequence)
}

#[derive(Clone, PartialEq, Message)]
struct AddressProto {
    #[prost(string, optional, tag = "1")]
    hostname: Option<String>,
    #[prost(string, optional, tag = "2")]
    ip: Option<String>,
    #[prost(int32, tag = "3")]
    port: i32,
}

#[derive(Clone, PartialEq, Message)]
struct MasterInfoProto {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(uint32, tag = "2")]
    ip: u32,
    #[prost(uint32, tag = "3")]
    port: u32,
    #[prost(string, optional, tag = "4")]
    pid: Option<String>,
    #[prost(string, optional, tag = "5")]
    hostname: Option<String>,
    #[prost(message, optional, tag = "7")]
    address: Option<AddressProto>,
}

#[derive(Debug, Deserialize)]
struct AddressJson {
    hostname: Option<String>,
    ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MasterInfoJson {
    id: String,
    #[serde(default)]
    ip: u32,
    port: u32,
    pid: Option<String>,
    hostname: Option<String>,
    address: Option<AddressJson>,
}

/// Master registration payload decoded from a participant node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterInfo {
    id: String,
    packed_ip: u32,
    port: u32,
    pid: Option<String>,
    hostname: Option<String>,
    address_hostname: Option<String>,
    address_ip: Option<String>,
}

impl MasterInfo {
    /// Decodes one participant payload.
    pub fn decode(encoding: PayloadEncoding, payload: &[u8]) -> AppResult<Self> {
        match encoding {
            PayloadEncoding::Protobuf => {
                let proto = MasterInfoProto::decode(payload).map_err(|error| {
                    AppError::Decode(format!("invalid protobuf master info: {error}"))
                })?;
                let (address_hostname, address_ip) = proto
                    .address
                    .map(|address| (address.hostname, address.ip))
                    .unwrap_or_default();

                Ok(Self {
                    id: proto.id,
                    packed_ip: proto.ip,
                    port: proto.port,
                    pid: proto.pid,
                    hostname: proto.hostname,
                    address_hostname,
                    address_ip,
                })
            }
            PayloadEncoding::Json => {
                let json = serde_json::from_slice::<MasterInfoJson>(payload).map_err(|error| {
                    AppError::Decode(format!("invalid json master info: {error}"))
                })?;
                let (address_hostname, address_ip) = json
                    .address
                    .map(|address| (address.hostname, address.ip))
                    .unwrap_or_default();

                Ok(Self {
                    id: json.id,
                    packed_ip: json.ip,
                    port: json.port,
                    pid: json.pid,
                    hostname: json.hostname,
                    address_hostname,
                    address_ip,
                })
            }
        }
    }

    /// Returns the master's raw identity.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Resolves the reachable endpoint of this master.
    ///
    /// Hostname wins over the structured address, which wins over the packed
    /// IPv4 value.
    pub fn endpoint(&self) -> AppResult<HostPort> {
        let port = u16::try_from(self.port).map_err(|_| {
            AppError::Decode(format!(
                "master '{}' advertises out-of-range port {}",
                self.id, self.port
            ))
        })?;

        let host = [
            self.hostname.as_deref(),
            self.address_hostname.as_deref(),
            self.address_ip.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
        .or_else(|| (self.packed_ip != 0).then(|| unpack_ipv4(self.packed_ip).to_string()))
        .ok_or_else(|| AppError::Decode(format!("master '{}' advertises no address", self.id)))?;

        HostPort::new(host, port)
    }
}

/// Mesos stores the network-order address bytes read as a little-endian
/// integer, so 127.0.1.1 arrives as 16842879.
fn unpack_ipv4(packed: u32) -> Ipv4Addr {
    Ipv4Addr::from(packed.to_le_bytes())
}

/// One known coordination-service participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRecord {
    node: String,
    sequence: u64,
    id: String,
    pid: Option<String>,
    endpoint: HostPort,
}

impl MasterRecord {
    /// Builds a participant record from its node and decoded payload.
    pub fn from_info(node: &ParticipantNode, info: &MasterInfo) -> AppResult<Self> {
        Ok(Self {
            node: node.name().to_owned(),
            sequence: node.sequence(),
            id: info.id().to_owned(),
            pid: info.pid.clone(),
            endpoint: info.endpoint()?,
        })
    }

    /// Returns the participant node name.
    #[must_use]
    pub fn node(&self) -> &str {
        self.node.as_str()
    }

    /// Returns the participant sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the master's raw identity.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the master's process identifier, when advertised.
    #[must_use]
    pub fn pid(&self) -> Option<&str> {
        self.pid.as_deref()
    }

    /// Returns the resolved endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &HostPort {
        &self.endpoint
    }

    /// Returns whether `host` names this master, either through its resolved
    /// endpoint or through the host part of its process identifier.
    ///
    /// Masters usually advertise a hostname while the state document names
    /// the leader by the IP in its PID.
    #[must_use]
    pub fn advertises_host(&self, host: &str) -> bool {
        self.endpoint.host().eq_ignore_ascii_case(host)
            || self
                .pid
                .as_deref()
                .and_then(|pid| HostPort::parse_pid(pid).ok())
                .is_some_and(|pid| pid.host().eq_ignore_ascii_case(host))
    }
}

/// Known participants plus the currently elected leader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterMembership {
    members: Vec<MasterRecord>,
    leader_node: Option<String>,
}

impl ClusterMembership {
    /// Returns a membership with no participants and no leader.
    #[must_use]
    pub fn leaderless() -> Self {
        Self::default()
    }

    /// Builds a membership from decoded participants and the elected node.
    ///
    /// The leader is only set when the elected node's record decoded
    /// successfully, so at most one participant is ever marked leader.
    #[must_use]
    pub fn elect(mut members: Vec<MasterRecord>, leader_node: Option<&str>) -> Self {
        members.sort_by_key(MasterRecord::sequence);
        let leader_node = leader_node
            .filter(|node| members.iter().any(|member| member.node() == *node))
            .map(str::to_owned);

        Self {
            members,
            leader_node,
        }
    }

    /// Returns every known participant ordered by sequence.
    #[must_use]
    pub fn members(&self) -> &[MasterRecord] {
        self.members.as_slice()
    }

    /// Returns the elected leader, if any.
    #[must_use]
    pub fn leader(&self) -> Option<&MasterRecord> {
        let leader_node = self.leader_node.as_deref()?;
        self.members
            .iter()
            .find(|member| member.node() == leader_node)
    }

    /// Returns whether the given participant is the elected leader.
    #[must_use]
    pub fn is_leader(&self, member: &MasterRecord) -> bool {
        self.leader_node.as_deref() == Some(member.node())
    }
}
