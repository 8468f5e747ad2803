//! Cluster topology and configuration validation.
//!
//! A cluster descriptor lists the participating parties and the runtime
//! configuration every party must agree on. Parties are sorted by name
//! before rank assignment so that all processes derive the same dense
//! ranking `0..N-1` regardless of the order the descriptor was written in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vm::{FieldWidth, Protocol};

/// A configuration error, raised synchronously before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration key is not in the whitelist of its context.
    #[error("unsupported parameter `{name}`, only {allowed:?} are available")]
    UnsupportedParameter {
        /// The offending key.
        name: String,
        /// The whitelist of the current context/role.
        allowed: &'static [&'static str],
    },
    /// A required configuration key is absent.
    #[error("parameter `{name}` is required but missing")]
    MissingParameter {
        /// The missing key.
        name: String,
    },
    /// A configuration value could not be interpreted.
    #[error("invalid value for parameter `{name}`: {reason}")]
    InvalidParameter {
        /// The offending key.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// A referenced party name does not exist in the cluster.
    #[error("party `{0}` does not exist in the cluster")]
    UnknownParty(String),
    /// Two parties in the descriptor share the same name.
    #[error("party `{0}` is listed more than once")]
    DuplicateParty(String),
    /// The descriptor lists no parties.
    #[error("a cluster needs at least one party")]
    EmptyCluster,
    /// Two runtimes were constructed from different runtime configurations.
    #[error("runtime config mismatch: expected {expected:?}, found {actual:?}")]
    RuntimeConfigMismatch {
        /// The configuration of this runtime.
        expected: RuntimeConfig,
        /// The disagreeing configuration.
        actual: RuntimeConfig,
    },
}

/// TLS material for one side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslOptions {
    /// Path to the certificate file.
    pub certificate_path: String,
    /// Path to the private key file.
    pub private_key_path: String,
    /// Path to the CA file used to verify the peer.
    pub ca_file_path: Option<String>,
    /// Maximum depth of the certificate chain for verification.
    pub verify_depth: Option<u32>,
}

/// Optional TLS material of a party, split by connection direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Options used when the party accepts connections.
    pub server: Option<SslOptions>,
    /// Options used when the party opens connections.
    pub client: Option<SslOptions>,
}

/// One participating party, as written in the cluster descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySpec {
    /// The party's unique name.
    pub name: String,
    /// The address other parties reach this party under.
    pub address: String,
    /// The local listen address, if it differs from `address`.
    pub listen_address: Option<String>,
    /// TLS material, if the links are encrypted.
    pub tls: Option<TlsConfig>,
}

impl PartySpec {
    /// A plain party with no separate listen address and no TLS.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        PartySpec {
            name: name.into(),
            address: address.into(),
            listen_address: None,
            tls: None,
        }
    }
}

/// The runtime configuration every party of a cluster must agree on,
/// byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// The MPC protocol variant.
    pub protocol: Protocol,
    /// The arithmetic field width.
    pub field: FieldWidth,
    /// The fixed-point fraction bits.
    pub fraction_bits: u32,
}

/// The cluster descriptor consumed at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    /// The participating parties, in any order.
    pub parties: Vec<PartySpec>,
    /// The shared runtime configuration.
    pub runtime: RuntimeConfig,
}

/// A validated cluster: parties sorted by name, ranks assigned densely.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    parties: Vec<PartySpec>,
    runtime: RuntimeConfig,
}

impl ClusterTopology {
    /// Validates a descriptor: rejects empty clusters and duplicate names,
    /// sorts the parties by name and assigns ranks by position.
    pub fn from_descriptor(descriptor: ClusterDescriptor) -> Result<Self, ConfigError> {
        let ClusterDescriptor {
            mut parties,
            runtime,
        } = descriptor;
        if parties.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }
        parties.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in parties.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(ConfigError::DuplicateParty(pair[0].name.clone()));
            }
        }
        Ok(ClusterTopology { parties, runtime })
    }

    /// The number of parties in the cluster.
    pub fn world_size(&self) -> usize {
        self.parties.len()
    }

    /// The parties in rank order.
    pub fn parties(&self) -> &[PartySpec] {
        &self.parties
    }

    /// The party at the given rank.
    pub fn party(&self, rank: usize) -> &PartySpec {
        &self.parties[rank]
    }

    /// Looks up the rank of a party by name.
    pub fn rank_of(&self, name: &str) -> Result<usize, ConfigError> {
        self.parties
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownParty(name.to_string()))
    }

    /// The shared runtime configuration.
    pub fn runtime_config(&self) -> RuntimeConfig {
        self.runtime
    }
}

/// The configuration keys a link descriptor may contain.
pub const LINK_CONFIG_KEYS: &[&str] = &[
    "connect_retry_times",
    "connect_retry_interval_ms",
    "recv_timeout_ms",
    "http_max_payload_size",
    "http_timeout_ms",
    "throttle_window_size",
    "channel_protocol",
    "channel_connection_type",
];

const DEFAULT_TIMEOUT_MS: u64 = 120 * 1000;

/// The validated network link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// How often to retry establishing a connection.
    pub connect_retry_times: u32,
    /// The interval between connection retries, in milliseconds.
    pub connect_retry_interval_ms: u64,
    /// How long a receive may block before it fails, in milliseconds.
    pub recv_timeout_ms: u64,
    /// The maximum HTTP payload size, in bytes.
    pub http_max_payload_size: u64,
    /// The HTTP-level timeout, in milliseconds.
    pub http_timeout_ms: u64,
    /// The throttle window size.
    pub throttle_window_size: u64,
    /// The channel protocol name.
    pub channel_protocol: Option<String>,
    /// The channel connection type.
    pub channel_connection_type: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            connect_retry_times: 10,
            connect_retry_interval_ms: 1000,
            recv_timeout_ms: DEFAULT_TIMEOUT_MS,
            http_max_payload_size: 32 * 1024,
            http_timeout_ms: DEFAULT_TIMEOUT_MS,
            throttle_window_size: 10,
            channel_protocol: None,
            channel_connection_type: None,
        }
    }
}

impl LinkConfig {
    /// Builds a link configuration from key/value pairs, rejecting any key
    /// outside [`LINK_CONFIG_KEYS`] and any value that does not parse.
    /// Missing keys keep their defaults (120 s for both timeouts).
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut config = LinkConfig::default();
        for (name, value) in pairs {
            config.apply(name, value)?;
        }
        Ok(config)
    }

    /// Applies a single key/value pair, validating the key against the
    /// whitelist.
    pub fn apply(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
        where
            T::Err: std::fmt::Display,
        {
            value.parse().map_err(|e| ConfigError::InvalidParameter {
                name: name.to_string(),
                reason: format!("{e}"),
            })
        }
        match name {
            "connect_retry_times" => self.connect_retry_times = parse(name, value)?,
            "connect_retry_interval_ms" => self.connect_retry_interval_ms = parse(name, value)?,
            "recv_timeout_ms" => self.recv_timeout_ms = parse(name, value)?,
            "http_max_payload_size" => self.http_max_payload_size = parse(name, value)?,
            "http_timeout_ms" => self.http_timeout_ms = parse(name, value)?,
            "throttle_window_size" => self.throttle_window_size = parse(name, value)?,
            "channel_protocol" => self.channel_protocol = Some(value.to_string()),
            "channel_connection_type" => self.channel_connection_type = Some(value.to_string()),
            _ => {
                return Err(ConfigError::UnsupportedParameter {
                    name: name.to_string(),
                    allowed: LINK_CONFIG_KEYS,
                });
            }
        }
        Ok(())
    }
}
