//! The private-information-retrieval call surface: an offline setup pass on
//! the server and the online query phase between one server and one client.
//!
//! The retrieval protocol is a black box behind the [`PirEngine`] trait.
//! This module validates the role-specific parameters against strict
//! whitelists, lines up the two parties with a readiness handshake and
//! assembles the per-party reports.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::channel::Channel;
use crate::cluster::{ClusterTopology, ConfigError};
use crate::transfer::{self, TransferError};

/// The PIR protocol variant supported by the setup/query calls.
pub const PIR_PROTOCOL: &str = "KEYWORD_PIR_LABELED_PSI";

/// The parameters a query-phase server may (and must) provide.
pub const PIR_SERVER_KEYS: &[&str] = &["oprf_key_path", "setup_path"];

/// The parameters a query-phase client may (and must) provide.
pub const PIR_CLIENT_KEYS: &[&str] = &["input_path", "key_columns", "output_path"];

/// The error raised by PIR calls.
#[derive(Debug, Error)]
pub enum PirError {
    /// The call configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The retrieval engine failed.
    #[error("pir engine failed: {0}")]
    Engine(String),
    /// The readiness handshake failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Configuration of the offline PIR setup pass, run by the server alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirSetupConfig {
    /// The party acting as PIR server.
    pub server: String,
    /// The server's database file, comma separated with a header.
    pub input_path: PathBuf,
    /// The key column(s) clients query by.
    pub key_columns: Vec<String>,
    /// The label column(s) returned to clients.
    pub label_columns: Vec<String>,
    /// Where the generated OPRF key (32 byte binary) is written.
    pub oprf_key_path: PathBuf,
    /// The directory the setup cache is written to.
    pub setup_path: PathBuf,
    /// The maximum number of keys per client query.
    pub num_per_query: u64,
    /// The padded byte length of each label.
    pub label_max_len: u64,
    /// The PIR protocol variant.
    pub protocol: String,
}

impl PirSetupConfig {
    /// A setup pass with the default protocol.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server: impl Into<String>,
        input_path: impl Into<PathBuf>,
        key_columns: Vec<String>,
        label_columns: Vec<String>,
        oprf_key_path: impl Into<PathBuf>,
        setup_path: impl Into<PathBuf>,
        num_per_query: u64,
        label_max_len: u64,
    ) -> Self {
        PirSetupConfig {
            server: server.into(),
            input_path: input_path.into(),
            key_columns,
            label_columns,
            oprf_key_path: oprf_key_path.into(),
            setup_path: setup_path.into(),
            num_per_query,
            label_max_len,
            protocol: PIR_PROTOCOL.into(),
        }
    }
}

/// Configuration of the online PIR query phase for one party.
///
/// `params` carries the role-specific parameters as key/value pairs; servers
/// must provide exactly [`PIR_SERVER_KEYS`], clients exactly
/// [`PIR_CLIENT_KEYS`]. Multi-column `key_columns` values are comma joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirQueryConfig {
    /// The party acting as PIR server.
    pub server: String,
    /// The PIR protocol variant.
    pub protocol: String,
    /// This party's role-specific parameters.
    pub params: BTreeMap<String, String>,
}

/// The per-party report of a PIR call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PirReport {
    /// The reporting party.
    pub party: String,
    /// The number of rows indexed (setup/serve) or retrieved (query);
    /// `0` for parties with no role in the call.
    pub data_count: i64,
}

/// The serve-side request of the online phase.
#[derive(Debug, Clone)]
pub struct PirServeRequest {
    /// The PIR protocol variant.
    pub protocol: String,
    /// The OPRF key written during setup.
    pub oprf_key_path: PathBuf,
    /// The setup cache directory written during setup.
    pub setup_path: PathBuf,
}

/// The client-side request of the online phase.
#[derive(Debug, Clone)]
pub struct PirQueryRequest {
    /// The PIR protocol variant.
    pub protocol: String,
    /// The client's query file, comma separated with a header.
    pub input_path: PathBuf,
    /// The key column(s) to query by.
    pub key_columns: Vec<String>,
    /// Where the retrieved rows are written.
    pub output_path: PathBuf,
}

/// The cryptographic retrieval protocol, an external collaborator.
#[async_trait]
pub trait PirEngine<C: Channel + Send>: Send + Sync {
    /// Runs the offline setup pass over the server's database. Returns the
    /// number of rows indexed.
    async fn setup(&self, config: &PirSetupConfig) -> Result<i64, String>;

    /// Serves one client's online query phase. Returns the number of rows
    /// indexed.
    async fn serve(&self, link: &mut C, peer: usize, request: &PirServeRequest)
    -> Result<i64, String>;

    /// Runs the client side of the online query phase. Returns the number of
    /// rows retrieved.
    async fn query(&self, link: &mut C, peer: usize, request: &PirQueryRequest)
    -> Result<i64, String>;
}

fn validate_params(
    params: &BTreeMap<String, String>,
    allowed: &'static [&'static str],
) -> Result<(), ConfigError> {
    for name in params.keys() {
        if !allowed.contains(&name.as_str()) {
            return Err(ConfigError::UnsupportedParameter {
                name: name.clone(),
                allowed,
            });
        }
    }
    for &name in allowed {
        if !params.contains_key(name) {
            return Err(ConfigError::MissingParameter { name: name.into() });
        }
    }
    Ok(())
}

/// Runs the offline setup pass for one party. Parties other than the server
/// have nothing to do and report `data_count = 0`.
#[instrument(level = "debug", skip_all, fields(rank, protocol = %config.protocol))]
pub async fn pir_setup<C: Channel + Send, E: PirEngine<C> + ?Sized>(
    topology: &ClusterTopology,
    rank: usize,
    engine: &E,
    config: &PirSetupConfig,
) -> Result<PirReport, PirError> {
    let party = topology.party(rank).name.clone();
    // setup is resolved even for idle parties so a bad name fails everywhere
    let _server_rank = topology.rank_of(&config.server)?;
    if party != config.server {
        return Ok(PirReport {
            party,
            data_count: 0,
        });
    }
    if config.protocol != PIR_PROTOCOL {
        return Err(ConfigError::InvalidParameter {
            name: "protocol".into(),
            reason: format!("`{}` is not supported, use {PIR_PROTOCOL}", config.protocol),
        }
        .into());
    }
    let data_count = engine.setup(config).await.map_err(PirError::Engine)?;
    Ok(PirReport { party, data_count })
}

/// Runs the online query phase for one party, as server or client depending
/// on its role. The server signals readiness before serving so the client
/// never queries into the void.
#[instrument(level = "debug", skip_all, fields(rank, protocol = %config.protocol))]
pub async fn pir_query<C: Channel + Send, E: PirEngine<C> + ?Sized>(
    topology: &ClusterTopology,
    rank: usize,
    link: &mut C,
    engine: &E,
    config: &PirQueryConfig,
) -> Result<PirReport, PirError> {
    if topology.world_size() != 2 {
        return Err(ConfigError::InvalidParameter {
            name: "cluster".into(),
            reason: format!(
                "pir query requires exactly 2 parties, cluster has {}",
                topology.world_size()
            ),
        }
        .into());
    }
    let party = topology.party(rank).name.clone();
    let server_rank = topology.rank_of(&config.server)?;
    let peer = 1 - rank;

    let data_count = if rank == server_rank {
        validate_params(&config.params, PIR_SERVER_KEYS)?;
        let request = PirServeRequest {
            protocol: config.protocol.clone(),
            oprf_key_path: config.params["oprf_key_path"].clone().into(),
            setup_path: config.params["setup_path"].clone().into(),
        };
        transfer::send_ready(link, peer).await?;
        engine
            .serve(link, peer, &request)
            .await
            .map_err(PirError::Engine)?
    } else {
        validate_params(&config.params, PIR_CLIENT_KEYS)?;
        let request = PirQueryRequest {
            protocol: config.protocol.clone(),
            input_path: config.params["input_path"].clone().into(),
            key_columns: config.params["key_columns"]
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            output_path: config.params["output_path"].clone().into(),
        };
        transfer::recv_ready(link, peer).await?;
        engine
            .query(link, peer, &request)
            .await
            .map_err(PirError::Engine)?
    };
    Ok(PirReport { party, data_count })
}
