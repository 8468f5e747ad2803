//! The private-set-intersection call surface: plain PSI over CSV files and
//! the PSI join that additionally exchanges the intersection keys between
//! the two parties and finalizes a row-level joined file.
//!
//! The intersection protocol itself is a cryptographic black box behind the
//! [`PsiEngine`] trait; this module validates configuration, assigns roles
//! by rank, orchestrates the duplex key exchange and the local join, and
//! assembles the reports.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
};
use tracing::{debug, instrument};

use crate::channel::Channel;
use crate::cluster::{ClusterTopology, ConfigError};
use crate::join::{
    JOIN_CHUNK_ROWS, JoinError, inner_join_chunked, key_positions, project_keys, read_header,
    read_key_set, sort_by_keys,
};
use crate::transfer::{self, TransferConfig, TransferError};

/// The PSI protocols that support the row-level join.
pub const JOIN_PROTOCOLS: &[&str] = &["ECDH_PSI_2PC", "KKRT_PSI_2PC", "BC22_PSI_2PC"];

/// The error raised by PSI calls.
#[derive(Debug, Error)]
pub enum PsiError {
    /// The call configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The intersection engine failed.
    #[error("psi engine failed: {0}")]
    Engine(String),
    /// The duplex key exchange failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// The local join or the external sort failed.
    #[error(transparent)]
    Join(#[from] JoinError),
    /// A file could not be read or written.
    #[error("psi file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration of a plain PSI call over CSV files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsiConfig {
    /// The key column(s) used to intersect.
    pub key: Vec<String>,
    /// The party's own input file, comma separated with a header.
    pub input_path: PathBuf,
    /// Where the receiver's intersection file is written.
    pub output_path: PathBuf,
    /// The party that receives the intersection result.
    pub receiver: String,
    /// The PSI protocol variant, e.g. `KKRT_PSI_2PC`.
    pub protocol: String,
    /// Whether to check the input for duplicates before intersecting.
    pub precheck_input: bool,
    /// Whether the engine sorts the result by key.
    pub sort: bool,
    /// Whether the result is broadcast to all parties.
    pub broadcast_result: bool,
    /// The hash bucket size used by the engine.
    pub bucket_size: u64,
    /// The curve used by ECDH-style protocols.
    pub curve_type: String,
    /// Preprocess file path, for unbalanced PSI variants.
    pub preprocess_path: Option<PathBuf>,
    /// ECDH-OPRF secret key path (32 byte binary), for unbalanced PSI.
    pub ecdh_secret_key_path: Option<PathBuf>,
    /// Sub-sampling probability of differentially private PSI.
    pub dppsi_bob_sub_sampling: f64,
    /// Epsilon of differentially private PSI.
    pub dppsi_epsilon: f64,
    /// Whether to run in interconnection mode.
    pub ic_mode: bool,
}

impl PsiConfig {
    /// A PSI call with the default protocol (`KKRT_PSI_2PC`) and knobs.
    pub fn new(
        key: Vec<String>,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        receiver: impl Into<String>,
    ) -> Self {
        PsiConfig {
            key,
            input_path: input_path.into(),
            output_path: output_path.into(),
            receiver: receiver.into(),
            protocol: "KKRT_PSI_2PC".into(),
            precheck_input: true,
            sort: true,
            broadcast_result: true,
            bucket_size: 1 << 20,
            curve_type: "CURVE_25519".into(),
            preprocess_path: None,
            ecdh_secret_key_path: None,
            dppsi_bob_sub_sampling: 0.9,
            dppsi_epsilon: 3.0,
            ic_mode: false,
        }
    }
}

/// Configuration of a PSI join call over CSV files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsiJoinConfig {
    /// The key column(s) used to join.
    pub key: Vec<String>,
    /// The party's own input file, comma separated with a header.
    pub input_path: PathBuf,
    /// Where the final joined file is written.
    pub output_path: PathBuf,
    /// The party that receives the intersection result.
    pub receiver: String,
    /// The nominal join driver. Resolved against the cluster so a bad name
    /// fails on every party; each side always joins its own rows against
    /// the exchanged key set, so this does not redirect any output.
    pub join_party: String,
    /// The PSI protocol variant; must be one of [`JOIN_PROTOCOLS`].
    pub protocol: String,
    /// Whether to check the input for duplicates before intersecting.
    pub precheck_input: bool,
    /// The hash bucket size used by the engine.
    pub bucket_size: u64,
    /// The curve used by ECDH-style protocols.
    pub curve_type: String,
    /// Whether to run in interconnection mode.
    pub ic_mode: bool,
}

impl PsiJoinConfig {
    /// A PSI join call with the default protocol (`KKRT_PSI_2PC`) and knobs.
    pub fn new(
        key: Vec<String>,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        receiver: impl Into<String>,
        join_party: impl Into<String>,
    ) -> Self {
        PsiJoinConfig {
            key,
            input_path: input_path.into(),
            output_path: output_path.into(),
            receiver: receiver.into(),
            join_party: join_party.into(),
            protocol: "KKRT_PSI_2PC".into(),
            precheck_input: true,
            bucket_size: 1 << 20,
            curve_type: "CURVE_25519".into(),
            ic_mode: false,
        }
    }
}

/// The per-party report of a PSI call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsiReport {
    /// The reporting party.
    pub party: String,
    /// The number of rows in the party's input.
    pub original_count: i64,
    /// The size of the intersection, `-1` for parties that do not receive
    /// the result.
    pub intersection_count: i64,
}

/// The per-party report of a PSI join call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsiJoinReport {
    /// The reporting party.
    pub party: String,
    /// The number of rows in the party's input.
    pub original_count: i64,
    /// The size of the key intersection.
    pub intersection_count: i64,
    /// The number of rows in the final joined file.
    pub join_count: i64,
}

/// Differential-privacy parameters of `DP_PSI_2PC`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DpPsiParams {
    /// Bernoulli sub-sampling probability, in `(0, 1)`.
    pub bob_sub_sampling: f64,
    /// The privacy budget, `> 0`.
    pub epsilon: f64,
}

/// The request handed to the intersection engine after validation and role
/// resolution.
#[derive(Debug, Clone)]
pub struct PsiExecRequest {
    /// The PSI protocol variant.
    pub protocol: String,
    /// The rank of the receiving party.
    pub receiver_rank: usize,
    /// Whether the result is broadcast to all parties.
    pub broadcast_result: bool,
    /// The party's own input file.
    pub input_path: PathBuf,
    /// The key column(s) to intersect.
    pub key: Vec<String>,
    /// Whether to check the input before intersecting.
    pub precheck_input: bool,
    /// Where this party's result is written (if it receives one).
    pub output_path: PathBuf,
    /// Whether the engine sorts the result by key.
    pub sort: bool,
    /// The curve used by ECDH-style protocols.
    pub curve_type: String,
    /// The hash bucket size.
    pub bucket_size: u64,
    /// Preprocess path, set per protocol/role.
    pub preprocess_path: Option<PathBuf>,
    /// ECDH-OPRF secret key path, set per protocol/role.
    pub ecdh_secret_key_path: Option<PathBuf>,
    /// Differential-privacy parameters, for `DP_PSI_2PC`.
    pub dppsi: Option<DpPsiParams>,
    /// Whether to run in interconnection mode.
    pub ic_mode: bool,
}

/// The result counts reported by the intersection engine.
#[derive(Debug, Clone, Copy)]
pub struct PsiCounts {
    /// The number of rows in the party's input.
    pub original_count: i64,
    /// The size of the intersection, `-1` if this party receives no result.
    pub intersection_count: i64,
}

/// The cryptographic intersection protocol, an external collaborator.
///
/// An engine call runs the full (possibly multi-round) protocol over the
/// party's link; each party of the cluster invokes it concurrently.
#[async_trait]
pub trait PsiEngine<C: Channel + Send>: Send + Sync {
    /// Runs the intersection over the given link and writes the result file
    /// for receiving parties.
    async fn bucket_psi(
        &self,
        link: &mut C,
        self_rank: usize,
        request: &PsiExecRequest,
    ) -> Result<PsiCounts, String>;
}

fn validate_protocol_params(
    config: &PsiConfig,
    rank: usize,
    receiver_rank: usize,
    world_size: usize,
) -> Result<(Option<PathBuf>, Option<PathBuf>, Option<DpPsiParams>), PsiError> {
    let require = |value: &Option<PathBuf>, name: &str| -> Result<PathBuf, PsiError> {
        value.clone().ok_or_else(|| {
            ConfigError::MissingParameter {
                name: name.to_string(),
            }
            .into()
        })
    };
    let mut preprocess = None;
    let mut ecdh_key = None;
    let mut dppsi = None;
    match config.protocol.as_str() {
        "DP_PSI_2PC" => {
            if !(0.0 < config.dppsi_bob_sub_sampling && config.dppsi_bob_sub_sampling < 1.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "dppsi_bob_sub_sampling".into(),
                    reason: format!("{} is not in (0, 1)", config.dppsi_bob_sub_sampling),
                }
                .into());
            }
            if config.dppsi_epsilon <= 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name: "dppsi_epsilon".into(),
                    reason: format!("{} is not positive", config.dppsi_epsilon),
                }
                .into());
            }
            dppsi = Some(DpPsiParams {
                bob_sub_sampling: config.dppsi_bob_sub_sampling,
                epsilon: config.dppsi_epsilon,
            });
        }
        "ECDH_OPRF_UB_PSI_2PC_GEN_CACHE" => {
            ecdh_key = Some(require(&config.ecdh_secret_key_path, "ecdh_secret_key_path")?);
        }
        "ECDH_OPRF_UB_PSI_2PC_TRANSFER_CACHE" => {
            let path = require(&config.preprocess_path, "preprocess_path")?;
            if receiver_rank == rank {
                preprocess = Some(path);
            }
        }
        "ECDH_OPRF_UB_PSI_2PC_SHUFFLE_ONLINE" => {
            preprocess = Some(require(&config.preprocess_path, "preprocess_path")?);
            let key = require(&config.ecdh_secret_key_path, "ecdh_secret_key_path")?;
            if receiver_rank == rank {
                ecdh_key = Some(key);
            }
        }
        "ECDH_OPRF_UB_PSI_2PC_OFFLINE" | "ECDH_OPRF_UB_PSI_2PC_ONLINE" => {
            if world_size != 2 {
                return Err(ConfigError::InvalidParameter {
                    name: "protocol".into(),
                    reason: format!(
                        "{} requires exactly 2 parties, cluster has {world_size}",
                        config.protocol
                    ),
                }
                .into());
            }
            if receiver_rank != rank {
                ecdh_key = Some(require(&config.ecdh_secret_key_path, "ecdh_secret_key_path")?);
            } else {
                preprocess = Some(require(&config.preprocess_path, "preprocess_path")?);
            }
        }
        _ => {}
    }
    Ok((preprocess, ecdh_key, dppsi))
}

/// Runs a plain PSI call for one party. Non-receivers get
/// `intersection_count = -1` and no output file; that is a report, not an
/// error.
#[instrument(level = "debug", skip_all, fields(rank, protocol = %config.protocol))]
pub async fn psi_csv<C: Channel + Send, E: PsiEngine<C> + ?Sized>(
    topology: &ClusterTopology,
    rank: usize,
    link: &mut C,
    engine: &E,
    config: &PsiConfig,
) -> Result<PsiReport, PsiError> {
    let party = topology.party(rank).name.clone();

    // cache generation is a receiver-local operation, everyone else is idle
    if config.protocol == "ECDH_OPRF_UB_PSI_2PC_GEN_CACHE" && party != config.receiver {
        return Ok(PsiReport {
            party,
            original_count: 0,
            intersection_count: -1,
        });
    }

    let receiver_rank = topology.rank_of(&config.receiver)?;
    let (preprocess_path, ecdh_secret_key_path, dppsi) =
        validate_protocol_params(config, rank, receiver_rank, topology.world_size())?;

    let request = PsiExecRequest {
        protocol: config.protocol.clone(),
        receiver_rank,
        broadcast_result: config.broadcast_result,
        input_path: config.input_path.clone(),
        key: config.key.clone(),
        precheck_input: config.precheck_input,
        output_path: config.output_path.clone(),
        sort: config.sort,
        curve_type: config.curve_type.clone(),
        bucket_size: config.bucket_size,
        preprocess_path,
        ecdh_secret_key_path,
        dppsi,
        ic_mode: config.ic_mode,
    };
    let counts = engine
        .bucket_psi(link, rank, &request)
        .await
        .map_err(PsiError::Engine)?;
    Ok(PsiReport {
        party,
        original_count: counts.original_count,
        intersection_count: counts.intersection_count,
    })
}

async fn write_matching_keys(
    input: impl AsRef<Path>,
    key: &[String],
    intersection: &HashSet<String>,
    output: impl AsRef<Path>,
) -> Result<(), PsiError> {
    let header = read_header(&input).await?;
    let key_idx = key_positions(&header, key)?;
    let file = File::open(&input).await?;
    let mut lines = BufReader::new(file).lines();
    lines.next_line().await?; // header

    let out = File::create(output).await?;
    let mut writer = BufWriter::new(out);
    writer.write_all(key.join(",").as_bytes()).await?;
    writer.write_all(b"\n").await?;
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let tuple = key_idx
            .iter()
            .map(|&i| fields.get(i).copied().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(",");
        if intersection.contains(&tuple) {
            writer.write_all(tuple.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Runs a PSI join for one party: intersect the deduplicated keys, exchange
/// each side's surviving key file over the duplex transfer, join the own
/// row-level data against the received key set, and finalize the output with
/// the external stable sort.
#[instrument(level = "debug", skip_all, fields(rank, protocol = %config.protocol))]
pub async fn psi_join_csv<C: Channel + Send, E: PsiEngine<C> + ?Sized>(
    topology: &ClusterTopology,
    rank: usize,
    link: &mut C,
    engine: &E,
    transfer_config: &TransferConfig,
    config: &PsiJoinConfig,
) -> Result<PsiJoinReport, PsiError> {
    if !JOIN_PROTOCOLS.contains(&config.protocol.as_str()) {
        return Err(ConfigError::InvalidParameter {
            name: "protocol".into(),
            reason: format!(
                "`{}` does not support joins, use one of {JOIN_PROTOCOLS:?}",
                config.protocol
            ),
        }
        .into());
    }
    if topology.world_size() != 2 {
        return Err(ConfigError::InvalidParameter {
            name: "cluster".into(),
            reason: format!(
                "psi join requires exactly 2 parties, cluster has {}",
                topology.world_size()
            ),
        }
        .into());
    }
    let party = topology.party(rank).name.clone();
    let receiver_rank = topology.rank_of(&config.receiver)?;
    // resolved so an unknown join party fails before any i/o
    let _join_rank = topology.rank_of(&config.join_party)?;
    let peer_rank = 1 - rank;

    let scratch = tempfile::tempdir()?;
    let own_keys = scratch.path().join("psi-input-keys.csv");
    let psi_output = scratch.path().join("psi-output.csv");
    let send_keys = scratch.path().join("psi-keys-to-peer.csv");
    let peer_keys_path = scratch.path().join("psi-keys-from-peer.csv");
    let unsorted = scratch.path().join("psi-join-unsorted.csv");

    // dedup the keys first, the engine intersects key sets
    let original_count = project_keys(&config.input_path, &config.key, &own_keys).await? as i64;

    let request = PsiExecRequest {
        protocol: config.protocol.clone(),
        receiver_rank,
        // the join needs both sides to hold the intersection, sorted
        broadcast_result: true,
        input_path: own_keys.clone(),
        key: config.key.clone(),
        precheck_input: config.precheck_input,
        output_path: psi_output.clone(),
        sort: true,
        curve_type: config.curve_type.clone(),
        bucket_size: config.bucket_size,
        preprocess_path: None,
        ecdh_secret_key_path: None,
        dppsi: None,
        ic_mode: config.ic_mode,
    };
    let counts = engine
        .bucket_psi(link, rank, &request)
        .await
        .map_err(PsiError::Engine)?;

    // keys of the intersection that occur in the own rows, one per own row
    let intersection = read_key_set(&psi_output).await?;
    write_matching_keys(&config.input_path, &config.key, &intersection, &send_keys).await?;

    let (sent, received) =
        transfer::exchange_files(link, rank, peer_rank, &send_keys, &peer_keys_path, transfer_config)
            .await?;
    debug!(rank, sent, received, "exchanged join key files");

    let header = read_header(&config.input_path).await?;
    let key_idx = key_positions(&header, &config.key)?;
    {
        let out = File::create(&unsorted).await?;
        let mut writer = BufWriter::new(out);
        writer.write_all(header.join(",").as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    let join_count = if received > 0 {
        let peer_keys = read_key_set(&peer_keys_path).await?;
        inner_join_chunked(
            &config.input_path,
            &key_idx,
            &peer_keys,
            &unsorted,
            JOIN_CHUNK_ROWS,
        )
        .await? as i64
    } else {
        0
    };

    sort_by_keys(&unsorted, &config.output_path, &key_idx).await?;
    debug!(
        rank,
        intersection_count = counts.intersection_count,
        join_count,
        "psi join finished"
    );

    Ok(PsiJoinReport {
        party,
        original_count,
        intersection_count: counts.intersection_count,
        join_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join;

    #[tokio::test]
    async fn matching_keys_follow_own_row_multiplicity() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let out = dir.path().join("keys.csv");
        tokio::fs::write(&input, "id,score\n1,10\n2,20\n1,30\n3,40\n")
            .await
            .unwrap();
        let intersection: HashSet<String> = ["1".to_string(), "3".to_string()].into();
        write_matching_keys(&input, &["id".to_string()], &intersection, &out)
            .await
            .unwrap();
        let written = tokio::fs::read_to_string(&out).await.unwrap();
        assert_eq!(written, "id\n1\n1\n3\n");
        // and the receiving side reads them back as a set
        let set = join::read_key_set(&out).await.unwrap();
        assert_eq!(set, intersection);
    }
}
