//! The per-party runtime: a private store of named secret shares and the
//! execution of compiled programs against it.
//!
//! Each party process owns exactly one [`PartyRuntime`]. The runtime never
//! sees another party's state; it stores raw share bytes under handle names
//! generated from a process-owned monotonic counter, so a deleted handle's
//! name is never reissued and overlapping invocations cannot alias each
//! other's variables.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cluster::{ConfigError, RuntimeConfig};
use crate::device::ReturnArity;
use crate::tree::{Tree, TreeShape};
use crate::vm::{
    Compiler, Executable, PlainValue, ShareVm, ValueMeta, VarMeta, Visibility, VmError,
};

/// The error raised by [`PartyRuntime`] operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A share handle is unknown to this runtime.
    #[error("share handle `{0}` not found")]
    NotFound(String),
    /// The number of handles does not match what the executable expects.
    #[error("arity mismatch: expected {expected} handles, got {actual}")]
    ArityMismatch {
        /// The number of handles the executable declares.
        expected: usize,
        /// The number of handles provided.
        actual: usize,
    },
    /// The virtual machine failed.
    #[error(transparent)]
    Vm(#[from] VmError),
    /// A persisted record could not be read or written.
    #[error("share record i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted record could not be encoded or decoded.
    #[error("share record encoding failed: {0}")]
    Encoding(String),
    /// A persisted record disagrees with this runtime's configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The persisted form of a value: its metadata tree plus one hex-encoded
/// byte string per share leaf.
///
/// The encoding is textual; hex keeps arbitrary share octets lossless.
#[derive(Debug, Serialize, Deserialize)]
struct ShareRecord {
    meta: Tree<ValueMeta>,
    shares: Vec<String>,
}

/// The runtime of a single party: share store, VM and compiler.
pub struct PartyRuntime {
    rank: usize,
    party: String,
    config: RuntimeConfig,
    vm: Box<dyn ShareVm>,
    compiler: Box<dyn Compiler>,
    store: HashMap<String, Vec<u8>>,
    share_seq: u64,
}

impl PartyRuntime {
    /// Creates the runtime for the party with the given rank and name.
    pub fn new(
        rank: usize,
        party: impl Into<String>,
        config: RuntimeConfig,
        vm: Box<dyn ShareVm>,
        compiler: Box<dyn Compiler>,
    ) -> Self {
        PartyRuntime {
            rank,
            party: party.into(),
            config,
            vm,
            compiler,
            store: HashMap::new(),
            share_seq: 0,
        }
    }

    /// The rank of this party.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The name of this party.
    pub fn party(&self) -> &str {
        &self.party
    }

    /// The runtime configuration this party was constructed from.
    pub fn config(&self) -> RuntimeConfig {
        self.config
    }

    /// The compiler of this party (only rank 0 compiles in practice).
    pub fn compiler(&self) -> &dyn Compiler {
        self.compiler.as_ref()
    }

    fn next_share_name(&mut self) -> String {
        self.share_seq += 1;
        format!("{}", self.share_seq)
    }

    /// Stores a tree of raw share bytes under freshly generated handles.
    pub fn infeed(&mut self, value: Tree<Vec<u8>>) -> Tree<String> {
        let shape = value.shape();
        let names = value
            .flatten()
            .into_iter()
            .map(|share| {
                let name = self.next_share_name();
                self.store.insert(name.clone(), share);
                name
            })
            .collect();
        // the shape is taken from the value itself, so unflatten cannot fail
        Tree::unflatten(&shape, names).unwrap()
    }

    /// Encodes a tree of plaintext values through the VM and stores the
    /// resulting (public) shares, returning metadata and handles.
    pub fn infeed_plain(
        &mut self,
        value: &Tree<PlainValue>,
    ) -> Result<(Tree<ValueMeta>, Tree<String>), RuntimeError> {
        let shape = value.shape();
        let mut metas = Vec::with_capacity(value.leaf_count());
        let mut names = Vec::with_capacity(value.leaf_count());
        for plain in value.leaves() {
            let share = self.vm.encode_public(plain)?;
            metas.push(self.augment(VarMeta {
                shape: plain.shape.clone(),
                dtype: plain.dtype,
                visibility: Visibility::Public,
            }));
            let name = self.next_share_name();
            self.store.insert(name.clone(), share);
            names.push(name);
        }
        let meta = Tree::unflatten(&shape, metas).expect("meta tree mirrors the value tree");
        let names = Tree::unflatten(&shape, names).expect("name tree mirrors the value tree");
        Ok((meta, names))
    }

    /// Reads the share bytes stored under the given handles.
    pub fn outfeed(&self, names: &Tree<String>) -> Result<Tree<Vec<u8>>, RuntimeError> {
        let shape = names.shape();
        let mut shares = Vec::with_capacity(names.leaf_count());
        for name in names.leaves() {
            let share = self
                .store
                .get(name)
                .ok_or_else(|| RuntimeError::NotFound(name.clone()))?;
            shares.push(share.clone());
        }
        Ok(Tree::unflatten(&shape, shares).expect("share tree mirrors the name tree"))
    }

    /// Removes the given handles from the store. Deleting an unknown handle
    /// is a no-op: callers issue deletes best-effort during cleanup.
    pub fn delete(&mut self, names: &Tree<String>) {
        for name in names.leaves() {
            self.store.remove(name);
        }
    }

    /// Binds `inputs` to the executable's input placeholders, rewrites the
    /// output placeholders to fresh handles, executes the program and
    /// returns per-output metadata plus the fresh handles.
    pub fn run(
        &mut self,
        policy: ReturnArity,
        output_shape: &TreeShape,
        mut executable: Executable,
        inputs: &[String],
    ) -> Result<(Vec<ValueMeta>, Vec<String>), RuntimeError> {
        if executable.input_names.len() != inputs.len() {
            return Err(RuntimeError::ArityMismatch {
                expected: executable.input_names.len(),
                actual: inputs.len(),
            });
        }
        let mut input_shares = Vec::with_capacity(inputs.len());
        for name in inputs {
            let share = self
                .store
                .get(name)
                .ok_or_else(|| RuntimeError::NotFound(name.clone()))?;
            input_shares.push(share.clone());
        }
        executable.input_names = inputs.to_vec();
        let output_names: Vec<String> = (0..executable.output_names.len())
            .map(|_| self.next_share_name())
            .collect();
        executable.output_names = output_names.clone();

        if let ReturnArity::Single | ReturnArity::FromUser(_) = policy {
            let expected = output_shape.leaf_count();
            if expected != output_names.len() {
                return Err(RuntimeError::ArityMismatch {
                    expected,
                    actual: output_names.len(),
                });
            }
        }

        debug!(
            rank = self.rank,
            inputs = inputs.len(),
            outputs = output_names.len(),
            "running executable"
        );
        let outputs = self.vm.execute(&executable.program, &input_shares)?;
        if outputs.len() != output_names.len() {
            return Err(RuntimeError::ArityMismatch {
                expected: output_names.len(),
                actual: outputs.len(),
            });
        }
        let mut metas = Vec::with_capacity(outputs.len());
        for (output, name) in outputs.into_iter().zip(&output_names) {
            metas.push(self.augment(output.meta));
            self.store.insert(name.clone(), output.share);
        }
        Ok((metas, output_names))
    }

    fn augment(&self, meta: VarMeta) -> ValueMeta {
        ValueMeta {
            shape: meta.shape,
            dtype: meta.dtype,
            visibility: meta.visibility,
            protocol: self.config.protocol,
            field: self.config.field,
            fraction_bits: self.config.fraction_bits,
        }
    }

    /// Persists the shares stored under `names`, together with their
    /// metadata, to a process-local path.
    pub async fn dump(
        &self,
        meta: &Tree<ValueMeta>,
        names: &Tree<String>,
        path: impl AsRef<Path>,
    ) -> Result<(), RuntimeError> {
        let shares = self
            .outfeed(names)?
            .flatten()
            .into_iter()
            .map(|share| hex::encode(&share))
            .collect();
        let record = ShareRecord {
            meta: meta.clone(),
            shares,
        };
        let encoded =
            serde_json::to_vec(&record).map_err(|e| RuntimeError::Encoding(e.to_string()))?;
        tokio::fs::write(path, encoded).await?;
        Ok(())
    }

    /// Restores a persisted record: re-feeds the shares under fresh handles
    /// and returns the metadata plus the new handle tree. Fails if the
    /// record's metadata disagrees with this runtime's configuration.
    pub async fn load(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<(Tree<ValueMeta>, Tree<String>), RuntimeError> {
        let encoded = tokio::fs::read(path).await?;
        let record: ShareRecord =
            serde_json::from_slice(&encoded).map_err(|e| RuntimeError::Encoding(e.to_string()))?;
        for leaf in record.meta.leaves() {
            if leaf.protocol != self.config.protocol
                || leaf.field != self.config.field
                || leaf.fraction_bits != self.config.fraction_bits
            {
                return Err(ConfigError::RuntimeConfigMismatch {
                    expected: self.config,
                    actual: RuntimeConfig {
                        protocol: leaf.protocol,
                        field: leaf.field,
                        fraction_bits: leaf.fraction_bits,
                    },
                }
                .into());
            }
        }
        let shape = record.meta.shape();
        let mut shares = Vec::with_capacity(record.shares.len());
        for share in &record.shares {
            let share = hex::decode(share).map_err(|e| RuntimeError::Encoding(e.to_string()))?;
            shares.push(share);
        }
        let shares = Tree::unflatten(&shape, shares)
            .map_err(|e| RuntimeError::Encoding(e.to_string()))?;
        let names = self.infeed(shares);
        Ok((record.meta, names))
    }
}
