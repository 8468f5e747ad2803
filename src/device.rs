//! The virtual device: one logical machine assembled from N party processes.
//!
//! Each party runs as its own actor task owning a [`PartyRuntime`], a link to
//! the other parties and the PSI/PIR engines. The [`Device`] front end fans
//! every operation out to all parties and joins the results; an operation
//! succeeds only if every party succeeds. Values held by the device are
//! [`SecretObject`]s: public metadata plus one handle tree per party, never
//! the shares themselves.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::try_join_all;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::channel::Channel;
use crate::cluster::{ClusterDescriptor, ClusterTopology, ConfigError};
use crate::pir::{self, PirEngine, PirError, PirQueryConfig, PirReport, PirSetupConfig};
use crate::psi::{self, PsiConfig, PsiEngine, PsiError, PsiJoinConfig, PsiJoinReport, PsiReport};
use crate::runtime::{PartyRuntime, RuntimeError};
use crate::transfer::TransferConfig;
use crate::tree::{Tree, TreeShape};
use crate::vm::{
    ArgSpec, CompileError, CompileOutput, Compiler, Executable, Function, PlainValue, ShareVm,
    ValueMeta,
};

/// How many values a device call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnArity {
    /// Trust the compiler: one returned object per program output.
    FromCompiler,
    /// Trust the caller's declared count; a program that produces a
    /// different number of outputs fails the call.
    FromUser(usize),
    /// Exactly one returned object, carrying the program's full output tree.
    Single,
}

/// The error raised by device operations.
#[derive(Debug, Error)]
pub enum CallError {
    /// The device or call configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The compiling party rejected the program.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// A party's runtime failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// A party's PSI call failed.
    #[error(transparent)]
    Psi(#[from] PsiError),
    /// A party's PIR call failed.
    #[error(transparent)]
    Pir(#[from] PirError),
    /// A party process is gone; the device is unusable.
    #[error("party `{party}` stopped responding")]
    PartyFailure {
        /// The name of the unresponsive party.
        party: String,
    },
    /// The parties returned structurally different results.
    #[error("parties disagree on the result structure: expected {expected} leaves, party `{party}` returned {actual}")]
    PartyDisagreement {
        /// The party that disagrees with rank 0.
        party: String,
        /// The leaf count reported by rank 0.
        expected: usize,
        /// The leaf count reported by the disagreeing party.
        actual: usize,
    },
    /// A released object was used in a call.
    #[error("the object has already been released")]
    UseAfterRelease,
}

/// A value held by the device: public metadata plus an opaque handle tree
/// per party. Dropping the struct does not free the shares; the owner
/// releases it through [`Device::release`].
#[derive(Debug, Clone)]
pub struct SecretObject {
    meta: Tree<ValueMeta>,
    shares: Vec<Tree<String>>,
    released: bool,
}

impl SecretObject {
    /// The metadata tree of the value.
    pub fn meta(&self) -> &Tree<ValueMeta> {
        &self.meta
    }

    /// The number of leaves in the value tree.
    pub fn leaf_count(&self) -> usize {
        self.meta.leaf_count()
    }
}

/// One argument of a device call.
pub enum CallArg<'a> {
    /// A value already residing on the device.
    Device(&'a SecretObject),
    /// A plaintext value, fed to all parties as public before the call.
    Plain(Tree<PlainValue>),
}

/// The party-local collaborators the device is assembled from.
pub struct PartyParts<C> {
    /// The name of the party these parts belong to.
    pub party: String,
    /// The link to the other parties.
    pub link: C,
    /// The party's virtual machine.
    pub vm: Box<dyn ShareVm>,
    /// The party's compiler (exercised on rank 0 only).
    pub compiler: Box<dyn Compiler>,
    /// The party's PSI engine.
    pub psi: Box<dyn PsiEngine<C>>,
    /// The party's PIR engine.
    pub pir: Box<dyn PirEngine<C>>,
}

enum Request {
    InfeedShares {
        value: Tree<Vec<u8>>,
        reply: oneshot::Sender<Tree<String>>,
    },
    InfeedPlain {
        value: Tree<PlainValue>,
        reply: oneshot::Sender<Result<(Tree<ValueMeta>, Tree<String>), RuntimeError>>,
    },
    Outfeed {
        names: Tree<String>,
        reply: oneshot::Sender<Result<Tree<Vec<u8>>, RuntimeError>>,
    },
    // no reply: deletion is best-effort cleanup
    Delete {
        names: Tree<String>,
    },
    Compile {
        function: Function,
        args: Vec<ArgSpec>,
        reply: oneshot::Sender<Result<CompileOutput, CompileError>>,
    },
    Run {
        policy: ReturnArity,
        output_shape: TreeShape,
        executable: Executable,
        inputs: Vec<String>,
        reply: oneshot::Sender<Result<(Vec<ValueMeta>, Vec<String>), RuntimeError>>,
    },
    Dump {
        meta: Tree<ValueMeta>,
        names: Tree<String>,
        path: PathBuf,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Load {
        path: PathBuf,
        reply: oneshot::Sender<Result<(Tree<ValueMeta>, Tree<String>), RuntimeError>>,
    },
    PsiCsv {
        config: PsiConfig,
        reply: oneshot::Sender<Result<PsiReport, PsiError>>,
    },
    PsiJoinCsv {
        config: PsiJoinConfig,
        reply: oneshot::Sender<Result<PsiJoinReport, PsiError>>,
    },
    PirSetup {
        config: PirSetupConfig,
        reply: oneshot::Sender<Result<PirReport, PirError>>,
    },
    PirQuery {
        config: PirQueryConfig,
        reply: oneshot::Sender<Result<PirReport, PirError>>,
    },
    Shutdown,
}

struct PartyActor<C> {
    topology: ClusterTopology,
    runtime: PartyRuntime,
    link: C,
    transfer: TransferConfig,
    psi: Box<dyn PsiEngine<C>>,
    pir: Box<dyn PirEngine<C>>,
    requests: mpsc::Receiver<Request>,
}

impl<C: Channel + Send> PartyActor<C> {
    async fn run(mut self) {
        let rank = self.runtime.rank();
        while let Some(request) = self.requests.recv().await {
            match request {
                Request::InfeedShares { value, reply } => {
                    let _ = reply.send(self.runtime.infeed(value));
                }
                Request::InfeedPlain { value, reply } => {
                    let _ = reply.send(self.runtime.infeed_plain(&value));
                }
                Request::Outfeed { names, reply } => {
                    let _ = reply.send(self.runtime.outfeed(&names));
                }
                Request::Delete { names } => {
                    self.runtime.delete(&names);
                }
                Request::Compile {
                    function,
                    args,
                    reply,
                } => {
                    let _ = reply.send(self.runtime.compiler().compile(&function, &args));
                }
                Request::Run {
                    policy,
                    output_shape,
                    executable,
                    inputs,
                    reply,
                } => {
                    let result = self
                        .runtime
                        .run(policy, &output_shape, executable, &inputs);
                    let _ = reply.send(result);
                }
                Request::Dump { meta, names, path, reply } => {
                    let _ = reply.send(self.runtime.dump(&meta, &names, &path).await);
                }
                Request::Load { path, reply } => {
                    let _ = reply.send(self.runtime.load(&path).await);
                }
                Request::PsiCsv { config, reply } => {
                    let result = psi::psi_csv(
                        &self.topology,
                        rank,
                        &mut self.link,
                        self.psi.as_ref(),
                        &config,
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Request::PsiJoinCsv { config, reply } => {
                    let result = psi::psi_join_csv(
                        &self.topology,
                        rank,
                        &mut self.link,
                        self.psi.as_ref(),
                        &self.transfer,
                        &config,
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Request::PirSetup { config, reply } => {
                    let result =
                        pir::pir_setup(&self.topology, rank, self.pir.as_ref(), &config).await;
                    let _ = reply.send(result);
                }
                Request::PirQuery { config, reply } => {
                    let result = pir::pir_query(
                        &self.topology,
                        rank,
                        &mut self.link,
                        self.pir.as_ref(),
                        &config,
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Request::Shutdown => break,
            }
        }
        debug!(rank, "party actor stopped");
    }
}

struct PartyHandle {
    name: String,
    requests: mpsc::Sender<Request>,
}

impl PartyHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, CallError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| CallError::PartyFailure {
                party: self.name.clone(),
            })?;
        response.await.map_err(|_| CallError::PartyFailure {
            party: self.name.clone(),
        })
    }
}

/// The virtual device assembled from all parties of a cluster.
pub struct Device {
    topology: ClusterTopology,
    parties: Vec<PartyHandle>,
    call_seq: AtomicU64,
}

impl Device {
    /// Validates the descriptor and spawns one actor task per party. The
    /// parts are matched to their parties by name, so they can be supplied
    /// in any order; every party of the descriptor needs exactly one set of
    /// parts.
    pub fn spawn<C: Channel + Send + 'static>(
        descriptor: ClusterDescriptor,
        transfer: TransferConfig,
        parts: Vec<PartyParts<C>>,
    ) -> Result<Self, CallError> {
        let topology = ClusterTopology::from_descriptor(descriptor)?;
        if parts.len() != topology.world_size() {
            return Err(ConfigError::InvalidParameter {
                name: "parts".into(),
                reason: format!(
                    "{} sets of party parts for a cluster of {} parties",
                    parts.len(),
                    topology.world_size()
                ),
            }
            .into());
        }
        let mut slots: Vec<Option<PartyParts<C>>> =
            (0..topology.world_size()).map(|_| None).collect();
        for p in parts {
            let rank = topology.rank_of(&p.party)?;
            if slots[rank].is_some() {
                return Err(ConfigError::DuplicateParty(p.party).into());
            }
            slots[rank] = Some(p);
        }

        let runtime_config = topology.runtime_config();
        let mut parties = Vec::with_capacity(topology.world_size());
        for (rank, slot) in slots.into_iter().enumerate() {
            let p = slot.expect("every rank was filled above");
            let (tx, rx) = mpsc::channel(32);
            let actor = PartyActor {
                topology: topology.clone(),
                runtime: PartyRuntime::new(rank, &p.party, runtime_config, p.vm, p.compiler),
                link: p.link,
                transfer,
                psi: p.psi,
                pir: p.pir,
                requests: rx,
            };
            tokio::spawn(actor.run());
            parties.push(PartyHandle {
                name: p.party,
                requests: tx,
            });
        }
        debug!(world_size = parties.len(), "device spawned");
        Ok(Device {
            topology,
            parties,
            call_seq: AtomicU64::new(0),
        })
    }

    /// The validated topology of this device.
    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    fn fresh_placeholders(meta: &Tree<ValueMeta>) -> Vec<String> {
        (0..meta.leaf_count())
            .map(|_| format!("in-{}", Uuid::new_v4()))
            .collect()
    }

    /// Feeds a plaintext value to every party as a public value.
    pub async fn infeed_plain(&self, value: Tree<PlainValue>) -> Result<SecretObject, CallError> {
        let results = try_join_all(self.parties.iter().map(|party| {
            let value = value.clone();
            async move {
                party
                    .request(|reply| Request::InfeedPlain { value, reply })
                    .await?
                    .map_err(CallError::from)
            }
        }))
        .await?;
        let mut meta = None;
        let mut shares = Vec::with_capacity(results.len());
        for (party_meta, names) in results {
            // rank 0's metadata is authoritative, the parties are identical
            meta.get_or_insert(party_meta);
            shares.push(names);
        }
        Ok(SecretObject {
            meta: meta.expect("at least one party"),
            shares,
            released: false,
        })
    }

    /// Feeds externally produced share bytes directly into the parties'
    /// stores. `shares` holds one tree per party, in rank order, all of the
    /// same shape as `meta`.
    pub async fn infeed_shares(
        &self,
        meta: Tree<ValueMeta>,
        shares: Vec<Tree<Vec<u8>>>,
    ) -> Result<SecretObject, CallError> {
        let expected = meta.leaf_count();
        if shares.len() != self.parties.len() {
            return Err(ConfigError::InvalidParameter {
                name: "shares".into(),
                reason: format!(
                    "{} share trees for {} parties",
                    shares.len(),
                    self.parties.len()
                ),
            }
            .into());
        }
        for (party, tree) in self.parties.iter().zip(&shares) {
            if tree.leaf_count() != expected {
                return Err(CallError::PartyDisagreement {
                    party: party.name.clone(),
                    expected,
                    actual: tree.leaf_count(),
                });
            }
        }
        let names = try_join_all(self.parties.iter().zip(shares).map(|(party, value)| {
            party.request(|reply| Request::InfeedShares { value, reply })
        }))
        .await?;
        Ok(SecretObject {
            meta,
            shares: names,
            released: false,
        })
    }

    /// Reads an object's share bytes back out of every party, in rank order.
    pub async fn outfeed_shares(
        &self,
        object: &SecretObject,
    ) -> Result<Vec<Tree<Vec<u8>>>, CallError> {
        if object.released {
            return Err(CallError::UseAfterRelease);
        }
        let shares = try_join_all(self.parties.iter().zip(&object.shares).map(
            |(party, names)| {
                let names = names.clone();
                async move {
                    party
                        .request(|reply| Request::Outfeed { names, reply })
                        .await?
                        .map_err(CallError::from)
                }
            },
        ))
        .await?;
        Ok(shares)
    }

    /// Releases an object's shares on every party, best-effort and
    /// idempotent. Parties that already stopped are skipped silently; a
    /// party whose request queue is momentarily full drops the delete with
    /// a warning, and those shares stay allocated until it shuts down.
    pub fn release(&self, object: &mut SecretObject) {
        if object.released {
            return;
        }
        object.released = true;
        self.release_handles(&object.shares);
    }

    fn release_handles(&self, shares: &[Tree<String>]) {
        for (party, names) in self.parties.iter().zip(shares) {
            let request = Request::Delete {
                names: names.clone(),
            };
            match party.requests.try_send(request) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(party = %party.name, "request queue full, share release dropped");
                }
            }
        }
    }

    /// Compiles `function` once on rank 0 and runs the executable on every
    /// party, returning the results as fresh device objects.
    ///
    /// Plaintext arguments are fed in as temporaries and released again
    /// after the call. The program is compiled from public metadata only.
    #[instrument(level = "debug", skip_all, fields(function = %function.name, call))]
    pub async fn call(
        &self,
        function: Function,
        args: Vec<CallArg<'_>>,
        policy: ReturnArity,
    ) -> Result<Vec<SecretObject>, CallError> {
        let call = self.call_seq.fetch_add(1, Ordering::Relaxed);
        tracing::Span::current().record("call", call);

        // materialize plaintext arguments as public temporaries
        let mut temporaries: Vec<Vec<Tree<String>>> = Vec::new();
        let mut metas: Vec<Tree<ValueMeta>> = Vec::with_capacity(args.len());
        let mut arg_shares: Vec<Vec<Tree<String>>> = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                CallArg::Device(object) => {
                    if object.released {
                        self.release_temporaries(temporaries);
                        return Err(CallError::UseAfterRelease);
                    }
                    metas.push(object.meta.clone());
                    arg_shares.push(object.shares.clone());
                }
                CallArg::Plain(value) => {
                    let object = match self.infeed_plain(value).await {
                        Ok(object) => object,
                        Err(e) => {
                            self.release_temporaries(temporaries);
                            return Err(e);
                        }
                    };
                    metas.push(object.meta.clone());
                    arg_shares.push(object.shares.clone());
                    temporaries.push(object.shares);
                }
            }
        }

        let result = self
            .compile_and_run(function, policy, &metas, &arg_shares)
            .await;
        self.release_temporaries(temporaries);
        result
    }

    fn release_temporaries(&self, temporaries: Vec<Vec<Tree<String>>>) {
        for shares in temporaries {
            self.release_handles(&shares);
        }
    }

    async fn compile_and_run(
        &self,
        function: Function,
        policy: ReturnArity,
        metas: &[Tree<ValueMeta>],
        arg_shares: &[Vec<Tree<String>>],
    ) -> Result<Vec<SecretObject>, CallError> {
        let specs: Vec<ArgSpec> = metas
            .iter()
            .map(|meta| ArgSpec {
                input_names: Self::fresh_placeholders(meta),
                meta: meta.clone(),
            })
            .collect();
        let output = self.parties[0]
            .request(|reply| Request::Compile {
                function,
                args: specs,
                reply,
            })
            .await??;
        let CompileOutput {
            executable,
            output_shape,
        } = output;

        // the executable must consume exactly the supplied argument leaves;
        // checked once here instead of failing on every party
        let input_count: usize = metas.iter().map(Tree::leaf_count).sum();
        if executable.input_names.len() != input_count {
            return Err(RuntimeError::ArityMismatch {
                expected: executable.input_names.len(),
                actual: input_count,
            }
            .into());
        }

        let output_shape = match policy {
            // the caller's declared count wins over the compiler's shape
            ReturnArity::FromUser(count) => {
                Tree::Node((0..count).map(|_| Tree::Leaf(())).collect())
            }
            ReturnArity::FromCompiler | ReturnArity::Single => output_shape,
        };
        debug!(
            outputs = executable.output_names.len(),
            leaves = output_shape.leaf_count(),
            "compiled, fanning out"
        );

        let results = try_join_all(self.parties.iter().enumerate().map(|(rank, party)| {
            let executable = executable.clone();
            let output_shape = output_shape.clone();
            let inputs: Vec<String> = arg_shares
                .iter()
                .flat_map(|shares| shares[rank].clone().flatten())
                .collect();
            async move {
                party
                    .request(|reply| Request::Run {
                        policy,
                        output_shape,
                        executable,
                        inputs,
                        reply,
                    })
                    .await?
                    .map_err(CallError::from)
            }
        }))
        .await?;

        self.assemble(policy, &output_shape, results)
    }

    /// Builds the returned objects out of the per-party run results. Rank
    /// 0's metadata is authoritative; every party must return the same
    /// number of handles.
    fn assemble(
        &self,
        policy: ReturnArity,
        output_shape: &TreeShape,
        results: Vec<(Vec<ValueMeta>, Vec<String>)>,
    ) -> Result<Vec<SecretObject>, CallError> {
        let (metas, _) = &results[0];
        let expected = metas.len();
        for (party, (_, names)) in self.parties.iter().zip(&results) {
            if names.len() != expected {
                return Err(CallError::PartyDisagreement {
                    party: party.name.clone(),
                    expected,
                    actual: names.len(),
                });
            }
        }

        if policy == ReturnArity::Single {
            let meta = Tree::unflatten(output_shape, metas.clone())
                .map_err(|_| RuntimeError::ArityMismatch {
                    expected: output_shape.leaf_count(),
                    actual: expected,
                })?;
            let mut shares = Vec::with_capacity(results.len());
            for (_, names) in &results {
                let names = Tree::unflatten(output_shape, names.clone())
                    .map_err(|_| RuntimeError::ArityMismatch {
                        expected: output_shape.leaf_count(),
                        actual: names.len(),
                    })?;
                shares.push(names);
            }
            return Ok(vec![SecretObject {
                meta,
                shares,
                released: false,
            }]);
        }

        // one object per output leaf
        let mut objects = Vec::with_capacity(expected);
        for i in 0..expected {
            objects.push(SecretObject {
                meta: Tree::Leaf(metas[i].clone()),
                shares: results
                    .iter()
                    .map(|(_, names)| Tree::Leaf(names[i].clone()))
                    .collect(),
                released: false,
            });
        }
        Ok(objects)
    }

    /// Persists an object on every party, one record file per party, in
    /// rank order.
    pub async fn dump(
        &self,
        object: &SecretObject,
        paths: Vec<PathBuf>,
    ) -> Result<(), CallError> {
        if object.released {
            return Err(CallError::UseAfterRelease);
        }
        if paths.len() != self.parties.len() {
            return Err(ConfigError::InvalidParameter {
                name: "paths".into(),
                reason: format!("{} paths for {} parties", paths.len(), self.parties.len()),
            }
            .into());
        }
        try_join_all(self.parties.iter().zip(paths).zip(&object.shares).map(
            |((party, path), names)| {
                let meta = object.meta.clone();
                let names = names.clone();
                async move {
                    party
                        .request(|reply| Request::Dump {
                            meta,
                            names,
                            path,
                            reply,
                        })
                        .await?
                        .map_err(CallError::from)
                }
            },
        ))
        .await?;
        Ok(())
    }

    /// Restores an object from per-party record files, in rank order. The
    /// parties' records must agree on the metadata.
    pub async fn load(&self, paths: Vec<PathBuf>) -> Result<SecretObject, CallError> {
        if paths.len() != self.parties.len() {
            return Err(ConfigError::InvalidParameter {
                name: "paths".into(),
                reason: format!("{} paths for {} parties", paths.len(), self.parties.len()),
            }
            .into());
        }
        let results = try_join_all(self.parties.iter().zip(paths).map(|(party, path)| {
            async move {
                party
                    .request(|reply| Request::Load { path, reply })
                    .await?
                    .map_err(CallError::from)
            }
        }))
        .await?;
        let meta = results[0].0.clone();
        let mut shares = Vec::with_capacity(results.len());
        for (party, (party_meta, names)) in self.parties.iter().zip(results) {
            if party_meta != meta {
                return Err(CallError::PartyDisagreement {
                    party: party.name.clone(),
                    expected: meta.leaf_count(),
                    actual: party_meta.leaf_count(),
                });
            }
            shares.push(names);
        }
        Ok(SecretObject {
            meta,
            shares,
            released: false,
        })
    }

    /// Runs a PSI over all parties, one config per party in rank order.
    /// Returns the reports in rank order.
    pub async fn psi_csv(&self, configs: Vec<PsiConfig>) -> Result<Vec<PsiReport>, CallError> {
        self.fan_out(configs, |config, reply| Request::PsiCsv { config, reply })
            .await
    }

    /// Runs a PSI join over all parties, one config per party in rank order.
    pub async fn psi_join_csv(
        &self,
        configs: Vec<PsiJoinConfig>,
    ) -> Result<Vec<PsiJoinReport>, CallError> {
        self.fan_out(configs, |config, reply| Request::PsiJoinCsv { config, reply })
            .await
    }

    /// Runs the offline PIR setup pass over all parties.
    pub async fn pir_setup(
        &self,
        configs: Vec<PirSetupConfig>,
    ) -> Result<Vec<PirReport>, CallError> {
        self.fan_out(configs, |config, reply| Request::PirSetup { config, reply })
            .await
    }

    /// Runs the online PIR query phase over all parties.
    pub async fn pir_query(
        &self,
        configs: Vec<PirQueryConfig>,
    ) -> Result<Vec<PirReport>, CallError> {
        self.fan_out(configs, |config, reply| Request::PirQuery { config, reply })
            .await
    }

    async fn fan_out<Cfg, T, E>(
        &self,
        configs: Vec<Cfg>,
        make: impl Fn(Cfg, oneshot::Sender<Result<T, E>>) -> Request + Copy,
    ) -> Result<Vec<T>, CallError>
    where
        CallError: From<E>,
    {
        if configs.len() != self.parties.len() {
            return Err(ConfigError::InvalidParameter {
                name: "configs".into(),
                reason: format!(
                    "{} configs for {} parties",
                    configs.len(),
                    self.parties.len()
                ),
            }
            .into());
        }
        try_join_all(self.parties.iter().zip(configs).map(|(party, config)| {
            async move {
                party
                    .request(|reply| make(config, reply))
                    .await?
                    .map_err(CallError::from)
            }
        }))
        .await
    }

    /// Stops all party actors. Objects still held become unusable.
    pub async fn shutdown(self) {
        for party in &self.parties {
            let _ = party.requests.send(Request::Shutdown).await;
        }
    }
}
