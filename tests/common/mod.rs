//! Collaborator stand-ins shared by the integration tests: a VM/compiler
//! pair that computes over plaintext "shares", a PSI engine that intersects
//! key sets in the clear over the party links, and a file-backed PIR engine.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

use shardev::channel::{Channel, SimpleChannel};
use shardev::cluster::{ClusterDescriptor, LinkConfig, PartySpec, RuntimeConfig};
use shardev::device::{Device, PartyParts};
use shardev::pir::{PirEngine, PirQueryRequest, PirServeRequest, PirSetupConfig};
use shardev::psi::{PsiCounts, PsiEngine, PsiExecRequest};
use shardev::transfer::TransferConfig;
use shardev::tree::Tree;
use shardev::vm::{
    ArgSpec, CompileError, CompileOutput, Compiler, ElementType, Executable, FieldWidth, Function,
    PlainValue, Protocol, ShareVm, VarMeta, Visibility, VmError, VmOutput,
};

/// Routes tracing output of the current test into the test harness,
/// filtered by `RUST_LOG`. Keep the guard alive for the test's duration.
pub fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

/// A VM whose "share" of a public value is simply the encoded value itself.
/// Programs (see [`MockCompiler`]) declare an output count; output `i`
/// echoes input `i % inputs`.
pub struct MockVm;

impl ShareVm for MockVm {
    fn encode_public(&self, value: &PlainValue) -> Result<Vec<u8>, VmError> {
        bincode::serialize(value).map_err(|e| VmError::Encoding(e.to_string()))
    }

    fn execute(&mut self, program: &[u8], inputs: &[Vec<u8>]) -> Result<Vec<VmOutput>, VmError> {
        let outputs: u32 = bincode::deserialize(program)
            .map_err(|e| VmError::Execution(format!("bad program: {e}")))?;
        if inputs.is_empty() && outputs > 0 {
            return Err(VmError::Execution("no inputs to echo".into()));
        }
        let mut produced = Vec::with_capacity(outputs as usize);
        for i in 0..outputs as usize {
            let share = inputs[i % inputs.len()].clone();
            let value: PlainValue = bincode::deserialize(&share)
                .map_err(|e| VmError::Execution(format!("bad input share: {e}")))?;
            produced.push(VmOutput {
                meta: VarMeta {
                    shape: value.shape,
                    dtype: value.dtype,
                    visibility: Visibility::Secret,
                },
                share,
            });
        }
        Ok(produced)
    }
}

/// Compiles a [`Function`] whose body is a bincode-encoded `u32` output
/// count. An empty body is rejected.
pub struct MockCompiler;

impl Compiler for MockCompiler {
    fn compile(&self, function: &Function, args: &[ArgSpec]) -> Result<CompileOutput, CompileError> {
        if function.body.is_empty() {
            return Err(CompileError {
                function: function.name.clone(),
                reason: "empty function body".into(),
            });
        }
        let outputs: u32 = bincode::deserialize(&function.body).map_err(|e| CompileError {
            function: function.name.clone(),
            reason: e.to_string(),
        })?;
        let input_names = args
            .iter()
            .flat_map(|arg| arg.input_names.iter().cloned())
            .collect();
        Ok(CompileOutput {
            executable: Executable {
                input_names,
                output_names: (0..outputs).map(|i| format!("out-{i}")).collect(),
                program: function.body.clone(),
            },
            output_shape: Tree::Node((0..outputs).map(|_| Tree::Leaf(())).collect()),
        })
    }
}

/// A function the [`MockCompiler`] accepts, declaring `outputs` outputs.
pub fn echo_function(name: &str, outputs: u32) -> Function {
    Function {
        name: name.into(),
        body: bincode::serialize(&outputs).unwrap(),
    }
}

/// A plaintext `u8` vector value.
pub fn plain(data: &[u8]) -> PlainValue {
    PlainValue {
        shape: vec![data.len() as u64],
        dtype: ElementType::U8,
        data: data.to_vec(),
    }
}

async fn read_key_tuples(
    input: &Path,
    key: &[String],
) -> Result<(i64, Vec<String>), String> {
    let content = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| e.to_string())?;
    let mut lines = content.lines().filter(|l| !l.is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or("missing header")?
        .split(',')
        .map(str::trim)
        .collect();
    let key_idx: Vec<usize> = key
        .iter()
        .map(|k| {
            header
                .iter()
                .position(|c| c == k)
                .ok_or(format!("key column `{k}` not found"))
        })
        .collect::<Result<_, _>>()?;
    let mut rows = 0i64;
    let mut tuples = Vec::new();
    for line in lines {
        rows += 1;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        tuples.push(
            key_idx
                .iter()
                .map(|&i| fields[i])
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    Ok((rows, tuples))
}

/// A two-party PSI engine that intersects the key sets in the clear: each
/// side sends its own key tuples over the link and intersects locally.
pub struct PlainPsi;

#[async_trait]
impl<C: Channel + Send> PsiEngine<C> for PlainPsi {
    async fn bucket_psi(
        &self,
        link: &mut C,
        self_rank: usize,
        request: &PsiExecRequest,
    ) -> Result<PsiCounts, String> {
        let peer = 1 - self_rank;
        let (rows, own) = read_key_tuples(&request.input_path, &request.key).await?;
        link.send_bytes_to(peer, bincode::serialize(&own).unwrap())
            .await
            .map_err(|e| format!("{e:?}"))?;
        let theirs: Vec<String> = bincode::deserialize(
            &link
                .recv_bytes_from(peer)
                .await
                .map_err(|e| format!("{e:?}"))?,
        )
        .map_err(|e| e.to_string())?;
        let theirs: HashSet<String> = theirs.into_iter().collect();
        let mut intersection: Vec<String> = own
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|tuple| theirs.contains(tuple))
            .collect();
        intersection.sort();

        let gets_result = request.broadcast_result || request.receiver_rank == self_rank;
        if gets_result {
            let mut out = request.key.join(",") + "\n";
            for tuple in &intersection {
                out.push_str(tuple);
                out.push('\n');
            }
            tokio::fs::write(&request.output_path, out)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(PsiCounts {
            original_count: rows,
            intersection_count: if gets_result {
                intersection.len() as i64
            } else {
                -1
            },
        })
    }
}

/// A PSI engine for tests that must never reach the engine.
pub struct UnreachablePsi;

#[async_trait]
impl<C: Channel + Send> PsiEngine<C> for UnreachablePsi {
    async fn bucket_psi(
        &self,
        _link: &mut C,
        _self_rank: usize,
        _request: &PsiExecRequest,
    ) -> Result<PsiCounts, String> {
        unreachable!("the engine must not be invoked in this test")
    }
}

#[derive(Serialize, Deserialize)]
struct PirSetupRecord {
    key_columns: Vec<String>,
    lines: Vec<String>,
}

/// A PIR engine that stores the server database as a JSON setup record and
/// answers queries in the clear over the link.
pub struct FilePir;

#[async_trait]
impl<C: Channel + Send> PirEngine<C> for FilePir {
    async fn setup(&self, config: &PirSetupConfig) -> Result<i64, String> {
        let content = tokio::fs::read_to_string(&config.input_path)
            .await
            .map_err(|e| e.to_string())?;
        let lines: Vec<String> = content
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        let record = PirSetupRecord {
            key_columns: config.key_columns.clone(),
            lines: lines.clone(),
        };
        tokio::fs::write(&config.setup_path, serde_json::to_vec(&record).unwrap())
            .await
            .map_err(|e| e.to_string())?;
        tokio::fs::write(&config.oprf_key_path, [0u8; 32])
            .await
            .map_err(|e| e.to_string())?;
        Ok(lines.len() as i64 - 1)
    }

    async fn serve(
        &self,
        link: &mut C,
        peer: usize,
        request: &PirServeRequest,
    ) -> Result<i64, String> {
        let encoded = tokio::fs::read(&request.setup_path)
            .await
            .map_err(|e| e.to_string())?;
        let record: PirSetupRecord = serde_json::from_slice(&encoded).map_err(|e| e.to_string())?;
        let queried: Vec<String> = bincode::deserialize(
            &link
                .recv_bytes_from(peer)
                .await
                .map_err(|e| format!("{e:?}"))?,
        )
        .map_err(|e| e.to_string())?;
        let queried: HashSet<String> = queried.into_iter().collect();

        let header: Vec<&str> = record.lines[0].split(',').map(str::trim).collect();
        let key_idx: Vec<usize> = record
            .key_columns
            .iter()
            .map(|k| header.iter().position(|c| c == k).unwrap())
            .collect();
        let mut response = vec![record.lines[0].clone()];
        for line in &record.lines[1..] {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let tuple = key_idx
                .iter()
                .map(|&i| fields[i])
                .collect::<Vec<_>>()
                .join(",");
            if queried.contains(&tuple) {
                response.push(line.clone());
            }
        }
        link.send_bytes_to(peer, bincode::serialize(&response).unwrap())
            .await
            .map_err(|e| format!("{e:?}"))?;
        Ok(record.lines.len() as i64 - 1)
    }

    async fn query(
        &self,
        link: &mut C,
        peer: usize,
        request: &PirQueryRequest,
    ) -> Result<i64, String> {
        let (_, tuples) = read_key_tuples(&request.input_path, &request.key_columns).await?;
        link.send_bytes_to(peer, bincode::serialize(&tuples).unwrap())
            .await
            .map_err(|e| format!("{e:?}"))?;
        let rows: Vec<String> = bincode::deserialize(
            &link
                .recv_bytes_from(peer)
                .await
                .map_err(|e| format!("{e:?}"))?,
        )
        .map_err(|e| e.to_string())?;
        tokio::fs::write(&request.output_path, rows.join("\n") + "\n")
            .await
            .map_err(|e| e.to_string())?;
        Ok(rows.len() as i64 - 1)
    }
}

/// A PIR engine for tests that must never reach the engine.
pub struct UnreachablePir;

#[async_trait]
impl<C: Channel + Send> PirEngine<C> for UnreachablePir {
    async fn setup(&self, _config: &PirSetupConfig) -> Result<i64, String> {
        unreachable!("the engine must not be invoked in this test")
    }

    async fn serve(&self, _: &mut C, _: usize, _: &PirServeRequest) -> Result<i64, String> {
        unreachable!("the engine must not be invoked in this test")
    }

    async fn query(&self, _: &mut C, _: usize, _: &PirQueryRequest) -> Result<i64, String> {
        unreachable!("the engine must not be invoked in this test")
    }
}

/// A descriptor for the given parties (names must already be sorted, so the
/// ranks are obvious in the tests) with a Semi2k/Fm128 runtime.
pub fn descriptor(names: &[&str]) -> ClusterDescriptor {
    assert!(names.windows(2).all(|w| w[0] < w[1]), "pass sorted names");
    ClusterDescriptor {
        parties: names
            .iter()
            .enumerate()
            .map(|(i, name)| PartySpec::new(*name, format!("127.0.0.1:{}", 9100 + i)))
            .collect(),
        runtime: RuntimeConfig {
            protocol: Protocol::Semi2k,
            field: FieldWidth::Fm128,
            fraction_bits: 18,
        },
    }
}

/// Spawns a device over an in-process channel mesh, with the mock VM and
/// compiler and the plaintext PSI/PIR engines on every party.
pub fn spawn_device(names: &[&str]) -> Device {
    let links = SimpleChannel::channels_from_config(names.len(), &LinkConfig::default());
    let parts = names
        .iter()
        .zip(links)
        .map(|(name, link)| PartyParts {
            party: name.to_string(),
            link,
            vm: Box::new(MockVm),
            compiler: Box::new(MockCompiler),
            psi: Box::new(PlainPsi),
            pir: Box::new(FilePir),
        })
        .collect();
    Device::spawn(descriptor(names), TransferConfig::default(), parts)
        .expect("device spawns")
}

/// Writes a CSV fixture, one line per slice entry.
pub async fn write_csv(path: &Path, lines: &[&str]) {
    tokio::fs::write(path, lines.join("\n") + "\n").await.unwrap();
}
