//! The local half of a PSI join: key projection, the chunked inner join
//! against a received key set, and the external stable sort that finalizes
//! the joined file.
//!
//! The files are comma-delimited with a header line. Tabular I/O beyond
//! line/field splitting and the sort tool itself are black-box
//! collaborators; this module only orchestrates them.

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
    process::Command,
};
use tracing::debug;

/// The number of rows processed per chunk during the local join, bounding
/// memory for large inputs.
pub const JOIN_CHUNK_ROWS: usize = 100_000;

/// The error raised by the local join pipeline.
#[derive(Debug, Error)]
pub enum JoinError {
    /// A key column is not present in the file header.
    #[error("key column `{0}` not found in the input header")]
    MissingKeyColumn(String),
    /// The input file is empty or otherwise malformed.
    #[error("malformed input file: {0}")]
    Format(String),
    /// The external sort tool exited with a nonzero status.
    #[error("external sort failed with exit code {code}")]
    ExternalToolFailure {
        /// The sort tool's exit code.
        code: i32,
    },
    /// A file could not be read or written.
    #[error("join file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

fn split_row(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

fn key_of(fields: &[&str], key_idx: &[usize]) -> String {
    key_idx
        .iter()
        .map(|&i| fields.get(i).copied().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(",")
}

/// Reads the header line of a comma-delimited file.
pub async fn read_header(path: impl AsRef<Path>) -> Result<Vec<String>, JoinError> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let header = lines
        .next_line()
        .await?
        .ok_or_else(|| JoinError::Format("missing header line".into()))?;
    Ok(split_row(&header).into_iter().map(String::from).collect())
}

/// Resolves key column names to zero-based positions in the header.
pub fn key_positions(header: &[String], keys: &[String]) -> Result<Vec<usize>, JoinError> {
    keys.iter()
        .map(|key| {
            header
                .iter()
                .position(|column| column == key)
                .ok_or_else(|| JoinError::MissingKeyColumn(key.clone()))
        })
        .collect()
}

/// Writes the key columns of `input` to `output`, dropping duplicate key
/// tuples while preserving first-occurrence order. Returns the number of
/// data rows in the input.
pub async fn project_keys(
    input: impl AsRef<Path>,
    keys: &[String],
    output: impl AsRef<Path>,
) -> Result<u64, JoinError> {
    let header = read_header(&input).await?;
    let key_idx = key_positions(&header, keys)?;
    let file = File::open(&input).await?;
    let mut lines = BufReader::new(file).lines();
    lines.next_line().await?; // header

    let out = File::create(output).await?;
    let mut writer = BufWriter::new(out);
    writer.write_all(keys.join(",").as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut seen = HashSet::new();
    let mut rows = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        rows += 1;
        let key = key_of(&split_row(&line), &key_idx);
        if seen.insert(key.clone()) {
            writer.write_all(key.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    debug!(rows, unique = seen.len(), "projected join keys");
    Ok(rows)
}

/// Reads the key tuples of a key-only file (header skipped) into a set.
pub async fn read_key_set(path: impl AsRef<Path>) -> Result<HashSet<String>, JoinError> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    lines.next_line().await?; // header
    let mut keys = HashSet::new();
    while let Some(line) = lines.next_line().await? {
        if !line.is_empty() {
            keys.insert(split_row(&line).join(","));
        }
    }
    Ok(keys)
}

/// Performs the local inner join: every row of `input` whose key tuple is in
/// `peer_keys` is appended to `output` (which already carries the header).
/// Rows are processed `chunk_rows` at a time to bound memory. Returns the
/// join count.
pub async fn inner_join_chunked(
    input: impl AsRef<Path>,
    key_idx: &[usize],
    peer_keys: &HashSet<String>,
    output: impl AsRef<Path>,
    chunk_rows: usize,
) -> Result<u64, JoinError> {
    let file = File::open(input).await?;
    let mut lines = BufReader::new(file).lines();
    lines.next_line().await?; // header

    let out = OpenOptions::new().append(true).open(output).await?;
    let mut writer = BufWriter::new(out);
    let mut chunk: Vec<String> = Vec::with_capacity(chunk_rows);
    let mut join_count = 0u64;
    loop {
        let line = lines.next_line().await?;
        let done = line.is_none();
        if let Some(line) = line
            && !line.is_empty()
            && peer_keys.contains(&key_of(&split_row(&line), key_idx))
        {
            chunk.push(line);
        }
        if chunk.len() >= chunk_rows || done {
            join_count += chunk.len() as u64;
            for row in chunk.drain(..) {
                writer.write_all(row.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            writer.flush().await?;
        }
        if done {
            break;
        }
    }
    Ok(join_count)
}

/// Stably sorts the body of `unsorted` by the given zero-based key column
/// positions, writing header plus sorted body to `output`. The sort itself
/// is delegated to the external `sort` tool; a nonzero exit aborts the join
/// with the tool's exit code.
pub async fn sort_by_keys(
    unsorted: impl AsRef<Path>,
    output: impl AsRef<Path>,
    key_idx: &[usize],
) -> Result<(), JoinError> {
    let unsorted = unsorted.as_ref();
    let output = output.as_ref();

    // split the header off, since the sort tool must only see the body
    let file = File::open(unsorted).await?;
    let mut lines = BufReader::new(file).lines();
    let header = lines
        .next_line()
        .await?
        .ok_or_else(|| JoinError::Format("missing header line".into()))?;
    let body_path = unsorted.with_extension("body");
    {
        let body = File::create(&body_path).await?;
        let mut writer = BufWriter::new(body);
        while let Some(line) = lines.next_line().await? {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
    }

    let mut out = File::create(output).await?;
    out.write_all(header.as_bytes()).await?;
    out.write_all(b"\n").await?;
    let out = out.into_std().await;

    let mut command = Command::new("sort");
    command
        .env("LC_ALL", "C")
        .arg("--stable")
        .arg("--field-separator=,");
    for &i in key_idx {
        // the sort tool counts key positions from 1
        let position = i + 1;
        command.arg(format!("--key={position},{position}"));
    }
    let status = command
        .arg(&body_path)
        .stdout(Stdio::from(out))
        .status()
        .await?;
    tokio::fs::remove_file(&body_path).await?;
    if !status.success() {
        return Err(JoinError::ExternalToolFailure {
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}
