//! The interface boundary to the MPC virtual machine and its compiler.
//!
//! The coordinator never performs secret-sharing arithmetic itself: programs
//! are compiled and executed by external collaborators behind the
//! [`Compiler`] and [`ShareVm`] traits. What crosses the boundary is public
//! metadata ([`VarMeta`], [`ValueMeta`]), opaque share bytes and opaque
//! compiled programs ([`Executable`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::{Tree, TreeShape};

/// Whether a value is known to all parties or secret-shared between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// The value is known identically to all parties.
    Public,
    /// The value is split into shares, none of which reveals it.
    Secret,
}

/// The element type of an array value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum ElementType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

/// The MPC protocol variant the virtual device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Protocol {
    Semi2k,
    Aby3,
    Cheetah,
}

/// The width of the arithmetic field shares are computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum FieldWidth {
    Fm32,
    Fm64,
    Fm128,
}

/// The per-variable metadata reported by the virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarMeta {
    /// The dimensions of the array value.
    pub shape: Vec<u64>,
    /// The element type of the array value.
    pub dtype: ElementType,
    /// Whether the value is public or secret-shared.
    pub visibility: Visibility,
}

/// The metadata of a single device value leaf.
///
/// Extends [`VarMeta`] with the runtime configuration the value was produced
/// under, so consumers can check that an object is compatible with the
/// device that is asked to consume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMeta {
    /// The dimensions of the array value.
    pub shape: Vec<u64>,
    /// The element type of the array value.
    pub dtype: ElementType,
    /// Whether the value is public or secret-shared.
    pub visibility: Visibility,
    /// The protocol variant of the producing runtime.
    pub protocol: Protocol,
    /// The field width of the producing runtime.
    pub field: FieldWidth,
    /// The fixed-point fraction bits of the producing runtime.
    pub fraction_bits: u32,
}

/// A plaintext array value, as provided by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainValue {
    /// The dimensions of the array value.
    pub shape: Vec<u64>,
    /// The element type of the array value.
    pub dtype: ElementType,
    /// The raw little-endian element bytes.
    pub data: Vec<u8>,
}

/// A compiled program over named input/output share handles, run identically
/// by every party.
///
/// Produced once centrally from public metadata only, then rewritten per
/// invocation with fresh input/output handle names before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Executable {
    /// Ordered share-handle placeholders bound to the arguments.
    pub input_names: Vec<String>,
    /// Ordered share-handle placeholders for the outputs.
    pub output_names: Vec<String>,
    /// The opaque compiled program.
    pub program: Vec<u8>,
}

/// An opaque user function handed to the compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// A human-readable name, used in logs only.
    pub name: String,
    /// The function body in whatever representation the compiler expects.
    pub body: Vec<u8>,
}

/// One argument descriptor passed to the compiler: a placeholder name per
/// leaf plus the (public) metadata tree.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Fresh placeholder names, one per leaf of `meta`.
    pub input_names: Vec<String>,
    /// The argument's metadata tree, including visibility tags.
    pub meta: Tree<ValueMeta>,
}

/// The result of compiling a [`Function`].
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The compiled program.
    pub executable: Executable,
    /// The nesting of the function's outputs; its leaves correspond
    /// one-to-one to `executable.output_names`.
    pub output_shape: TreeShape,
}

/// The error raised when the compiler rejects a program.
///
/// Compilation failure is fatal to the whole device call: all parties must
/// run byte-identical programs, so a program rejected by the compiling party
/// cannot be salvaged by the others.
#[derive(Debug, Error)]
#[error("compilation of `{function}` failed: {reason}")]
pub struct CompileError {
    /// The name of the rejected function.
    pub function: String,
    /// The compiler's rejection message.
    pub reason: String,
}

/// The error raised by the virtual machine.
#[derive(Debug, Error)]
pub enum VmError {
    /// A program could not be executed.
    #[error("program execution failed: {0}")]
    Execution(String),
    /// A value could not be encoded into share bytes.
    #[error("value could not be encoded: {0}")]
    Encoding(String),
}

/// The compiler that lowers a user function to an [`Executable`], using only
/// public metadata (never secret values).
pub trait Compiler: Send + Sync + 'static {
    /// Compiles `function` against the argument metadata. The returned
    /// executable's `input_names` must equal the concatenated placeholder
    /// names of `args`, in order.
    fn compile(&self, function: &Function, args: &[ArgSpec]) -> Result<CompileOutput, CompileError>;
}

/// The MPC virtual machine of one party: encodes public values into the
/// party's share representation and executes compiled programs over shares.
pub trait ShareVm: Send + Sync + 'static {
    /// Encodes a plaintext value into the share bytes this party stores for
    /// a public value.
    fn encode_public(&self, value: &PlainValue) -> Result<Vec<u8>, VmError>;

    /// Executes a compiled program over the given input shares, returning
    /// one output per program output, in order.
    fn execute(&mut self, program: &[u8], inputs: &[Vec<u8>]) -> Result<Vec<VmOutput>, VmError>;
}

/// One output produced by [`ShareVm::execute`].
#[derive(Debug, Clone)]
pub struct VmOutput {
    /// The metadata of the output variable.
    pub meta: VarMeta,
    /// The output share bytes.
    pub share: Vec<u8>,
}
