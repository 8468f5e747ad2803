//! A coordination layer for MPC virtual devices: N independent party
//! processes driven as one logical machine.
//!
//! The crate never performs secret-sharing arithmetic itself. Compilers,
//! virtual machines and the PSI/PIR protocols are external collaborators
//! behind traits; what this crate owns is everything around them:
//!
//! - the secret-shared object model: values live on the device as public
//!   metadata plus one opaque handle tree per party ([`device::SecretObject`])
//! - compile-once, dispatch-many execution: a program is compiled centrally
//!   from public metadata and then run by every party ([`device::Device::call`])
//! - the duplex chunked file transfer between two parties ([`transfer`])
//! - role- and rank-based configuration validation for PSI and PIR calls
//!   ([`psi`], [`pir`])
//!
//! ## Main Components
//!
//! * [`device`]: The [`device::Device`] front end that fans operations out
//!   to all parties and the party actor behind it.
//! * [`runtime`]: The per-party share store and program execution.
//! * [`cluster`]: Cluster descriptors, rank assignment and link
//!   configuration validation.
//! * [`channel`]: Communication abstractions for exchanging data between
//!   parties.
//!
//! ## Basic Usage
//!
//! To assemble a virtual device:
//!
//! 1. Write a [`cluster::ClusterDescriptor`] naming all parties and the
//!    shared runtime configuration
//! 2. Provide each party's collaborators as [`device::PartyParts`]: a link,
//!    a VM, a compiler and the PSI/PIR engines
//! 3. Spawn the device with [`device::Device::spawn`]
//! 4. Feed values in, run calls, read results back out
//!
//! For simulated environments (testing/development), the
//! [`channel::SimpleChannel`] mesh connects all parties in-process.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod cluster;
pub mod device;
pub mod join;
pub mod pir;
pub mod psi;
pub mod runtime;
pub mod transfer;
pub mod tree;
pub mod vm;
