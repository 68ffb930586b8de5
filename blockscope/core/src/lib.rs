//! # Blockscope
//!
//! Blockscope is a monitoring agent for permissioned ledgers. It follows the channels of a peer,
//! decodes every block into block, transaction and write events, and publishes them to a document
//! index store. The `blockscope-core` crate provides the building blocks for embedding the agent
//! into other applications. Refer to the `blockscope` crate for the executable binary.

/// Block ingestor abstraction and built-in implementations.
pub mod block_ingestor;

/// Agent configuration.
pub mod config;

/// Index pattern and dashboard provisioning.
pub mod dashboard;

/// Ledger block and envelope decoding.
pub mod decoder;

pub mod errors;

/// Documents published to the index store.
pub mod events;

/// Block header hashing.
pub mod hasher;

/// Ledger client abstraction and built-in implementations.
pub mod ledger;

/// Chaincode linking keys.
pub mod linking;

/// Types related to handling long-running background services.
pub mod service;

/// Index store abstraction and built-in implementations.
pub mod storage;

/// Protobuf block fixtures for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Internal utilities.
mod utils;
