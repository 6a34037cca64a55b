//! Node metadata and auxiliary service support.
//!
//! Builds the dynamic error table from the node's self-described schema
//! and probes the optional read-only auxiliary service.

pub mod error;
pub mod error_table;
pub mod metadata;
pub mod prober;

pub use error::{RegistryError, RegistryResult};
pub use error_table::{DecodedError, ErrorEntry, ErrorTable};
pub use metadata::{PalletMetadata, PalletsSection, TypeMetadata, TypesSection, VariantMetadata};
pub use prober::{AuxServiceClient, HttpProber, Probe};
