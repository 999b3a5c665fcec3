//! HTTP clients for the compute endpoint and the artifact store

pub mod compute;
pub mod store;

pub use compute::{ComputeClient, ComputeService};
pub use store::{ArtifactStore, ArtifactStoreClient};
