//! Component assemblers.
//!
//! Each assembler declares its resources into a shared [`ResourceGraph`] and
//! returns the ids later assemblers need. None of them rely on being called
//! in a particular order beyond having their inputs available; ordering
//! between declarations is carried by graph edges.
//!
//! [`ResourceGraph`]: crate::graph::ResourceGraph

pub mod encryption;
pub mod governance;
pub mod processing;
pub mod registration;
pub mod storage;

pub use encryption::EncryptionOutputs;
pub use governance::GovernanceOutputs;
pub use processing::{DatasetResources, ProcessingOutputs};
pub use registration::RegistrationOutputs;
pub use storage::StorageOutputs;
