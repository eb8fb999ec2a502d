pub mod archive;
pub mod crypto;
pub mod workspace;

// Re-export commonly used types (used by the managers and the test crate)
pub use archive::{ArchiveArtifact, ArchiveError};
pub use crypto::CryptoError;
pub use workspace::{Workspace, WorkspaceError};
