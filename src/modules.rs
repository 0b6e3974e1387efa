//! Module-source collaborator interface.
//!
//! Script-level imports are resolved by the host engine against its own
//! catalog-backed module store; this subsystem only defines the seam.

use crate::errors::PlScriptError;

pub trait ModuleSourceLoader {
    /// Returns the raw source bytes for a module path, or a resource error
    /// when the module does not exist.
    fn read_module_source(&self, path: &str) -> Result<Vec<u8>, PlScriptError>;
}
