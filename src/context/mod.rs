//! Execution-context guard for filesystem access.
//!
//! Every directory listing and file read made by the loader is gated behind
//! [`ExecutionContext::can_access_filesystem`]. When the host has no
//! filesystem (a browser-hosted `wasm32-unknown-unknown` build, for example)
//! the loader validates an empty configuration instead of failing.

/// Answers whether filesystem access is possible in the current process.
///
/// Implementations must be pure and give the same answer for the lifetime of
/// the process.
pub trait ExecutionContext: Send + Sync + std::fmt::Debug {
    fn can_access_filesystem(&self) -> bool;
}

/// Detects filesystem support from the compilation target.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostContext;

impl ExecutionContext for HostContext {
    fn can_access_filesystem(&self) -> bool {
        !cfg!(all(target_arch = "wasm32", target_os = "unknown"))
    }
}

/// A context with a fixed answer, for embedding and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticContext {
    filesystem: bool,
}

impl StaticContext {
    pub fn new(filesystem: bool) -> Self {
        Self { filesystem }
    }

    /// A context where the filesystem is never touched.
    pub fn no_filesystem() -> Self {
        Self::new(false)
    }
}

impl ExecutionContext for StaticContext {
    fn can_access_filesystem(&self) -> bool {
        self.filesystem
    }
}
