use thiserror::Error;

/// Internal transport errors. Never surfaced to the lifecycle engine
/// directly — every `RemoteExecutor` method collapses failure to `None`
/// per §4.C; this type exists so the real implementation can log with
/// detail before doing so.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("ssh transport error: {0}")]
    Transport(#[from] openssh::Error),

    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("command exited with non-zero status: {0}")]
    NonZeroExit(std::process::ExitStatus),

    #[error("remote stdout was not valid utf-8")]
    InvalidUtf8,
}
