//! Execution backend abstraction.
//!
//! The [`Backend`] trait is the only capability the step controller needs:
//! capture the target display and run an action script against it. Two
//! independent implementations exist ([`LocalBackend`] and [`RemoteBackend`]);
//! [`AnyBackend`] binds exactly one of them for the lifetime of a session.

use anyhow::Result;
use tracing::info;

use crate::core::types::{BackendKind, Platform};
use crate::io::config::PilotConfig;
use crate::io::local::LocalBackend;
use crate::io::remote::RemoteBackend;

/// Capture surface plus action executor for one target environment.
pub trait Backend {
    /// Platform identifier passed to the decision policy. Resolved once.
    fn platform(&self) -> Platform;

    fn kind(&self) -> BackendKind;

    /// Encoded still image of the target display, taken now.
    fn screenshot(&self) -> Result<Vec<u8>>;

    /// Run an opaque action script. Failures surface as errors.
    fn exec(&self, script: &str) -> Result<()>;
}

/// The backend variant selected at startup.
pub enum AnyBackend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

impl AnyBackend {
    /// Construct the single backend selected by `cfg.use_remote`.
    ///
    /// Only the selected variant is constructed. Failing here is fatal for the session.
    pub fn from_config(cfg: &PilotConfig) -> Result<Self> {
        let backend = match cfg.backend_kind() {
            BackendKind::Local => AnyBackend::Local(LocalBackend::new(cfg.local.clone())),
            BackendKind::Remote => AnyBackend::Remote(RemoteBackend::connect(&cfg.remote)?),
        };
        info!(kind = %backend.kind(), platform = %backend.platform(), "backend ready");
        Ok(backend)
    }
}

impl Backend for AnyBackend {
    fn platform(&self) -> Platform {
        match self {
            AnyBackend::Local(backend) => backend.platform(),
            AnyBackend::Remote(backend) => backend.platform(),
        }
    }

    fn kind(&self) -> BackendKind {
        match self {
            AnyBackend::Local(backend) => backend.kind(),
            AnyBackend::Remote(backend) => backend.kind(),
        }
    }

    fn screenshot(&self) -> Result<Vec<u8>> {
        match self {
            AnyBackend::Local(backend) => backend.screenshot(),
            AnyBackend::Remote(backend) => backend.screenshot(),
        }
    }

    fn exec(&self, script: &str) -> Result<()> {
        match self {
            AnyBackend::Local(backend) => backend.exec(script),
            AnyBackend::Remote(backend) => backend.exec(script),
        }
    }
}
