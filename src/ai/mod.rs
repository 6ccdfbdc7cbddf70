//! AI-assisted plan generation.
//!
//! The engine only sees [`PlanGenerationPort`]. Whatever a port returns is a
//! candidate task list; it goes through the same graph validation as a
//! deterministic decomposition.
//!
//! ## Ports
//!
//! - [`ExternalCommandDecomposer`] - pipes the spec to a local program

mod command;

pub use command::ExternalCommandDecomposer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{Result, Spec, Task};

/// Candidate tasks produced by a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    pub tasks: Vec<Task>,

    /// Tokens consumed producing the tasks
    #[serde(default)]
    pub tokens_used: u64,
}

/// Turns a spec into candidate tasks.
#[async_trait]
pub trait PlanGenerationPort: Send + Sync {
    /// Decompose the spec. Must return [`CharterError::Cancelled`] promptly
    /// once `cancel` fires.
    ///
    /// [`CharterError::Cancelled`]: crate::core::CharterError::Cancelled
    async fn decompose_spec(&self, spec: &Spec, cancel: &CancellationToken)
        -> Result<Decomposition>;

    /// Name recorded on journal events.
    fn name(&self) -> &str;
}
