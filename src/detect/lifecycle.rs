//! Per-configuration deployment lifecycle
//!
//! UNDEPLOYED → MERGED_PENDING → PUBLISHED → MERGED_PENDING → PUBLISHED ...
//!
//! A run always leaves the configuration PUBLISHED: either a new version
//! is published or the deployed one is already identical. Published versions
//! are never overwritten in place.

use serde::{Deserialize, Serialize};

use super::{DeployedState, PublishDecision};

/// Lifecycle state of one named configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigState {
    /// No version has ever been published
    Undeployed,
    /// A merged document exists and awaits a publish decision
    MergedPending,
    /// The remote store holds a version matching the last merge
    Published,
}

impl ConfigState {
    /// Initial state as reported by the remote store
    pub fn from_deployed(deployed: Option<&DeployedState>) -> Self {
        match deployed {
            Some(state) if state.is_deployed() => ConfigState::Published,
            _ => ConfigState::Undeployed,
        }
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: ConfigState) -> bool {
        matches!(
            (self, target),
            (ConfigState::Undeployed, ConfigState::MergedPending)
                | (ConfigState::Published, ConfigState::MergedPending)
                | (ConfigState::MergedPending, ConfigState::Published)
        )
    }
}

/// Errors for lifecycle transitions
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: ConfigState, to: ConfigState },

    /// Skipping only makes sense when an identical version is deployed
    #[error("cannot skip publishing a configuration that was never published")]
    SkipUndeployed,
}

/// Tracks one configuration through a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLifecycle {
    /// State reported by the remote store when the run started
    pub initial: ConfigState,
    pub state: ConfigState,
    /// Whether this run published a new version
    pub published_new_version: bool,
}

impl ConfigLifecycle {
    pub fn new(deployed: Option<&DeployedState>) -> Self {
        let initial = ConfigState::from_deployed(deployed);
        Self {
            initial,
            state: initial,
            published_new_version: false,
        }
    }

    fn transition(&mut self, target: ConfigState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(target) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }

    /// A merged document was produced
    pub fn merged(&mut self) -> Result<(), LifecycleError> {
        self.transition(ConfigState::MergedPending)
    }

    /// Apply the change detector's verdict
    pub fn resolve(&mut self, decision: PublishDecision) -> Result<(), LifecycleError> {
        if !decision.is_publish() && self.initial == ConfigState::Undeployed {
            return Err(LifecycleError::SkipUndeployed);
        }
        self.transition(ConfigState::Published)?;
        self.published_new_version = decision.is_publish();
        Ok(())
    }
}
