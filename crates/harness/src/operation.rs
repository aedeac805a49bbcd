//! Deployment operations: how the workload under interception is provisioned.

use std::str::FromStr;

use crate::config;
use crate::deployment::{self, DesiredEnvironment};
use crate::error::ProbeError;
use crate::ident::ResourceIdent;

/// One strategy for provisioning the deployment telepresence targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Target a pre-created deployment running the telepresence image.
    Existing,
    /// Swap out a pre-created deployment running an arbitrary image.
    Swap,
    /// Let telepresence create the deployment itself.
    New,
}

/// All operations, in matrix order.
pub const OPERATIONS: [Operation; 3] = [Operation::Existing, Operation::Swap, Operation::New];

impl Operation {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Swap => "swap",
            Self::New => "new",
        }
    }

    /// Whether the provisioned deployment's container environment is
    /// visible inside the execution context once intercepted. A deployment
    /// created by telepresence itself carries no caller-chosen environment.
    #[must_use]
    pub fn inherits_deployment_environment(self) -> bool {
        match self {
            Self::Existing | Self::Swap => true,
            Self::New => false,
        }
    }

    /// Create the target deployment, if this operation needs one to exist
    /// before telepresence runs.
    ///
    /// The existing operation pins the telepresence image to the client's
    /// own version; the swap operation uses a generic placeholder image
    /// since telepresence replaces it anyway.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Provisioning`] if the manifest is rejected.
    pub fn prepare_deployment(
        self,
        ident: &ResourceIdent,
        environ: &DesiredEnvironment,
    ) -> Result<(), ProbeError> {
        let image = match self {
            Self::Swap => "openshift/hello-openshift".to_string(),
            Self::Existing => {
                let version = config::telepresence_version().map_err(|e| {
                    ProbeError::Provisioning {
                        resource: format!("deployment {ident}"),
                        stderr: format!("{e:#}"),
                    }
                })?;
                format!("{}/telepresence-k8s:{}", config::registry(), version)
            }
            Self::New => return Ok(()),
        };
        deployment::create(ident, &image, environ)
    }

    /// This operation's slice of the telepresence argument vector.
    #[must_use]
    pub fn telepresence_args(self, ident: &ResourceIdent) -> Vec<String> {
        let option = match self {
            Self::Existing => "--deployment",
            Self::Swap => "--swap-deployment",
            Self::New => "--new-deployment",
        };
        vec![
            "--namespace".to_string(),
            ident.namespace.clone(),
            option.to_string(),
            ident.name.clone(),
        ]
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "existing" => Ok(Self::Existing),
            "swap" => Ok(Self::Swap),
            "new" => Ok(Self::New),
            other => Err(format!(
                "unknown operation {other:?} (expected existing, swap, or new)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_inheritance() {
        assert!(Operation::Existing.inherits_deployment_environment());
        assert!(Operation::Swap.inherits_deployment_environment());
        assert!(!Operation::New.inherits_deployment_environment());
    }

    #[test]
    fn test_args_select_deployment_flag() {
        let ident = ResourceIdent::new("testing-ns", "testing-dep");

        let existing = Operation::Existing.telepresence_args(&ident);
        assert_eq!(
            existing,
            ["--namespace", "testing-ns", "--deployment", "testing-dep"]
        );

        let swap = Operation::Swap.telepresence_args(&ident);
        assert_eq!(swap[2], "--swap-deployment");

        let new = Operation::New.telepresence_args(&ident);
        assert_eq!(new[2], "--new-deployment");
    }

    #[test]
    fn test_names_round_trip() {
        for operation in OPERATIONS {
            assert_eq!(operation.name().parse::<Operation>().unwrap(), operation);
        }
        assert!("replace".parse::<Operation>().is_err());
    }
}
