//! Interception methods: how telepresence wires the probe into the cluster.
//!
//! The set of methods is closed and small, so this is an enum dispatched by
//! `match` rather than a trait object hierarchy. Each variant fixes a few
//! capability flags the tests key off of, plus its slice of the telepresence
//! argument vector.

use std::path::Path;
use std::str::FromStr;

use crate::config;

/// One strategy for intercepting traffic between the execution context and
/// the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Run the probe inside a Docker container sharing telepresence's
    /// network.
    Container,
    /// Inject a TCP-rewriting shim into the probe process.
    InjectTcp,
    /// Route the probe's traffic through a VPN-style tunnel.
    VpnTcp,
}

/// All methods, in matrix order.
pub const METHODS: [Method; 3] = [Method::Container, Method::InjectTcp, Method::VpnTcp];

impl Method {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::InjectTcp => "inject-tcp",
            Self::VpnTcp => "vpn-tcp",
        }
    }

    /// Why this method cannot run here, or `None` if it can.
    ///
    /// Only the container method has host prerequisites: it shells out to
    /// docker and socat, both of which must resolve on `$PATH`.
    #[must_use]
    pub fn unsupported(self) -> Option<String> {
        match self {
            Self::Container => {
                let missing: Vec<&str> = ["socat", "docker"]
                    .into_iter()
                    .filter(|exe| which::which(exe).is_err())
                    .collect();
                if missing.is_empty() {
                    None
                } else {
                    Some(format!(
                        "Required executables {missing:?} not found on $PATH"
                    ))
                }
            }
            Self::InjectTcp | Self::VpnTcp => None,
        }
    }

    /// Whether `command`, run inside this method's execution context, is
    /// known to fail with a clean error instead of hanging or crashing.
    #[must_use]
    pub fn command_has_graceful_failure(self, command: &str) -> bool {
        match self {
            Self::Container => false,
            Self::InjectTcp => {
                matches!(command, "ping" | "traceroute" | "nslookup" | "host" | "dig")
            }
            Self::VpnTcp => matches!(command, "ping" | "traceroute"),
        }
    }

    /// Whether loopback inside the execution context reaches the host.
    #[must_use]
    pub fn loopback_is_host(self) -> bool {
        match self {
            Self::Container => false,
            Self::InjectTcp | Self::VpnTcp => true,
        }
    }

    /// Whether environment variables set on the telepresence client process
    /// are visible inside the execution context.
    #[must_use]
    pub fn inherits_client_environment(self) -> bool {
        match self {
            Self::Container => false,
            Self::InjectTcp | Self::VpnTcp => true,
        }
    }

    /// This method's slice of the telepresence argument vector, pointed at
    /// the probe script.
    #[must_use]
    pub fn telepresence_args(self, probe_script: &Path) -> Vec<String> {
        match self {
            Self::Container => vec![
                "--method".to_string(),
                "container".to_string(),
                "--docker-run".to_string(),
                "--volume".to_string(),
                format!("{}:/probe.py", probe_script.display()),
                "python:3-alpine".to_string(),
                "python".to_string(),
                "/probe.py".to_string(),
            ],
            Self::InjectTcp | Self::VpnTcp => vec![
                "--method".to_string(),
                self.name().to_string(),
                "--run".to_string(),
                config::python(),
                probe_script.display().to_string(),
            ],
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container" => Ok(Self::Container),
            "inject-tcp" => Ok(Self::InjectTcp),
            "vpn-tcp" => Ok(Self::VpnTcp),
            other => Err(format!(
                "unknown method {other:?} (expected container, inject-tcp, or vpn-tcp)"
            )),
        }
    }
}
