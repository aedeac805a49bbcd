//! End-to-end test harness for the Telepresence CLI.
//!
//! Runs telepresence under a matrix of interception [`Method`]s and
//! deployment [`Operation`]s, executes a probe script inside the intercepted
//! execution context, and scrapes the probe's JSON result out of the
//! combined log stream.
//!
//! # Example
//!
//! ```ignore
//! use telepresence_harness::{Method, Operation, Probe};
//!
//! let mut probe = Probe::new(Method::InjectTcp, Operation::Swap, probe_script);
//! let result = probe.result()?;
//! assert_eq!(result.result["probe-urls"][0][1], "hello");
//! probe.cleanup();
//! ```

pub mod cluster;
pub mod config;
pub mod deployment;
pub mod error;
pub mod ident;
pub mod invoker;
pub mod method;
pub mod operation;
pub mod probe;

pub use deployment::DesiredEnvironment;
pub use error::ProbeError;
pub use ident::ResourceIdent;
pub use invoker::{ProbeDirectives, ProbeInvoker, PROBE_DELIMITER};
pub use method::{Method, METHODS};
pub use operation::{Operation, OPERATIONS};
pub use probe::{Probe, ProbeResult};
