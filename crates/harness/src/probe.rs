//! Probe lifecycle: run one Method × Operation cell exactly once, cache the
//! decoded result, and guarantee teardown of everything that was started.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde_json::Value;
use tracing::{info, warn};

use crate::cluster;
use crate::deployment::{self, DesiredEnvironment};
use crate::error::ProbeError;
use crate::ident::{random_name, ResourceIdent};
use crate::invoker::{ProbeDirectives, ProbeInvoker};
use crate::method::Method;
use crate::operation::Operation;

/// An environment variable set on the telepresence client process. Methods
/// that claim not to propagate the client environment must not leak it into
/// the execution context.
pub const CLIENT_ENV_VAR: &str = "SHOULD_NOT_BE_SET";

/// Commands that interact badly with interception and whose failure mode we
/// care about being graceful.
pub const QUESTIONABLE_COMMANDS: [&str; 5] = ["ping", "traceroute", "nslookup", "host", "dig"];

/// Paths relative to $TELEPRESENCE_ROOT the probe reads and returns.
pub const INTERESTING_PATHS: [&str; 2] = [
    "podinfo/labels",
    "var/run/secrets/kubernetes.io/serviceaccount/ca.crt",
];

/// Environment injected into the provisioned deployment's container.
#[must_use]
pub fn desired_environment() -> DesiredEnvironment {
    // The container method cannot carry multi-line values, so everything
    // here stays single-line or the whole container column fails.
    let mut environ = DesiredEnvironment::new();
    environ.insert("MYENV".to_string(), "hello".to_string());
    environ.insert("EXAMPLE_ENVFROM".to_string(), "foobar".to_string());
    environ
}

/// The decoded outcome of one probe run.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Name of the in-cluster webserver the harness created for this run.
    pub webserver_name: String,
    /// The probe's JSON payload.
    pub result: Value,
}

type CleanupAction = Box<dyn FnOnce() + Send>;

/// Runs a ProbeInvoker at most once, caches the result, and owns the
/// cleanup stack for every resource the run acquired.
pub struct Probe {
    method: Method,
    operation: Operation,
    probe_script: PathBuf,
    cleanup: Vec<CleanupAction>,
    result: Option<ProbeResult>,
    /// URL of the host-local server, set once the probe has launched.
    pub loopback_url: Option<String>,
}

impl Probe {
    #[must_use]
    pub fn new(method: Method, operation: Operation, probe_script: PathBuf) -> Self {
        Self {
            method,
            operation,
            probe_script,
            cleanup: Vec::new(),
            result: None,
            loopback_url: None,
        }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Provision, invoke, and decode, at most once. Repeated calls return
    /// the cached result without touching the cluster again.
    ///
    /// # Errors
    ///
    /// [`ProbeError::Unsupported`] before anything is provisioned if the
    /// method cannot run here; otherwise any error from provisioning,
    /// invocation, or decoding. Cleanup actions registered before the
    /// failure still run when [`Probe::cleanup`] is called.
    pub fn result(&mut self) -> Result<&ProbeResult, ProbeError> {
        if self.result.is_none() {
            if let Some(reason) = self.method.unsupported() {
                return Err(ProbeError::Unsupported(reason));
            }
            info!(probe = %self, "Launching");
            let result = self.launch()?;
            self.result = Some(result);
        }
        // Cached just above on the None path.
        Ok(self.result.as_ref().unwrap())
    }

    fn launch(&mut self) -> Result<ProbeResult, ProbeError> {
        let local_port = find_free_port()?;
        let loopback_url = format!("http://localhost:{local_port}/");
        self.start_local_webserver(local_port)?;
        self.loopback_url = Some(loopback_url.clone());

        let ident = ResourceIdent::new(random_name(""), random_name(""));
        cluster::create_namespace(&ident.namespace, &ident.name)?;
        self.defer({
            let namespace = ident.namespace.clone();
            move || {
                if let Err(e) = cluster::delete_namespace(&namespace) {
                    warn!(namespace = %namespace, "Namespace cleanup failed: {e}");
                }
            }
        });

        // Created before the deployment on purpose: the environment
        // Kubernetes hands a new pod reflects the services that exist at
        // pod creation time, and the tests inspect exactly that.
        let webserver_name = cluster::run_webserver(&ident.namespace)?;

        self.operation
            .prepare_deployment(&ident, &desired_environment())?;
        info!(deployment = %ident, "Prepared deployment");
        self.defer({
            let ident = ident.clone();
            move || {
                if let Err(e) = deployment::delete(&ident) {
                    warn!(deployment = %ident, "Deployment cleanup failed: {e}");
                }
            }
        });

        let directives = ProbeDirectives {
            urls: vec![loopback_url],
            commands: QUESTIONABLE_COMMANDS.iter().map(|s| (*s).to_string()).collect(),
            paths: INTERESTING_PATHS.iter().map(|s| (*s).to_string()).collect(),
        };
        let client_environment = vec![(CLIENT_ENV_VAR.to_string(), "FOO".to_string())];

        let invoker = ProbeInvoker::new(self.method, self.operation, self.probe_script.clone());
        let result = invoker.run(&ident, &directives, &client_environment)?;

        Ok(ProbeResult {
            webserver_name,
            result,
        })
    }

    /// Start a host-local HTTP server the probe can reach (or fail to
    /// reach) through loopback, serving the probe script's directory.
    fn start_local_webserver(&mut self, port: u16) -> Result<(), ProbeError> {
        let serve_dir = self
            .probe_script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);

        let port_arg = port.to_string();
        let mut child = Command::new(crate::config::python())
            .args(["-m", "http.server", port_arg.as_str()])
            .current_dir(serve_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ProbeError::io("local http.server"))?;

        self.defer(move || {
            if let Err(e) = child.kill() {
                warn!("Local webserver kill failed: {e}");
            }
            if let Err(e) = child.wait() {
                warn!("Local webserver wait failed: {e}");
            }
        });
        Ok(())
    }

    fn defer(&mut self, action: impl FnOnce() + Send + 'static) {
        self.cleanup.push(Box::new(action));
    }

    /// Run every registered cleanup action. Each action runs at most once;
    /// calling this again (or never having called [`Probe::result`]) is a
    /// no-op. Failures are logged, not propagated, so one stuck resource
    /// cannot strand the rest.
    pub fn cleanup(&mut self) {
        if !self.cleanup.is_empty() {
            info!(probe = %self, "Cleaning up");
        }
        for action in self.cleanup.drain(..) {
            action();
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        // Backstop for tests that panic before their teardown runs.
        self.cleanup();
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Probe[{}, {}]", self.method, self.operation)
    }
}

/// Ask the OS for a free TCP port.
///
/// Binding to port 0 reserves a distinct port per concurrently running
/// probe; there is still a window between dropping the listener and the
/// server binding it, which we share with every other user of this pattern.
fn find_free_port() -> Result<u16, ProbeError> {
    let listener =
        TcpListener::bind(("127.0.0.1", 0)).map_err(ProbeError::io("allocating local port"))?;
    let port = listener
        .local_addr()
        .map_err(ProbeError::io("allocating local port"))?
        .port();
    Ok(port)
}
