//! Namespace and webserver collaborators provisioned around each run.

use std::process::Command;

use tracing::info;

use crate::config;
use crate::error::ProbeError;
use crate::ident::{random_name, ResourceIdent};

fn run_kubectl(args: &[&str], resource: &str) -> Result<(), ProbeError> {
    let output = Command::new(config::kubectl())
        .args(args)
        .output()
        .map_err(ProbeError::io(format!("kubectl {}", args.join(" "))))?;

    if !output.status.success() {
        return Err(ProbeError::Provisioning {
            resource: resource.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

/// Create the test namespace, labeled so stray namespaces from interrupted
/// runs can be garbage-collected out of band.
///
/// # Errors
///
/// Returns [`ProbeError::Provisioning`] if kubectl exits non-zero.
pub fn create_namespace(namespace: &str, label: &str) -> Result<(), ProbeError> {
    info!(namespace, "Creating namespace");
    run_kubectl(
        &["create", "namespace", namespace],
        &format!("namespace {namespace}"),
    )?;
    run_kubectl(
        &[
            "label",
            "namespace",
            namespace,
            &format!("telepresence-test={label}"),
        ],
        &format!("namespace {namespace} label"),
    )
}

/// Delete the test namespace and everything in it, tolerating "not found".
///
/// # Errors
///
/// Returns [`ProbeError::Provisioning`] if kubectl exits non-zero.
pub fn delete_namespace(namespace: &str) -> Result<(), ProbeError> {
    info!(namespace, "Deleting namespace");
    run_kubectl(
        &[
            "delete",
            "--ignore-not-found",
            "--wait=false",
            "namespace",
            namespace,
        ],
        &format!("namespace {namespace} (delete)"),
    )
}

/// Start an in-cluster web server and expose it as a service.
///
/// The probe observes side effects of this service (the environment
/// variables and DNS records Kubernetes generates for it) and talks to it
/// directly to demonstrate routing into the cluster. It must exist before
/// the target deployment is created, because the environment Kubernetes
/// hands a new pod reflects the services present at creation time.
///
/// Returns the randomized name shared by the pod and service.
///
/// # Errors
///
/// Returns [`ProbeError::Provisioning`] if kubectl exits non-zero.
pub fn run_webserver(namespace: &str) -> Result<String, ProbeError> {
    let name = random_name("web");
    info!(namespace, webserver = %name, "Starting webserver");

    run_kubectl(
        &[
            "run",
            "--namespace",
            namespace,
            &name,
            "--image=openshift/hello-openshift",
            "--port=8080",
            "--expose",
            "--labels",
            &format!("telepresence-test={name}"),
        ],
        &format!("webserver {namespace}/{name}"),
    )?;

    Ok(name)
}
