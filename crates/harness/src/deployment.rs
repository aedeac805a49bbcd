//! Create and delete the Deployment a test run targets.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::{json, Value};
use tracing::info;

use crate::config;
use crate::error::ProbeError;
use crate::ident::ResourceIdent;

/// Key/value pairs injected into the provisioned container's environment.
pub type DesiredEnvironment = BTreeMap<String, String>;

/// Build the Deployment manifest for a test target.
///
/// Two replicas so interception across multiple pods is exercised; pod
/// labels are exposed through a downward-API volume so the probe can read
/// them back out of the intercepted filesystem.
#[must_use]
pub fn deployment_manifest(
    ident: &ResourceIdent,
    image: &str,
    environ: &DesiredEnvironment,
) -> Value {
    let env: Vec<Value> = environ
        .iter()
        .map(|(k, v)| json!({"name": k, "value": v}))
        .collect();

    json!({
        "kind": "Deployment",
        "apiVersion": "apps/v1",
        "metadata": {
            "name": ident.name,
            "namespace": ident.namespace,
        },
        "spec": {
            "replicas": 2,
            "selector": {
                "matchLabels": {
                    "name": ident.name,
                },
            },
            "template": {
                "metadata": {
                    "labels": {
                        "name": ident.name,
                        "telepresence-test": ident.name,
                        "hello": "monkeys",
                    },
                },
                "spec": {
                    "volumes": [{
                        "name": "podinfo",
                        "downwardAPI": {
                            "items": [{
                                "path": "labels",
                                "fieldRef": {"fieldPath": "metadata.labels"},
                            }],
                        },
                    }],
                    "containers": [{
                        "name": "hello",
                        "image": image,
                        "env": env,
                        "volumeMounts": [{
                            "name": "podinfo",
                            "mountPath": "/podinfo",
                        }],
                    }],
                },
            },
        },
    })
}

/// Create the Deployment by piping its manifest into `kubectl create -f -`.
///
/// # Errors
///
/// Returns [`ProbeError::Provisioning`] if kubectl rejects the manifest or
/// exits non-zero.
pub fn create(
    ident: &ResourceIdent,
    image: &str,
    environ: &DesiredEnvironment,
) -> Result<(), ProbeError> {
    info!(deployment = %ident, image, "Creating deployment");

    let manifest = deployment_manifest(ident, image, environ).to_string();

    let mut child = Command::new(config::kubectl())
        .args(["create", "-f", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ProbeError::io("kubectl create"))?;

    if let Some(ref mut stdin) = child.stdin {
        stdin
            .write_all(manifest.as_bytes())
            .map_err(ProbeError::io("kubectl create stdin"))?;
    }

    let output = child
        .wait_with_output()
        .map_err(ProbeError::io("kubectl create"))?;

    if !output.status.success() {
        return Err(ProbeError::Provisioning {
            resource: format!("deployment {ident}"),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

/// Delete the Deployment, treating "not found" as success.
///
/// Runs unconditionally during teardown, so it must be idempotent.
///
/// # Errors
///
/// Returns [`ProbeError::Provisioning`] if kubectl exits non-zero for any
/// reason other than the resource already being gone.
pub fn delete(ident: &ResourceIdent) -> Result<(), ProbeError> {
    info!(deployment = %ident, "Deleting deployment");

    let output = Command::new(config::kubectl())
        .args([
            "delete",
            "--namespace",
            ident.namespace.as_str(),
            "--ignore-not-found",
            "deployment",
            ident.name.as_str(),
        ])
        .output()
        .map_err(ProbeError::io("kubectl delete"))?;

    if !output.status.success() {
        return Err(ProbeError::Provisioning {
            resource: format!("deployment {ident} (delete)"),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}
