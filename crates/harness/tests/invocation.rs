//! Invocation-contract tests against a fake telepresence CLI.
//!
//! A shell script stands in for the real binary so these tests can check
//! the subprocess contract (argument vector, environment overlay, merged
//! streams, failure reporting) without a cluster.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use serial_test::serial;
use tempfile::TempDir;

use telepresence_harness::error::ProbeError;
use telepresence_harness::invoker::{decode_probe_output, invoke_telepresence};

fn install_fake_cli(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("telepresence");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    std::env::set_var("TELEPRESENCE_BINARY", &path);
    path
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[test]
#[serial]
fn invocation_decodes_payload_from_noisy_streams() {
    let dir = TempDir::new().unwrap();
    install_fake_cli(
        dir.path(),
        r#"echo "T: Starting network proxy"
echo "T: stderr noise" >&2
printf '%s' '{probe delimiter}{"probe-urls": [["http://localhost:1/", "hello"]]}{probe delimiter}'
echo "T: Exit cleanup""#,
    );

    let output = invoke_telepresence(&args(&["--new-deployment", "x"]), &[]).unwrap();
    // stderr is merged into the same captured stream.
    assert!(output.contains("T: stderr noise"));
    assert!(output.contains("T: Starting network proxy"));

    let decoded = decode_probe_output(&output).unwrap();
    assert_eq!(decoded["probe-urls"][0][1], "hello");

    std::env::remove_var("TELEPRESENCE_BINARY");
}

#[test]
#[serial]
fn invocation_passes_logfile_flag_first() {
    let dir = TempDir::new().unwrap();
    install_fake_cli(
        dir.path(),
        r#"printf '{probe delimiter}{"first_arg": "%s"}{probe delimiter}' "$1""#,
    );

    let output = invoke_telepresence(&args(&["--namespace", "ns"]), &[]).unwrap();
    let decoded = decode_probe_output(&output).unwrap();
    assert_eq!(decoded["first_arg"], "--logfile=-");

    std::env::remove_var("TELEPRESENCE_BINARY");
}

#[test]
#[serial]
fn invocation_overlays_client_environment() {
    let dir = TempDir::new().unwrap();
    install_fake_cli(
        dir.path(),
        r#"printf '{probe delimiter}{"seen": "%s"}{probe delimiter}' "$SHOULD_NOT_BE_SET""#,
    );

    let client_env = vec![("SHOULD_NOT_BE_SET".to_string(), "FOO".to_string())];
    let output = invoke_telepresence(&args(&[]), &client_env).unwrap();
    let decoded = decode_probe_output(&output).unwrap();
    assert_eq!(decoded["seen"], "FOO");

    std::env::remove_var("TELEPRESENCE_BINARY");
}

#[test]
#[serial]
fn invocation_failure_carries_full_output() {
    let dir = TempDir::new().unwrap();
    install_fake_cli(
        dir.path(),
        r#"echo "T: something went wrong"
echo "T: details on stderr" >&2
exit 3"#,
    );

    match invoke_telepresence(&args(&["--deployment", "dep"]), &[]) {
        Err(ProbeError::Invocation {
            args,
            status,
            output,
        }) => {
            assert_eq!(status, 3);
            assert!(args.contains(&"--deployment".to_string()));
            assert!(output.contains("T: something went wrong"));
            assert!(output.contains("T: details on stderr"));
        }
        other => panic!("expected invocation failure, got {other:?}"),
    }

    std::env::remove_var("TELEPRESENCE_BINARY");
}

#[test]
#[serial]
fn version_query_uses_the_selected_binary() {
    let dir = TempDir::new().unwrap();
    install_fake_cli(
        dir.path(),
        r#"if [ "$1" = "--version" ]; then echo "9.9.9"; else exit 1; fi"#,
    );

    // The existing-deployment operation pins its image to this version, so
    // it must come from the same binary the invoker runs, not whatever
    // `telepresence` happens to be on $PATH.
    let version = telepresence_harness::config::telepresence_version().unwrap();
    assert_eq!(version, "9.9.9");

    std::env::remove_var("TELEPRESENCE_BINARY");
}

#[test]
#[serial]
fn invocation_does_not_block_on_stdin_reads() {
    let dir = TempDir::new().unwrap();
    // `cat` sees an open-but-unwritten pipe and reads EOF once the harness
    // drops its end, instead of inheriting the test runner's stdin.
    install_fake_cli(
        dir.path(),
        r#"cat > /dev/null
printf '{probe delimiter}{}{probe delimiter}'"#,
    );

    let output = invoke_telepresence(&args(&[]), &[]).unwrap();
    assert!(decode_probe_output(&output).is_ok());

    std::env::remove_var("TELEPRESENCE_BINARY");
}
