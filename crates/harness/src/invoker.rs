//! Invoke the telepresence CLI and decode the probe's result out of its
//! combined output.
//!
//! Telepresence's own startup/shutdown logging shares a stream with the
//! probe's stdout, so the probe frames its JSON payload between two
//! occurrences of a fixed delimiter literal. Splitting on that literal must
//! yield exactly three segments (setup logs, payload, teardown logs); both
//! the segment count and the JSON parse are checked so a garbled run fails
//! loudly with the raw transcript instead of producing an empty result.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::ProbeError;
use crate::ident::ResourceIdent;
use crate::method::Method;
use crate::operation::Operation;

/// The literal the probe script emits on either side of its JSON payload.
///
/// Assumed never to occur in telepresence's own logging or inside the
/// payload. That is a convention with the probe script, not something this
/// module can verify.
pub const PROBE_DELIMITER: &str = "{probe delimiter}";

/// What the probe should exercise inside the execution context, forwarded
/// to it verbatim as repeated CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ProbeDirectives {
    /// URLs the probe requests and reports the response bodies of.
    pub urls: Vec<String>,
    /// Commands (argv[0]) the probe attempts to run and reports on.
    pub commands: Vec<String>,
    /// Paths relative to $TELEPRESENCE_ROOT the probe reads and returns.
    pub paths: Vec<String>,
}

impl ProbeDirectives {
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for url in &self.urls {
            args.push("--probe-url".to_string());
            args.push(url.clone());
        }
        for command in &self.commands {
            args.push("--probe-command".to_string());
            args.push(command.clone());
        }
        for path in &self.paths {
            args.push("--probe-path".to_string());
            args.push(path.clone());
        }
        args
    }
}

/// Composes one Method + Operation + directives into a telepresence
/// invocation and decodes the result.
#[derive(Debug)]
pub struct ProbeInvoker {
    method: Method,
    operation: Operation,
    probe_script: PathBuf,
}

impl ProbeInvoker {
    #[must_use]
    pub fn new(method: Method, operation: Operation, probe_script: PathBuf) -> Self {
        Self {
            method,
            operation,
            probe_script,
        }
    }

    /// The full argument vector: operation args, then method args, then
    /// probe directives.
    #[must_use]
    pub fn compose_args(&self, ident: &ResourceIdent, directives: &ProbeDirectives) -> Vec<String> {
        let mut args = self.operation.telepresence_args(ident);
        args.extend(self.method.telepresence_args(&self.probe_script));
        args.extend(directives.to_args());
        args
    }

    /// Run telepresence to completion and decode the probe payload.
    ///
    /// The client environment is the current process environment overlaid
    /// with `client_environment`; some methods propagate it into the
    /// execution context and the tests check for exactly that.
    ///
    /// # Errors
    ///
    /// [`ProbeError::Invocation`] on non-zero exit, [`ProbeError::Framing`]
    /// or [`ProbeError::Decode`] if the output cannot be decoded. All three
    /// carry the full transcript.
    pub fn run(
        &self,
        ident: &ResourceIdent,
        directives: &ProbeDirectives,
        client_environment: &[(String, String)],
    ) -> Result<Value, ProbeError> {
        let args = self.compose_args(ident, directives);
        let output = invoke_telepresence(&args, client_environment)?;
        decode_probe_output(&output)
    }
}

/// Spawn the telepresence CLI and capture stdout and stderr as one
/// interleaved stream.
///
/// stdin is a pipe that is closed right after spawn, so a child that
/// unexpectedly reads it gets EOF instead of blocking on the test runner's
/// terminal; `--logfile=-` keeps telepresence's logging on the captured
/// stream instead of a file.
pub fn invoke_telepresence(
    args: &[String],
    client_environment: &[(String, String)],
) -> Result<String, ProbeError> {
    let binary = crate::config::telepresence_binary()
        .map_err(|e| ProbeError::Io {
            context: "locating telepresence".to_string(),
            source: std::io::Error::other(format!("{e:#}")),
        })?;

    info!(binary = %binary.display(), ?args, "Running telepresence");

    let (mut reader, writer) = std::io::pipe().map_err(ProbeError::io("telepresence pipe"))?;
    let writer_clone = writer
        .try_clone()
        .map_err(ProbeError::io("telepresence pipe"))?;

    let mut command = Command::new(&binary);
    command
        .arg("--logfile=-")
        .args(args)
        .envs(client_environment.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::piped())
        .stdout(writer_clone)
        .stderr(writer);

    let mut child = command.spawn().map_err(ProbeError::io("telepresence"))?;
    // The Command still holds write ends of the pipe; drop it or the read
    // below never sees EOF.
    drop(command);
    // Close the child's stdin right away: anything that reads it gets EOF
    // instead of inheriting the test runner's terminal or blocking.
    drop(child.stdin.take());

    let mut raw = Vec::new();
    reader
        .read_to_end(&mut raw)
        .map_err(ProbeError::io("telepresence output"))?;
    let status = child.wait().map_err(ProbeError::io("telepresence"))?;

    let output = String::from_utf8_lossy(&raw).into_owned();
    debug!(%status, bytes = raw.len(), "telepresence exited");

    if !status.success() {
        return Err(ProbeError::Invocation {
            args: args.to_vec(),
            status: status.code().unwrap_or(-1),
            output,
        });
    }

    Ok(output)
}

/// Scrape the JSON payload out of the overall noise.
///
/// # Errors
///
/// [`ProbeError::Framing`] unless the delimiter occurs exactly twice,
/// [`ProbeError::Decode`] if the bracketed segment is not valid JSON.
pub fn decode_probe_output(output: &str) -> Result<Value, ProbeError> {
    let segments: Vec<&str> = output.split(PROBE_DELIMITER).collect();
    let [setup_logs, payload, teardown_logs] = segments[..] else {
        return Err(ProbeError::Framing {
            occurrences: segments.len() - 1,
            output: output.to_string(),
        });
    };

    let result = serde_json::from_str(payload).map_err(|source| ProbeError::Decode {
        segment: payload.to_string(),
        source,
    })?;

    info!("Telepresence output:\n{setup_logs}{teardown_logs}");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn invoker() -> ProbeInvoker {
        ProbeInvoker::new(
            Method::VpnTcp,
            Operation::New,
            PathBuf::from("/tmp/probe.py"),
        )
    }

    #[test]
    fn test_args_order_operation_method_directives() {
        let ident = ResourceIdent::new("testing-ns", "testing-dep");
        let directives = ProbeDirectives {
            urls: vec!["http://localhost:9999/".to_string()],
            commands: vec!["ping".to_string(), "dig".to_string()],
            paths: vec!["podinfo/labels".to_string()],
        };

        let args = invoker().compose_args(&ident, &directives);

        let namespace = args.iter().position(|a| a == "--namespace").unwrap();
        let method = args.iter().position(|a| a == "--method").unwrap();
        let url = args.iter().position(|a| a == "--probe-url").unwrap();
        let command = args.iter().position(|a| a == "--probe-command").unwrap();
        let path = args.iter().position(|a| a == "--probe-path").unwrap();
        assert!(namespace < method);
        assert!(method < url);
        assert!(url < command);
        assert!(command < path);
    }

    #[test]
    fn test_directives_repeat_per_entry() {
        let directives = ProbeDirectives {
            urls: vec![],
            commands: vec!["ping".to_string(), "traceroute".to_string()],
            paths: vec![],
        };
        assert_eq!(
            directives.to_args(),
            ["--probe-command", "ping", "--probe-command", "traceroute"]
        );
    }

    #[test]
    fn test_decode_scrapes_payload_from_noise() {
        let output = format!(
            "T: Starting proxy...\nT: warming up\n{PROBE_DELIMITER}{}{PROBE_DELIMITER}\nT: Exit cleanup\n",
            json!({"probe-urls": [["http://x/", "hello"]]})
        );
        let decoded = decode_probe_output(&output).unwrap();
        assert_eq!(decoded["probe-urls"][0][0], "http://x/");
    }

    #[test]
    fn test_decode_round_trip_identity() {
        let payload = json!({
            "env": {"MYENV": "hello"},
            "probe-commands": [["ping", "graceful-failure"]],
        });
        let output = format!("setup{PROBE_DELIMITER}{payload}{PROBE_DELIMITER}teardown");
        assert_eq!(decode_probe_output(&output).unwrap(), payload);
    }

    #[test]
    fn test_decode_requires_exactly_two_delimiters() {
        for (output, expected) in [
            ("no delimiters at all".to_string(), 0),
            (format!("logs {PROBE_DELIMITER} {{}}"), 1),
            (format!(
                "{PROBE_DELIMITER}{{}}{PROBE_DELIMITER}{PROBE_DELIMITER}"
            ), 3),
        ] {
            match decode_probe_output(&output) {
                Err(ProbeError::Framing {
                    occurrences,
                    output: raw,
                }) => {
                    assert_eq!(occurrences, expected);
                    assert_eq!(raw, output);
                }
                other => panic!("expected framing error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_rejects_bad_json_with_raw_segment() {
        let output = format!("setup{PROBE_DELIMITER}not json{PROBE_DELIMITER}teardown");
        match decode_probe_output(&output) {
            Err(ProbeError::Decode { segment, .. }) => assert_eq!(segment, "not json"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
