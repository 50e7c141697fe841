use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use serde_json::{json, Value};
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_core::params::{params_to_json, Params};
use simcache_fp::CodeVersion;
use tracing::debug;

use crate::compute::Computation;

const STDERR_TAIL: usize = 2000;

/// Runs an external program once per invocation.
///
/// The program receives `{"params": {..}, "seed": n}` on stdin and must print
/// its result as JSON on stdout. The code version defaults to the SHA-256 of
/// the script file.
#[derive(Debug, Clone)]
pub struct ScriptComputation {
    script: PathBuf,
    interpreter: Option<Vec<String>>,
    code_version: CodeVersion,
}

impl ScriptComputation {
    pub fn new(script: impl Into<PathBuf>) -> Result<Self, SimError> {
        let script = script.into();
        let code_version = CodeVersion::from_file(&script)?;
        Ok(Self {
            script,
            interpreter: None,
            code_version,
        })
    }

    /// Runs the script through `interpreter` (for example `python3 -u`).
    pub fn with_interpreter(mut self, interpreter: &str) -> Self {
        let parts: Vec<String> = interpreter.split_whitespace().map(String::from).collect();
        self.interpreter = if parts.is_empty() { None } else { Some(parts) };
        self
    }

    /// Pins an explicit code version instead of the script hash.
    pub fn with_code_version(mut self, code_version: CodeVersion) -> Self {
        self.code_version = code_version;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn command(&self) -> Command {
        match self.interpreter.as_deref() {
            Some([program, args @ ..]) => {
                let mut command = Command::new(program);
                command.args(args).arg(&self.script);
                command
            }
            _ => Command::new(&self.script),
        }
    }

    fn failure(&self, code: &str, message: impl Into<String>) -> ErrorInfo {
        ErrorInfo::new(code, message).with_context("script", self.script.display().to_string())
    }
}

impl Computation for ScriptComputation {
    fn code_version(&self) -> &CodeVersion {
        &self.code_version
    }

    fn invoke(&self, params: &Params, seed: u64) -> Result<Value, SimError> {
        let payload = json!({"params": params_to_json(params), "seed": seed}).to_string();
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| SimError::Computation(self.failure("compute.spawn", err.to_string())))?;

        // Feed stdin from a helper thread so a script that writes before it
        // reads cannot deadlock against us.
        let feeder = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                if let Err(err) = stdin.write_all(payload.as_bytes()) {
                    debug!(%err, "script closed stdin early");
                }
            })
        });
        let output = child
            .wait_with_output()
            .map_err(|err| SimError::Computation(self.failure("compute.wait", err.to_string())))?;
        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = {
                let trimmed = stderr.trim();
                let start = trimmed
                    .char_indices()
                    .rev()
                    .nth(STDERR_TAIL)
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                trimmed[start..].to_string()
            };
            let mut info = self
                .failure("compute.exit", format!("computation exited with {}", output.status))
                .with_context("seed", seed.to_string());
            if !tail.is_empty() {
                info = info.with_hint(tail);
            }
            return Err(SimError::Computation(info));
        }

        serde_json::from_slice(&output.stdout).map_err(|err| {
            SimError::InvalidResultShape(
                self.failure("compute.stdout_json", format!("stdout is not valid JSON: {err}"))
                    .with_hint("print exactly one JSON document on stdout"),
            )
        })
    }
}
