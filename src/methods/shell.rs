//! Generic Shell Method
//!
//! A built-in method that runs a shell command template. Input files are
//! free-form keyword arguments collected in the bag's extra bucket, the
//! single output path is `out`, and `command` may reference any field as a
//! `{field}` placeholder:
//!
//! ```yaml
//! rules:
//!   - method: shell
//!     rule_id: merge
//!     kwargs:
//!       a: data/a.txt
//!       b: data/b.txt
//!       out: merged.txt
//!       command: "cat {a} {b} > {out}"
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, warn};

use crate::error::{Result, WorkflowError};
use crate::workflow::method::{Method, MethodRegistry};
use crate::workflow::parameters::{ensure_consumed, FieldSpec, Kwargs, ParamBag, Schema};
use crate::workflow::value::ValueKind;

/// Runs a user-supplied shell command that writes `out`.
#[derive(Debug)]
pub struct ShellMethod {
    input: ParamBag,
    output: ParamBag,
    params: ParamBag,
}

impl ShellMethod {
    pub const NAME: &'static str = "shell";

    /// Builds the method from keyword arguments: `command`, `out`, and any
    /// number of input path fields.
    pub fn new(mut kwargs: Kwargs) -> Result<Self> {
        let params_schema = Schema::new(vec![FieldSpec::new("command", ValueKind::String)]);
        let output_schema = Schema::new(vec![FieldSpec::new("out", ValueKind::Path)]);
        // free-form input paths; built last so it drains the remainder
        let input_schema = Schema::new(vec![]).with_extra(ValueKind::Path);

        let params = ParamBag::from_kwargs("shell.params", &params_schema, &mut kwargs)?;
        let output = ParamBag::from_kwargs("shell.output", &output_schema, &mut kwargs)?;
        let input = ParamBag::from_kwargs("shell.input", &input_schema, &mut kwargs)?;
        ensure_consumed("shell", &kwargs)?;

        Ok(Self { input, output, params })
    }

    /// Registers the factory under the `shell` name.
    pub fn register(registry: &mut MethodRegistry) {
        registry.register(Self::NAME, |kwargs| {
            Ok(Box::new(ShellMethod::new(kwargs)?) as Box<dyn Method>)
        });
    }

    fn command_text(&self) -> String {
        let mut command = self
            .params
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        for (name, value) in self.input.iter().chain(self.output.iter()) {
            command = command.replace(&format!("{{{}}}", name), &value.to_string());
        }
        command
    }
}

impl Method for ShellMethod {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn input(&self) -> &ParamBag {
        &self.input
    }

    fn output(&self) -> &ParamBag {
        &self.output
    }

    fn params(&self) -> &ParamBag {
        &self.params
    }

    fn run(&self) -> Result<()> {
        let command = self.command_text();
        let script = create_script(&script_stem(&self.output), &command)?;
        debug!("Executing shell command: {}", command);

        let output = Command::new("bash").arg(&script).output()?;

        if let Err(e) = fs::remove_file(&script) {
            warn!("Failed to clean up script {}: {}", script.display(), e);
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(WorkflowError::RunFailed {
                method: Self::NAME.to_string(),
                reason: format!(
                    "exit code {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            })
        }
    }
}

fn script_stem(output: &ParamBag) -> String {
    output
        .get("out")
        .and_then(|v| v.as_path())
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("step")
        .to_string()
}

/// Writes the command into a temporary bash script with fail-fast set.
fn create_script(stem: &str, command: &str) -> Result<PathBuf> {
    let script_dir = std::env::temp_dir().join("hydroweave_scripts");
    fs::create_dir_all(&script_dir)?;

    let script_path = script_dir.join(format!("{}_{}.sh", stem, std::process::id()));
    let mut file = File::create(&script_path)?;

    writeln!(file, "#!/bin/bash")?;
    writeln!(file, "set -e")?;
    writeln!(file, "{}", command)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}
