use std::process::Command;

use crate::sensor::SensorError;

/// Run `prog` and hand back its stdout
pub fn make_call(name: &str, prog: &str, args: &[&str]) -> Result<String, SensorError> {
    let output = Command::new(prog)
        .args(args)
        .output()
        .map_err(|err| SensorError::Command {
            name: name.to_string(),
            source: err,
        })?;
    log_call_output(&output.stdout);

    if !output.status.success() {
        return Err(SensorError::CommandStatus {
            name: name.to_string(),
            status: output.status,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn log_call_output(output: &[u8]) {
    log::trace!(
        "\"\"\"{}\"\"\"",
        std::str::from_utf8(output).unwrap_or("<could not read output as utf-8>")
    );
}
