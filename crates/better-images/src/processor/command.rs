//! External command-line transformations.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::schema::{CommandConfig, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
use crate::error::ProviderError;

/// Longest stderr excerpt kept in an error message.
const MAX_STDERR_CHARS: usize = 500;

/// Runs `command` with its placeholders bound to `input` and `output`.
/// Succeeds only if the program exits cleanly and `output` exists afterwards.
pub fn run(command: &CommandConfig, input: &Path, output: &Path) -> Result<Duration, ProviderError> {
    let args = bind_args(&command.args, input, output);
    debug!("Running {} {:?}", command.program, args);

    let start = Instant::now();
    let result = Command::new(&command.program)
        .args(&args)
        .output()
        .map_err(|e| ProviderError::CommandSpawn {
            program: command.program.clone(),
            source: e,
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("exited with {}", result.status)
        } else {
            tail(stderr, MAX_STDERR_CHARS).to_string()
        };
        return Err(ProviderError::CommandFailed {
            program: command.program.clone(),
            message,
        });
    }

    if !output.exists() {
        return Err(ProviderError::MissingOutput {
            program: command.program.clone(),
            path: output.to_path_buf(),
        });
    }

    Ok(start.elapsed())
}

fn bind_args(args: &[String], input: &Path, output: &Path) -> Vec<String> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    args.iter()
        .map(|a| {
            a.replace(INPUT_PLACEHOLDER, &input)
                .replace(OUTPUT_PLACEHOLDER, &output)
        })
        .collect()
}

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
