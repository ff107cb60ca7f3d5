use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Strategy that runs a local translator and collects its standard output
#[derive(Clone)]
pub struct ProcessExecutor {
    limiter: Arc<Semaphore>,
}

impl ProcessExecutor {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Spawn `program` (resolved through PATH) and read stdout line by line.
    ///
    /// Each line is kept with a trailing newline; invalid UTF-8 is replaced
    /// rather than ending the stream. A read error mid-stream
    /// ends collection and returns what was read so far. No timeout is
    /// applied; dropping the future kills the child.
    pub async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let _permit = self.limiter.acquire().await;

        debug!("Spawning {} with {} args", program, args.len());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        let mut output = String::new();

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        output.push_str(text.trim_end_matches(['\n', '\r']));
                        output.push('\n');
                    }
                    Err(e) => {
                        warn!("Reading output of {} failed: {}", program, e);
                        break;
                    }
                }
            }
        }

        match child.wait().await {
            Ok(status) if !status.success() => {
                warn!("{} exited with {}", program, status);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to wait for {}: {}", program, e),
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program() {
        let executor = ProcessExecutor::new(1);
        let result = executor
            .run("text-translator-no-such-program", &[])
            .await;
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collects_lines() {
        let executor = ProcessExecutor::new(1);
        let args = vec!["-c".to_string(), "printf 'one\\ntwo'".to_string()];
        let output = executor.run("sh", &args).await.unwrap();
        assert_eq!(output, "one\ntwo\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_partial_output_on_failure() {
        let executor = ProcessExecutor::new(1);
        let args = vec!["-c".to_string(), "echo partial; exit 3".to_string()];
        let output = executor.run("sh", &args).await.unwrap();
        assert_eq!(output, "partial\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_keeps_following_lines() {
        let executor = ProcessExecutor::new(1);
        let args = vec![
            "-c".to_string(),
            "printf 'first\\n\\377bad\\nthird line\\n'".to_string(),
        ];
        let output = executor.run("sh", &args).await.unwrap();
        assert_eq!(output, "first\n\u{FFFD}bad\nthird line\n");
    }
}
