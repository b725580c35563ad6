//! Local process host.
//!
//! Runs each test application as a child process of `dotnest`. Output is
//! read line by line from both pipes, optionally forwarded to an
//! [`OutputCallback`], and collected into the [`ExecResult`].
//!
//! # Characteristics
//!
//! | Feature | Support |
//! |---------|---------|
//! | Isolation | None (shared filesystem and network) |
//! | Streaming output | Supported |
//! | Release | Kills a still-running child |

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, warn};

use super::{
    Command, ExecResult, HostError, HostProvider, HostResult, OutputCallback, OutputLine, TestHost,
};
use crate::module::TestModule;

/// Creates [`LocalHost`]s.
#[derive(Clone, Default)]
pub struct LocalHostProvider {
    env: Vec<(String, String)>,
    output_callback: Option<OutputCallback>,
}

impl LocalHostProvider {
    /// Creates a provider whose hosts add `env` to every process.
    ///
    /// # Example
    ///
    /// ```
    /// use dotnest::host::local::LocalHostProvider;
    ///
    /// let provider = LocalHostProvider::new(vec![("DOTNET_NOLOGO".into(), "1".into())]);
    /// ```
    pub fn new(env: Vec<(String, String)>) -> Self {
        Self {
            env,
            output_callback: None,
        }
    }

    /// Streams every output line to `callback` as it arrives.
    pub fn with_output_callback(mut self, callback: OutputCallback) -> Self {
        self.output_callback = Some(callback);
        self
    }
}

impl HostProvider for LocalHostProvider {
    type Host = LocalHost;

    fn create_host(&self, module: &TestModule) -> HostResult<LocalHost> {
        let working_dir = module
            .output_dir()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .ok_or_else(|| {
                HostError::CreateFailed(format!(
                    "no working directory for {}",
                    module.display_name()
                ))
            })?;

        Ok(LocalHost {
            id: format!("{}-{}", module.project_name(), uuid::Uuid::new_v4()),
            label: module.display_name(),
            working_dir,
            env: self.env.clone(),
            output_callback: self.output_callback.clone(),
            child: None,
            released: false,
        })
    }
}

/// A host that runs commands as local child processes.
pub struct LocalHost {
    id: String,
    label: String,
    working_dir: PathBuf,
    env: Vec<(String, String)>,
    output_callback: Option<OutputCallback>,
    child: Option<Child>,
    released: bool,
}

#[async_trait]
impl TestHost for LocalHost {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(&mut self, cmd: &Command) -> HostResult<ExecResult> {
        if self.released {
            return Err(HostError::Released(self.id.clone()));
        }

        let start = Instant::now();
        debug!("[{}] {}", self.id, cmd.to_shell_string());

        let working_dir = cmd
            .working_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.working_dir.clone());

        let mut process = tokio::process::Command::new(&cmd.program);
        process
            .args(&cmd.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in self.env.iter().chain(&cmd.env) {
            process.env(key, value);
        }

        let mut child = process
            .spawn()
            .map_err(|e| HostError::ExecFailed(format!("{}: {}", cmd.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::ExecFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HostError::ExecFailed("stderr not captured".to_string()))?;
        self.child = Some(child);

        let stdout_stream =
            tokio_stream::wrappers::LinesStream::new(BufReader::new(stdout).lines()).map(
                |line: Result<String, std::io::Error>| OutputLine::Stdout(line.unwrap_or_default()),
            );
        let stderr_stream =
            tokio_stream::wrappers::LinesStream::new(BufReader::new(stderr).lines()).map(
                |line: Result<String, std::io::Error>| OutputLine::Stderr(line.unwrap_or_default()),
            );
        let mut combined = stream::select(stdout_stream, stderr_stream);

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(line) = combined.next().await {
            if let Some(callback) = &self.output_callback {
                callback(&self.label, &line);
            }
            match line {
                OutputLine::Stdout(s) => {
                    stdout.push_str(&s);
                    stdout.push('\n');
                }
                OutputLine::Stderr(s) => {
                    stderr.push_str(&s);
                    stderr.push('\n');
                }
            }
        }

        let status = match self.child.as_mut() {
            Some(child) => child.wait().await?,
            None => return Err(HostError::Released(self.id.clone())),
        };
        self.child = None;

        Ok(ExecResult {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration: start.elapsed(),
        })
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            warn!("Failed to kill test process for {}: {}", self.id, e);
        }
        self.released = true;
        debug!("Released host {}", self.id);
    }
}
