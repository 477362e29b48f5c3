use std::{collections::HashMap, path::PathBuf, process::Stdio, time::Duration};

use tokio::{io::AsyncReadExt, process::Command, time::Instant};

/// What to run and under which limits. Every subprocess in the system (agent
/// CLIs, git, gh) goes through [`run_command`] so timeout, kill/reap and
/// output decoding behave identically everywhere.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env_overrides: HashMap<String, String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env_overrides: HashMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, envs: &HashMap<String, String>) -> Self {
        self.env_overrides
            .extend(envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// True when the process was killed after exceeding the timeout. In that
    /// case `exit_code` is -1 and stdout/stderr are empty.
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn ok(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Spawn the process, wait up to the timeout, kill and reap on expiry, and
/// decode stdout/stderr as UTF-8 with replacement for invalid bytes.
pub async fn run_command(spec: CommandSpec) -> std::io::Result<CommandOutput> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &spec.env_overrides {
        cmd.env(key, value);
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    // Both pipes are drained concurrently; reading them one after the other
    // can deadlock once the unread pipe's kernel buffer fills up.
    let drain = async {
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let (out_read, err_read) = tokio::join!(
            async {
                match stdout_pipe.as_mut() {
                    Some(out) => out.read_to_end(&mut stdout_buf).await,
                    None => Ok(0),
                }
            },
            async {
                match stderr_pipe.as_mut() {
                    Some(err) => err.read_to_end(&mut stderr_buf).await,
                    None => Ok(0),
                }
            }
        );
        out_read?;
        err_read?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, stdout_buf, stderr_buf))
    };

    // Bound to a local so the drain future (and its borrows of the child)
    // is dropped before the timeout branch touches the child again.
    let drained = tokio::time::timeout(spec.timeout, drain).await;
    match drained {
        Ok(result) => {
            let (status, stdout_buf, stderr_buf) = result?;
            Ok(CommandOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
                duration: start.elapsed(),
                timed_out: false,
            })
        }
        Err(_) => {
            tracing::warn!(
                program = %spec.program,
                timeout_secs = spec.timeout.as_secs(),
                "subprocess timed out, killing"
            );
            drop(stdout_pipe);
            drop(stderr_pipe);
            // Kill and reap so the child never outlives the call.
            child.kill().await?;
            Ok(CommandOutput {
                exit_code: -1,
                stdout: String::new(),
                stderr: String::new(),
                duration: start.elapsed(),
                timed_out: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run_command(
            CommandSpec::new("sh")
                .args(["-c", "echo hello; exit 3"])
                .timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.timed_out);
        assert!(!out.ok());
    }

    #[tokio::test]
    async fn env_overrides_reach_the_child() {
        let out = run_command(
            CommandSpec::new("sh")
                .args(["-c", "printf %s \"$OPENCLAW_TEST_VAR\""])
                .env("OPENCLAW_TEST_VAR", "from-parent")
                .timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert!(out.ok());
        assert_eq!(out.stdout, "from-parent");
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let start = std::time::Instant::now();
        let out = run_command(
            CommandSpec::new("sleep")
                .arg("30")
                .timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, -1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command(
            CommandSpec::new("pwd")
                .cwd(dir.path())
                .timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert!(out.ok());
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(reported, expected);
    }
}
