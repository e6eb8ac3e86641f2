use crate::config::NamedConfig;
use crate::error::NamedError;
use crate::named::NamedControl;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Outcome of a finished external command: whether it exited successfully, and its combined
/// stdout and stderr.
struct Output {
    success: bool,
    text: String,
}

/// [`NamedControl`] backed by the BIND command line tools.
#[derive(Debug, Clone)]
pub struct NamedProcess {
    config: NamedConfig,
}

impl NamedProcess {
    #[must_use]
    pub fn new(config: NamedConfig) -> Self {
        Self { config }
    }

    /// Run `program` with `args`. A timeout yields a failed [`Output`] whose text says so.
    async fn run<I, S>(&self, program: &str, args: I) -> Result<Output, NamedError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let limit = self.config.timeout;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(limit, child).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(Output {
                    success: output.status.success(),
                    text,
                })
            }
            Ok(Err(source)) => Err(NamedError::Spawn {
                program: program.to_string(),
                source,
            }),
            Err(_) => {
                tracing::warn!("{program} timed out after {}s", limit.as_secs());
                Ok(Output {
                    success: false,
                    text: format!("{program} timed out after {}s", limit.as_secs()),
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl NamedControl for NamedProcess {
    async fn check_config(&self) -> Result<String, NamedError> {
        let output = self
            .run(&self.config.checkconf, [self.config.conf_file.as_os_str()])
            .await?;
        if output.success {
            Ok(output.text)
        } else {
            Err(NamedError::CheckConf(output.text))
        }
    }

    async fn check_zone(&self, origin: &str, zone_file: &Path) -> Result<String, NamedError> {
        let args: [&OsStr; 4] = [
            OsStr::new("-k"),
            OsStr::new("fail"),
            OsStr::new(origin),
            zone_file.as_os_str(),
        ];
        let output = self.run(&self.config.checkzone, args).await?;
        if output.success {
            Ok(output.text)
        } else {
            Err(NamedError::CheckZone(output.text))
        }
    }

    async fn running_pid(&self) -> Option<u32> {
        let output = match self.run(&self.config.pgrep, ["-x", "named"]).await {
            Ok(output) if output.success => output,
            Ok(_) => return None,
            Err(err) => {
                tracing::warn!("liveness check failed: {err}");
                return None;
            }
        };
        output
            .text
            .lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
    }

    async fn start(&self) -> Result<(), NamedError> {
        if let Some(pid) = self.running_pid().await {
            tracing::debug!("named already running with pid {pid}");
            return Ok(());
        }
        let args = [OsStr::new("-c"), self.config.conf_file.as_os_str()];
        let output = self.run(&self.config.named, args).await?;
        if !output.success {
            return Err(NamedError::Start(output.text));
        }
        tracing::info!("started named");
        Ok(())
    }

    async fn reload(&self) -> Result<String, NamedError> {
        let output = self.run(&self.config.rndc, ["reload"]).await?;
        if output.success {
            Ok(output.text)
        } else {
            Err(NamedError::Reload(output.text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn with(checkzone: &str, timeout: Duration) -> NamedProcess {
        NamedProcess::new(NamedConfig {
            checkzone: checkzone.to_string(),
            timeout,
            ..NamedConfig::default()
        })
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_check_zone_failure() {
        let named = with("false", Duration::from_secs(5));
        let res = named.check_zone("alice.example.com.", Path::new("/dev/null")).await;
        assert!(matches!(res, Err(NamedError::CheckZone(_))));
    }

    #[tokio::test]
    async fn zero_exit_passes() {
        let named = with("true", Duration::from_secs(5));
        let res = named.check_zone("alice.example.com.", Path::new("/dev/null")).await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_failure() {
        let named = with("/nonexistent/named-checkzone", Duration::from_secs(5));
        let res = named.check_zone("alice.example.com.", Path::new("/dev/null")).await;
        assert!(matches!(res, Err(NamedError::Spawn { .. })));
    }

    #[tokio::test]
    async fn timeout_fails_like_a_non_zero_exit() {
        let named = with("named-checkzone", Duration::from_millis(100));
        let output = named.run("sleep", ["10"]).await.unwrap();
        assert!(!output.success);
        assert!(output.text.contains("timed out"));
    }
}
