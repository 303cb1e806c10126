//! Headless browser rendering, the last link of the page fallback chain.
//!
//! Each render owns one browser process for its whole lifetime. The process is
//! spawned with `kill_on_drop`, and [`BrowserSession::dump_dom`] kills it
//! explicitly before returning, so no exit path (success, timeout, read error,
//! task abort) leaves a browser behind between scheduled runs.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::FetchError;

/// Tries each configured browser binary in order until one starts.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    paths: Vec<String>,
    timeout: Duration,
    no_sandbox: bool,
}

impl BrowserLauncher {
    pub fn new(cfg: &Config) -> Self {
        Self {
            paths: cfg.browser_paths.clone(),
            timeout: Duration::from_secs(cfg.browser_timeout_secs),
            no_sandbox: cfg.browser_no_sandbox,
        }
    }

    /// Renders `url` and returns the serialized DOM after scripts ran.
    pub async fn render(&self, source_id: &'static str, url: &str) -> Result<String, FetchError> {
        if self.paths.is_empty() {
            return Err(FetchError::NotConfigured {
                source_id,
                detail: "no browser binaries configured".to_string(),
            });
        }

        let mut failures = Vec::new();
        for path in &self.paths {
            match BrowserSession::launch(path, url, self.no_sandbox) {
                Ok(session) => {
                    debug!(source = source_id, browser = %path, pid = ?session.child.id(), "Browser launched");
                    return session.dump_dom(source_id, self.timeout).await;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(source = source_id, browser = %path, "Browser binary not found, trying next");
                    failures.push(format!("{path}: not found"));
                }
                Err(e) => {
                    warn!(source = source_id, browser = %path, error = %e, "Browser failed to start");
                    failures.push(format!("{path}: {e}"));
                }
            }
        }

        Err(FetchError::Browser {
            source_id,
            detail: format!("no browser could be started ({})", failures.join("; ")),
        })
    }
}

/// One running headless browser process.
struct BrowserSession {
    child: Child,
    binary: String,
}

impl BrowserSession {
    fn launch(binary: &str, url: &str, no_sandbox: bool) -> std::io::Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.args([
            "--headless=new",
            "--disable-gpu",
            "--hide-scrollbars",
            "--mute-audio",
            "--virtual-time-budget=15000",
            "--dump-dom",
        ]);
        if no_sandbox {
            cmd.arg("--no-sandbox");
        }
        cmd.arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        Ok(Self { child: cmd.spawn()?, binary: binary.to_string() })
    }

    /// Reads the DOM from stdout, bounded by `timeout`, then releases the process.
    async fn dump_dom(mut self, source_id: &'static str, timeout: Duration) -> Result<String, FetchError> {
        let outcome = match self.child.stdout.take() {
            Some(mut stdout) => {
                let mut buf = Vec::new();
                match tokio::time::timeout(timeout, stdout.read_to_end(&mut buf)).await {
                    Err(_) => Err(FetchError::Timeout { source_id, secs: timeout.as_secs() }),
                    Ok(Err(e)) => Err(FetchError::Browser {
                        source_id,
                        detail: format!("{}: reading output failed: {e}", self.binary),
                    }),
                    Ok(Ok(_)) if buf.iter().all(|b| b.is_ascii_whitespace()) => {
                        Err(FetchError::Browser {
                            source_id,
                            detail: format!("{}: produced no output", self.binary),
                        })
                    }
                    Ok(Ok(_)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
                }
            }
            None => Err(FetchError::Browser {
                source_id,
                detail: format!("{}: stdout was not captured", self.binary),
            }),
        };

        self.close().await;
        outcome
    }

    async fn close(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!(browser = %self.binary, %status, "Browser exited"),
            _ => {
                if let Err(e) = self.child.kill().await {
                    warn!(browser = %self.binary, error = %e, "Failed to kill browser process");
                } else {
                    debug!(browser = %self.binary, "Browser killed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher(paths: &[&str]) -> BrowserLauncher {
        BrowserLauncher {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            timeout: Duration::from_secs(5),
            no_sandbox: false,
        }
    }

    /// Writes an executable fake browser that records its pid in `pid` before running `body`.
    fn fake_browser(dir: &std::path::Path, body: &str) -> (String, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let pid_file = dir.join("pid");
        let script = dir.join("fake-browser");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\n{body}\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script.display().to_string(), pid_file)
    }

    fn is_running(pid_file: &std::path::Path) -> bool {
        let pid = std::fs::read_to_string(pid_file).unwrap();
        std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -0 {}", pid.trim()))
            .status()
            .unwrap()
            .success()
    }

    #[tokio::test]
    async fn no_paths_is_not_configured() {
        let err = launcher(&[]).render("test", "https://example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::NotConfigured { source_id: "test", .. }));
    }

    #[tokio::test]
    async fn missing_binaries_report_browser_error() {
        let err = launcher(&["/nonexistent/chrome-a", "/nonexistent/chrome-b"])
            .render("test", "https://example.com")
            .await
            .unwrap_err();
        match err {
            FetchError::Browser { detail, .. } => {
                assert!(detail.contains("chrome-a"), "{detail}");
                assert!(detail.contains("chrome-b"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn falls_through_to_next_binary() {
        // `echo` stands in for a browser: it prints its arguments, url included, and exits.
        let html = launcher(&["/nonexistent/chrome", "echo"])
            .render("test", "https://example.com/page")
            .await
            .unwrap();
        assert!(html.contains("--dump-dom"));
        assert!(html.contains("https://example.com/page"));
    }

    #[tokio::test]
    async fn hung_browser_is_killed_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let (path, pid_file) = fake_browser(dir.path(), "exec sleep 30");
        let launcher = BrowserLauncher { timeout: Duration::from_millis(500), ..launcher(&[&path]) };

        let err = launcher.render("test", "https://example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { source_id: "test", .. }), "unexpected error: {err}");
        assert!(!is_running(&pid_file));
    }

    #[tokio::test]
    async fn silent_browser_is_killed_after_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        // Closes stdout without printing, then keeps running.
        let (path, pid_file) = fake_browser(dir.path(), "exec >&-\nexec sleep 30");

        let err = launcher(&[&path]).render("test", "https://example.com").await.unwrap_err();
        match err {
            FetchError::Browser { detail, .. } => assert!(detail.contains("produced no output"), "{detail}"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!is_running(&pid_file));
    }
}
