//! Backend process launch and port handshake
//!
//! ```text
//!   LaunchRequest ──► BackendLauncher::launch ──► RunningBackend
//!                                                   │
//!                              port: oneshot::Receiver<u16>
//!                              (sender dropped = exited before reporting)
//! ```
//!
//! [`ProcessLauncher`] spawns a real child process and resolves the port from
//! the first output line that announces a loopback URL.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::error::OrchestratorError;
use crate::config::BackendConfig;
use crate::session::{Session, SessionSecret};

/// Environment flag telling the backend it runs under the native host
pub const ENV_RUNNING: &str = "NATIVEPHP_RUNNING";
/// Environment variable carrying the hex session secret
pub const ENV_SECRET: &str = "NATIVEPHP_SECRET";
/// Environment variable carrying the internal API base URL
pub const ENV_API_URL: &str = "NATIVEPHP_API_URL";

/// Number of ports above the preferred one tried before asking the OS
const PORT_SEARCH_SPAN: u16 = 100;

/// Environment shared by every process started for a session
#[must_use]
pub fn session_env(secret: &SessionSecret, api_url: &str) -> Vec<(String, String)> {
    vec![
        (ENV_RUNNING.to_string(), "true".to_string()),
        (ENV_SECRET.to_string(), secret.to_hex()),
        (ENV_API_URL.to_string(), api_url.to_string()),
    ]
}

// =============================================================================
// Launch request
// =============================================================================

/// Everything needed to start the backend process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Program to run
    pub program: String,
    /// Final argument list: settings flags, then the configured arguments
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Extra environment
    pub env: Vec<(String, String)>,
    /// Port offered to the backend through `{port}`
    pub preferred_port: u16,
}

impl LaunchRequest {
    /// Build a request from configuration and the session
    ///
    /// `{port}` and `{api_port}` placeholders in the configured arguments are
    /// substituted and backend settings are prepended as `-d key=value`.
    #[must_use]
    pub fn build(config: &BackendConfig, working_dir: &Path, session: &Session, port: u16) -> Self {
        let api_port = session.api_port().to_string();
        let port_str = port.to_string();

        let mut args = session.settings().to_flags();
        args.extend(config.args.iter().map(|arg| {
            arg.replace("{port}", &port_str)
                .replace("{api_port}", &api_port)
        }));

        Self {
            program: config.program.clone(),
            args,
            working_dir: Some(working_dir.to_path_buf()),
            env: session_env(session.secret(), &session.api_url()),
            preferred_port: port,
        }
    }
}

// =============================================================================
// Launchers
// =============================================================================

/// A started backend, before the handshake completes
#[derive(Debug)]
pub struct RunningBackend {
    /// Resolves with the bound port; errors if the backend exits first
    pub port: oneshot::Receiver<u16>,
    /// The child process, when the launcher owns one
    pub child: Option<Child>,
}

/// Starts the backend process
#[async_trait]
pub trait BackendLauncher: Send + Sync {
    /// Start the backend described by `request`
    async fn launch(&self, request: LaunchRequest) -> Result<RunningBackend, OrchestratorError>;
}

/// Launcher that spawns the backend as a child process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Create a process launcher
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendLauncher for ProcessLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<RunningBackend, OrchestratorError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = request.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| OrchestratorError::Spawn {
            program: request.program.clone(),
            source,
        })?;
        info!(program = %request.program, pid = ?child.id(), "Backend process spawned");

        let (tx, rx) = oneshot::channel();
        let reporter = Arc::new(Mutex::new(Some(tx)));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(watch_output(stdout, "stdout", Arc::clone(&reporter)));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(watch_output(stderr, "stderr", Arc::clone(&reporter)));
        }

        Ok(RunningBackend {
            port: rx,
            child: Some(child),
        })
    }
}

type PortReporter = Arc<Mutex<Option<oneshot::Sender<u16>>>>;

/// Forward a backend output stream to tracing, reporting the first bound port
///
/// The reporter is dropped when the stream closes, so once both streams have
/// ended without a port the handshake receiver errors out.
async fn watch_output<R>(stream: R, name: &'static str, reporter: PortReporter)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "nativehost::backend", stream = name, "{line}");

        if let Some(port) = parse_bound_port(&line) {
            if let Some(tx) = reporter.lock().take() {
                info!(port = port, "Backend reported bound port");
                let _ = tx.send(port);
            }
        }
    }
    debug!(stream = name, "Backend output stream closed");
}

/// Extract the port from a line announcing a loopback URL
///
/// Recognizes `http://127.0.0.1:<port>`, `http://localhost:<port>` and
/// `http://[::1]:<port>` anywhere in the line, including bracketed or
/// parenthesized forms.
#[must_use]
pub fn parse_bound_port(line: &str) -> Option<u16> {
    const PREFIXES: [&str; 3] = ["http://127.0.0.1:", "http://localhost:", "http://[::1]:"];

    PREFIXES.iter().find_map(|prefix| {
        let start = line.find(prefix)? + prefix.len();
        let digits: String = line[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse::<u16>().ok().filter(|&port| port != 0)
    })
}

/// First free loopback port at or above `preferred`
///
/// Falls back to an OS-assigned port when the whole search span is taken.
///
/// # Errors
///
/// Returns `NoFreePort` if not even an OS-assigned port can be bound.
pub async fn find_available_port(preferred: u16) -> Result<u16, OrchestratorError> {
    let last = preferred.saturating_add(PORT_SEARCH_SPAN);
    for port in preferred..=last {
        if TcpListener::bind(("127.0.0.1", port)).await.is_ok() {
            return Ok(port);
        }
    }

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|source| OrchestratorError::NoFreePort { preferred, source })?;
    let addr = listener
        .local_addr()
        .map_err(|source| OrchestratorError::NoFreePort { preferred, source })?;
    Ok(addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BackendSettings;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_bound_port_shapes() {
        assert_eq!(parse_bound_port("Server running on http://127.0.0.1:8100"), Some(8100));
        assert_eq!(parse_bound_port("  INFO  http://localhost:8101  "), Some(8101));
        assert_eq!(parse_bound_port("[http://127.0.0.1:8102]"), Some(8102));
        assert_eq!(
            parse_bound_port("PHP 8.3 Development Server (http://127.0.0.1:8103) started"),
            Some(8103)
        );
        assert_eq!(parse_bound_port("listening on http://[::1]:8104/"), Some(8104));
    }

    #[test]
    fn test_parse_bound_port_rejects_others() {
        assert_eq!(parse_bound_port("http://example.com:8100"), None);
        assert_eq!(parse_bound_port("http://127.0.0.1:"), None);
        assert_eq!(parse_bound_port("http://127.0.0.1:0"), None);
        assert_eq!(parse_bound_port("http://127.0.0.1:99999"), None);
        assert_eq!(parse_bound_port("Booting..."), None);
    }

    #[test]
    fn test_launch_request_substitutes_placeholders() {
        let session = Session::new(4000, BackendSettings::new().with("memory_limit", "512M"));
        let config = BackendConfig {
            program: "php".to_string(),
            args: vec![
                "-S".to_string(),
                "127.0.0.1:{port}".to_string(),
                "--api={api_port}".to_string(),
            ],
            ..BackendConfig::default()
        };

        let request = LaunchRequest::build(&config, Path::new("/srv/app"), &session, 8123);

        assert_eq!(
            request.args,
            vec!["-d", "memory_limit=512M", "-S", "127.0.0.1:8123", "--api=4000"]
        );
        assert_eq!(request.working_dir, Some(PathBuf::from("/srv/app")));
        assert!(request
            .env
            .contains(&(ENV_SECRET.to_string(), session.secret().to_hex())));
        assert!(request
            .env
            .contains(&(ENV_API_URL.to_string(), "http://127.0.0.1:4000/api/".to_string())));
        assert!(request
            .env
            .contains(&(ENV_RUNNING.to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn test_find_available_port_skips_taken() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let found = find_available_port(port).await.unwrap();
        assert_ne!(found, port);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_reports_port() {
        let request = LaunchRequest {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo booting; echo 'Server started on http://127.0.0.1:8765' >&2; sleep 5"
                    .to_string(),
            ],
            working_dir: None,
            env: Vec::new(),
            preferred_port: 8765,
        };

        let running = ProcessLauncher::new().launch(request).await.unwrap();
        assert_eq!(running.port.await.unwrap(), 8765);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_exit_without_port() {
        let request = LaunchRequest {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo nothing to see".to_string()],
            working_dir: None,
            env: Vec::new(),
            preferred_port: 8100,
        };

        let running = ProcessLauncher::new().launch(request).await.unwrap();
        assert!(running.port.await.is_err());
    }
}
