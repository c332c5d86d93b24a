use anyhow::{Result, bail};
use std::{
    env,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    sync::OnceLock,
    thread,
    time::Duration,
};

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ensure a container runtime socket is available for testcontainers.
///
/// testcontainers speaks the Docker API; when no `DOCKER_HOST` is set we
/// look for the Docker socket and fall back to a rootless Podman socket.
/// Integration tests call this first and skip when it fails, so a machine
/// without a container runtime still gets a green unit-test run.
///
/// # Errors
/// Returns an error if no Docker/Podman socket can be found or reached.
pub fn ensure_container_runtime() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(init_container_runtime) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn init_container_runtime() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        if let Some(path) = docker_host.strip_prefix("unix://") {
            if wait_for_socket(Path::new(path), SOCKET_WAIT_TIMEOUT) {
                return Ok(());
            }
            return Err(format!(
                "`DOCKER_HOST` points to `{docker_host}`, but the socket is not accepting connections"
            ));
        }
        // Non-unix DOCKER_HOST (tcp://...): trust it and let testcontainers fail loudly.
        return Ok(());
    }

    let docker_socket = Path::new("/var/run/docker.sock");
    if wait_for_socket(docker_socket, SOCKET_WAIT_TIMEOUT) {
        return Ok(());
    }

    if let Some(path) = find_podman_socket() {
        if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
            let docker_host = format!("unix://{}", path.display());
            // SAFETY: set once during test setup before any container starts.
            unsafe {
                env::set_var("DOCKER_HOST", docker_host);
            }
            return Ok(());
        }
        return Err(format!(
            "Podman socket found at `{}`, but it is not accepting connections. Start `podman.socket` or run `podman system service`.",
            path.display()
        ));
    }

    Err("No container runtime socket found. Start the Docker daemon, `podman.socket`, or set `DOCKER_HOST`.".to_string())
}

fn find_podman_socket() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }
    candidates.push(PathBuf::from("/var/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/run/podman/podman.sock"));

    candidates.into_iter().find(|path| path.exists())
}

fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if path.exists() && UnixStream::connect(path).is_ok() {
            return true;
        }
        thread::sleep(Duration::from_millis(200));
    }
    false
}
