//! Dispatcher — turns allocated fragments into running jobs.
//!
//! The [`Dispatcher`] trait is the seam to the external job-execution
//! facility. [`ProcessDispatcher`] is the shipped implementation: every
//! node is a directory under `nodes_dir`, payloads are copied into it, and
//! jobs are started by spawning the configured launcher program.
//!
//! ```text
//! payload_dir/harvest.js ──place──► nodes_dir/<node>/harvest.js
//!                                        │
//!                         launch ◄───────┘
//!   <launcher...> <payload path> <node> <threads> <target>
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use harvest_core::NodeId;

use crate::error::{DispatchError, DispatchResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A launched job. Only meaningful to the dispatcher that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    pub id: u64,
    pub node: NodeId,
    pub payload: String,
    pub threads: u32,
}

/// Places payloads on nodes and launches jobs there.
pub trait Dispatcher: Send + Sync {
    /// Ensure `payload` is present on `node`. Returns true when a copy
    /// happened. With `overwrite` the payload is always copied.
    fn place<'a>(
        &'a self,
        payload: &'a str,
        node: &'a str,
        overwrite: bool,
    ) -> BoxFuture<'a, DispatchResult<bool>>;

    /// Start `threads` threads of `payload` on `node`.
    fn launch<'a>(
        &'a self,
        payload: &'a str,
        node: &'a str,
        threads: u32,
        args: &'a [String],
    ) -> BoxFuture<'a, DispatchResult<ProcessHandle>>;

    /// Whether the job behind `handle` is still running.
    fn is_running<'a>(&'a self, handle: &'a ProcessHandle) -> BoxFuture<'a, bool>;
}

/// Dispatches by copying files and spawning processes on this host.
pub struct ProcessDispatcher {
    payload_dir: PathBuf,
    nodes_dir: PathBuf,
    launcher: Vec<String>,
    next_id: AtomicU64,
    children: Mutex<HashMap<u64, Child>>,
}

impl ProcessDispatcher {
    pub fn new(
        payload_dir: impl Into<PathBuf>,
        nodes_dir: impl Into<PathBuf>,
        launcher: Vec<String>,
    ) -> DispatchResult<Self> {
        if launcher.first().is_none_or(|p| p.is_empty()) {
            return Err(DispatchError::EmptyLauncher);
        }
        Ok(Self {
            payload_dir: payload_dir.into(),
            nodes_dir: nodes_dir.into(),
            launcher,
            next_id: AtomicU64::new(1),
            children: Mutex::new(HashMap::new()),
        })
    }

    /// Where `payload` lives once placed on `node`.
    pub fn node_path(&self, node: &str, payload: &str) -> DispatchResult<PathBuf> {
        validate_segment(node)?;
        Ok(self.nodes_dir.join(node).join(payload))
    }

    /// Number of launched jobs that have not been observed to exit.
    pub async fn tracked(&self) -> usize {
        self.children.lock().await.len()
    }

    async fn place_file(&self, payload: &str, node: &str, overwrite: bool) -> DispatchResult<bool> {
        validate_segment(payload)?;
        let source = self.payload_dir.join(payload);
        let dest = self.node_path(node, payload)?;

        let contents = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DispatchError::PayloadMissing(source));
            }
            Err(source_err) => {
                return Err(DispatchError::Io {
                    path: source,
                    source: source_err,
                });
            }
        };

        if !overwrite
            && let Ok(existing) = tokio::fs::read(&dest).await
            && digest(&existing) == digest(&contents)
        {
            debug!(%node, %payload, "payload already present");
            return Ok(false);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DispatchError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&dest, &contents)
            .await
            .map_err(|source| DispatchError::Io {
                path: dest.clone(),
                source,
            })?;

        info!(%node, %payload, sha256 = %digest(&contents), "payload placed");
        Ok(true)
    }

    async fn spawn(
        &self,
        payload: &str,
        node: &str,
        threads: u32,
        args: &[String],
    ) -> DispatchResult<ProcessHandle> {
        let path = self.node_path(node, payload)?;
        let (program, leading) = self
            .launcher
            .split_first()
            .ok_or(DispatchError::EmptyLauncher)?;

        let child = Command::new(program)
            .args(leading)
            .arg(&path)
            .arg(node)
            .arg(threads.to_string())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DispatchError::Launch {
                program: program.clone(),
                source,
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut children = self.children.lock().await;
        reap(&mut children);
        children.insert(id, child);

        debug!(%node, %payload, threads, handle = id, "job launched");
        Ok(ProcessHandle {
            id,
            node: node.to_string(),
            payload: payload.to_string(),
            threads,
        })
    }

    async fn poll(&self, handle: &ProcessHandle) -> bool {
        let mut children = self.children.lock().await;
        let Some(child) = children.get_mut(&handle.id) else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if !status.success() {
                    warn!(node = %handle.node, payload = %handle.payload, %status, "job exited unsuccessfully");
                }
                children.remove(&handle.id);
                false
            }
            Err(e) => {
                warn!(handle = handle.id, error = %e, "failed to poll job");
                children.remove(&handle.id);
                false
            }
        }
    }
}

impl Dispatcher for ProcessDispatcher {
    fn place<'a>(
        &'a self,
        payload: &'a str,
        node: &'a str,
        overwrite: bool,
    ) -> BoxFuture<'a, DispatchResult<bool>> {
        Box::pin(self.place_file(payload, node, overwrite))
    }

    fn launch<'a>(
        &'a self,
        payload: &'a str,
        node: &'a str,
        threads: u32,
        args: &'a [String],
    ) -> BoxFuture<'a, DispatchResult<ProcessHandle>> {
        Box::pin(self.spawn(payload, node, threads, args))
    }

    fn is_running<'a>(&'a self, handle: &'a ProcessHandle) -> BoxFuture<'a, bool> {
        Box::pin(self.poll(handle))
    }
}

/// Drop children that have already exited.
fn reap(children: &mut HashMap<u64, Child>) {
    children.retain(|_, child| matches!(child.try_wait(), Ok(None)));
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Node ids and payload names become path segments.
fn validate_segment(segment: &str) -> DispatchResult<()> {
    let bad = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if bad {
        return Err(DispatchError::InvalidNode(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn dispatcher(root: &Path, launcher: &[&str]) -> ProcessDispatcher {
        let payloads = root.join("payloads");
        std::fs::create_dir_all(&payloads).unwrap();
        std::fs::write(payloads.join("grow.js"), b"grow()").unwrap();
        ProcessDispatcher::new(
            payloads,
            root.join("nodes"),
            launcher.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_launcher() {
        let result = ProcessDispatcher::new("p", "n", Vec::new());
        assert!(matches!(result, Err(DispatchError::EmptyLauncher)));
    }

    #[tokio::test]
    async fn place_copies_once_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), &["true"]);

        assert!(d.place("grow.js", "pool-1", false).await.unwrap());
        assert!(!d.place("grow.js", "pool-1", false).await.unwrap());

        let placed = std::fs::read(dir.path().join("nodes/pool-1/grow.js")).unwrap();
        assert_eq!(placed, b"grow()");
    }

    #[tokio::test]
    async fn place_recopies_changed_or_forced_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), &["true"]);
        d.place("grow.js", "home", false).await.unwrap();

        std::fs::write(dir.path().join("payloads/grow.js"), b"grow(2)").unwrap();
        assert!(d.place("grow.js", "home", false).await.unwrap());
        assert!(d.place("grow.js", "home", true).await.unwrap());
    }

    #[tokio::test]
    async fn place_reports_missing_payload() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), &["true"]);

        let err = d.place("hack.js", "home", false).await.unwrap_err();
        assert!(matches!(err, DispatchError::PayloadMissing(_)));
    }

    #[tokio::test]
    async fn node_ids_cannot_escape_nodes_dir() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), &["true"]);

        let err = d.place("grow.js", "../etc", false).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidNode(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launched_job_stops_running_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), &["true"]);
        d.place("grow.js", "home", false).await.unwrap();

        let handle = d
            .launch("grow.js", "home", 4, &["n00dles".to_string()])
            .await
            .unwrap();
        assert_eq!(handle.threads, 4);

        let mut running = true;
        for _ in 0..100 {
            running = d.is_running(&handle).await;
            if !running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!running);
        assert_eq!(d.tracked().await, 0);
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path(), &["/nonexistent/harvest-exec"]);

        let err = d.launch("grow.js", "home", 1, &[]).await.unwrap_err();
        assert!(matches!(err, DispatchError::Launch { .. }));
    }
}
