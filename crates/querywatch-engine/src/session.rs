use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use querywatch_logs::LogSource;
use querywatch_types::{SessionKind, Testcase};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::SessionState;
use crate::channel::Channel;
use crate::error::{EngineError, Result};
use crate::recorder::Recorder;
use crate::store::TestStore;
use crate::verifier::Verifier;

/// A running session as seen by the orchestrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub kind: SessionKind,
    pub started: DateTime<Utc>,
    pub state: SessionState,
}

struct ActiveSession {
    kind: SessionKind,
    started: DateTime<Utc>,

    /// Raised by the orchestrator to request a stop
    cancel: CancellationToken,

    /// Raised by the session task when it ends, for whatever reason
    done: CancellationToken,

    /// Final result, sent after the testcase has been persisted
    stopped: oneshot::Receiver<Result<Testcase>>,
}

/// Active record/verify sessions keyed by test name
///
/// A test name can be driven by at most one session at a time. Sessions run as
/// tokio tasks, so sessions must be started from within a runtime.
pub struct SessionRegistry {
    store: Arc<dyn TestStore>,
    sessions: Mutex<HashMap<String, ActiveSession>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn TestStore>) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TestStore> {
        &self.store
    }

    /// Start recording a fresh testcase from `source`
    pub fn start_recording<S>(&self, name: &str, channel: Arc<Channel>, source: S) -> Result<()>
    where
        S: LogSource + 'static,
    {
        let mut sessions = self.sessions.lock();
        ensure_idle(&mut sessions, name)?;

        let recorder = Recorder::new(name, channel, source, Arc::clone(&self.store));
        let session = spawn_session(name, SessionKind::Recording, |cancel| recorder.run(cancel));
        sessions.insert(name.to_string(), session);
        Ok(())
    }

    /// Start verifying a stored testcase against `source`
    pub fn start_verification<S>(&self, name: &str, channel: Arc<Channel>, source: S) -> Result<()>
    where
        S: LogSource + 'static,
    {
        let mut sessions = self.sessions.lock();
        ensure_idle(&mut sessions, name)?;

        let testcase = self.store.get(name)?;
        let verifier = Verifier::new(testcase, channel, source, Arc::clone(&self.store));
        let session = spawn_session(name, SessionKind::Verification, |cancel| verifier.run(cancel));
        sessions.insert(name.to_string(), session);
        Ok(())
    }

    /// Request a stop and wait until the session has persisted its testcase
    pub async fn stop(&self, name: &str) -> Result<Testcase> {
        let session = self
            .sessions
            .lock()
            .remove(name)
            .ok_or_else(|| EngineError::NotRunning(name.to_string()))?;

        session.cancel.cancel();
        let result = session
            .stopped
            .await
            .map_err(|_| EngineError::SessionLost(name.to_string()))?;
        info!(test = name, kind = %session.kind, "session stopped");
        result
    }

    /// Stop every session, returning each result by test name
    pub async fn stop_all(&self) -> Vec<(String, Result<Testcase>)> {
        let names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        let results = futures::future::join_all(names.iter().map(|name| self.stop(name))).await;
        names.into_iter().zip(results).collect()
    }

    /// Signal raised once the named session's task has ended
    ///
    /// Lets an orchestrator notice a session that failed on its own; the result is
    /// still collected through [`SessionRegistry::stop`].
    pub fn completion(&self, name: &str) -> Option<CancellationToken> {
        self.sessions.lock().get(name).map(|s| s.done.clone())
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state(name) == SessionState::Running
    }

    pub fn state(&self, name: &str) -> SessionState {
        self.sessions
            .lock()
            .get(name)
            .map_or(SessionState::Idle, ActiveSession::state)
    }

    /// Currently registered sessions, sorted by name
    pub fn running(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .lock()
            .iter()
            .map(|(name, s)| SessionInfo {
                name: name.clone(),
                kind: s.kind,
                started: s.started,
                state: s.state(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl ActiveSession {
    fn state(&self) -> SessionState {
        if self.done.is_cancelled() {
            SessionState::Finished
        } else {
            SessionState::Running
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        for session in self.sessions.get_mut().values() {
            session.cancel.cancel();
        }
    }
}

fn ensure_idle(sessions: &mut HashMap<String, ActiveSession>, name: &str) -> Result<()> {
    let Some(session) = sessions.get(name) else {
        return Ok(());
    };
    if !session.done.is_cancelled() {
        return Err(EngineError::AlreadyRunning {
            name: name.to_string(),
            kind: session.kind,
        });
    }

    warn!(
        test = name,
        kind = %session.kind,
        "discarding result of an ended session that was never stopped"
    );
    sessions.remove(name);
    Ok(())
}

fn spawn_session<F, Fut>(name: &str, kind: SessionKind, run: F) -> ActiveSession
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<Testcase>> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let done = CancellationToken::new();
    let (tx, rx) = oneshot::channel();

    let session = run(cancel.clone());
    let done_guard = done.clone().drop_guard();
    tokio::spawn(async move {
        // Raise `done` even if the session panics
        let _done = done_guard;
        let result = session.await;
        let _ = tx.send(result);
    });

    info!(test = name, %kind, "session started");
    ActiveSession {
        kind,
        started: Utc::now(),
        cancel,
        done,
        stopped: rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonTestStore;
    use crate::testing::{Drained, ScriptedSource, fresh};
    use std::time::Duration;

    const INSERT_4: &str = "insert into job (description, id) values ('Developer', 4)";
    const INSERT_5: &str = "insert into job (description, id) values ('Developer', 5)";

    fn channel() -> Arc<Channel> {
        Arc::new(Channel::new("pg", &["insert"]).unwrap())
    }

    fn registry(dir: &tempfile::TempDir) -> SessionRegistry {
        SessionRegistry::new(Arc::new(JsonTestStore::new(dir.path())))
    }

    fn waiting(lines: &[&str]) -> ScriptedSource {
        ScriptedSource::new(lines.iter().map(|l| fresh(l))).when_drained(Drained::Wait)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_record_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        registry
            .start_recording("jobs", channel(), waiting(&[INSERT_4]))
            .unwrap();
        settle().await;
        assert!(registry.is_running("jobs"));
        let recorded = registry.stop("jobs").await.unwrap();
        assert_eq!(recorded.expectations.len(), 1);
        assert!(!registry.is_running("jobs"));
        assert_eq!(registry.state("jobs"), SessionState::Idle);

        registry
            .start_verification("jobs", channel(), waiting(&[INSERT_5]))
            .unwrap();
        settle().await;
        let verified = registry.stop("jobs").await.unwrap();
        assert_eq!(verified.verifications, 1);
        assert_eq!(verified.expectations[0].ignore_diffs, vec![7]);
        assert!(verified.expectations[0].fulfilled);
    }

    #[tokio::test]
    async fn test_one_session_per_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        registry.start_recording("jobs", channel(), waiting(&[])).unwrap();
        let err = registry
            .start_recording("jobs", channel(), waiting(&[]))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::AlreadyRunning {
                kind: SessionKind::Recording,
                ..
            }
        ));

        registry.start_recording("other", channel(), waiting(&[])).unwrap();
        let names: Vec<String> = registry.running().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["jobs", "other"]);
        assert!(
            registry
                .running()
                .iter()
                .all(|s| s.state == SessionState::Running)
        );

        let results = registry.stop_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(registry.running().is_empty());
    }

    #[tokio::test]
    async fn test_verify_unknown_testcase() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let err = registry
            .start_verification("missing", channel(), waiting(&[]))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(registry.running().is_empty());
    }

    #[tokio::test]
    async fn test_stop_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        assert!(matches!(
            registry.stop("jobs").await,
            Err(EngineError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_signals_failed_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let source = ScriptedSource::new([fresh(INSERT_4)]).when_drained(Drained::Fail);
        registry.start_recording("jobs", channel(), source).unwrap();

        let done = registry.completion("jobs").unwrap();
        tokio::time::timeout(Duration::from_secs(2), done.cancelled())
            .await
            .unwrap();
        assert!(!registry.is_running("jobs"));
        assert_eq!(registry.state("jobs"), SessionState::Finished);
        assert_eq!(registry.running()[0].state, SessionState::Finished);

        let result = registry.stop("jobs").await;
        assert!(matches!(result, Err(EngineError::Source(_))));
        assert_eq!(registry.store().get("jobs").unwrap().expectations.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_after_unstopped_end() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let source = ScriptedSource::new(Vec::<String>::new());
        registry.start_recording("jobs", channel(), source).unwrap();

        let done = registry.completion("jobs").unwrap();
        done.cancelled().await;

        registry.start_recording("jobs", channel(), waiting(&[])).unwrap();
        assert!(registry.is_running("jobs"));
        registry.stop("jobs").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_backed_sessions() {
        use querywatch_logs::{FileLogSource, LogFormat};
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("mysql.log");
        std::fs::write(&log, fresh("insert into job values ('Stale', 1)")).unwrap();
        let append = |statement: &str| {
            let mut file = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
            file.write_all(fresh(statement).as_bytes()).unwrap();
        };
        let open = || FileLogSource::open(&log, LogFormat::Mysql, Duration::from_millis(10));

        let store = JsonTestStore::new(dir.path().join("tests"));
        let registry = SessionRegistry::new(Arc::new(store));
        let channel = Arc::new(
            Channel::new("mysql", &["insert", "select"])
                .unwrap()
                .with_report_additional(true),
        );

        registry
            .start_recording("jobs", Arc::clone(&channel), open().await.unwrap())
            .unwrap();
        settle().await;
        append(INSERT_4);
        append("select id from job where id = 4");
        settle().await;
        let recorded = registry.stop("jobs").await.unwrap();
        assert_eq!(recorded.expectations.len(), 2);

        registry
            .start_verification("jobs", Arc::clone(&channel), open().await.unwrap())
            .unwrap();
        settle().await;
        append(INSERT_5);
        append("select name from job");
        settle().await;
        let verified = registry.stop("jobs").await.unwrap();

        assert_eq!(verified.expectations[0].ignore_diffs, vec![7]);
        assert!(verified.expectations[0].fulfilled);
        assert!(!verified.expectations[1].fulfilled);
        assert_eq!(verified.additional_expectations.len(), 1);

        let stored = registry.store().get("jobs").unwrap();
        assert!(stored.additional_expectations.is_empty());
        assert_eq!(stored.verifications, 1);
    }
}
