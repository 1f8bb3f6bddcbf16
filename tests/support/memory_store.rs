use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, bail, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use ledgersync::{
    HistoryStore, IngestionSession, IngestionVersion, LedgerSequence, SessionContext,
    SessionFactory, SessionRequest, SourceLedgerStore,
};
use tokio::sync::Notify;

/// Source chain plus history table, kept in memory.
#[derive(Default)]
pub struct MemoryLedgers {
    inner: Mutex<LedgersInner>,
    fail_source: AtomicBool,
    fail_history: AtomicBool,
    fail_outdated: AtomicBool,
    outdated_queries: AtomicUsize,
}

#[derive(Default)]
struct LedgersInner {
    core_latest: LedgerSequence,
    /// sequence -> ingestion version it was written with
    history: BTreeMap<LedgerSequence, IngestionVersion>,
}

impl MemoryLedgers {
    pub fn new(core_latest: LedgerSequence) -> Arc<Self> {
        let ledgers = Self::default();
        ledgers.inner.lock().unwrap().core_latest = core_latest;
        Arc::new(ledgers)
    }

    /// Marks `1..=latest` as already ingested under `version`.
    pub fn seed_history(&self, latest: LedgerSequence, version: IngestionVersion) {
        let mut inner = self.inner.lock().unwrap();
        for seq in 1..=latest {
            inner.history.insert(seq, version);
        }
    }

    pub fn set_version(&self, sequences: &[LedgerSequence], version: IngestionVersion) {
        let mut inner = self.inner.lock().unwrap();
        for seq in sequences {
            inner.history.insert(*seq, version);
        }
    }

    pub fn set_core_latest(&self, latest: LedgerSequence) {
        self.inner.lock().unwrap().core_latest = latest;
    }

    pub fn core_latest(&self) -> LedgerSequence {
        self.inner.lock().unwrap().core_latest
    }

    pub fn history_latest(&self) -> LedgerSequence {
        self.inner
            .lock()
            .unwrap()
            .history
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    pub fn history_version(&self, seq: LedgerSequence) -> Option<IngestionVersion> {
        self.inner.lock().unwrap().history.get(&seq).copied()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    pub fn fail_source(&self, failing: bool) {
        self.fail_source.store(failing, Ordering::SeqCst);
    }

    pub fn fail_history(&self, failing: bool) {
        self.fail_history.store(failing, Ordering::SeqCst);
    }

    pub fn fail_outdated(&self, failing: bool) {
        self.fail_outdated.store(failing, Ordering::SeqCst);
    }

    pub fn outdated_queries(&self) -> usize {
        self.outdated_queries.load(Ordering::SeqCst)
    }

    fn contains(&self, seq: LedgerSequence) -> bool {
        self.inner.lock().unwrap().history.contains_key(&seq)
    }

    fn write(&self, seq: LedgerSequence, version: IngestionVersion) {
        self.inner.lock().unwrap().history.insert(seq, version);
    }
}

impl SourceLedgerStore for MemoryLedgers {
    fn latest_sequence(&self) -> BoxFuture<'_, Result<LedgerSequence>> {
        async move {
            if self.fail_source.load(Ordering::SeqCst) {
                bail!("source store unavailable");
            }
            Ok(self.core_latest())
        }
        .boxed()
    }
}

impl HistoryStore for MemoryLedgers {
    fn latest_sequence(&self) -> BoxFuture<'_, Result<LedgerSequence>> {
        async move {
            if self.fail_history.load(Ordering::SeqCst) {
                bail!("history store unavailable");
            }
            Ok(self.history_latest())
        }
        .boxed()
    }

    fn oldest_outdated_ledgers(
        &self,
        version: IngestionVersion,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<LedgerSequence>>> {
        async move {
            self.outdated_queries.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_outdated.load(Ordering::SeqCst) {
                bail!("outdated ledger query failed");
            }
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .history
                .iter()
                .filter(|(_, stored)| **stored < version)
                .map(|(seq, _)| *seq)
                .take(limit)
                .collect())
        }
        .boxed()
    }
}

/// Knobs that change how scripted sessions behave, adjustable mid-test.
#[derive(Default)]
pub struct SessionScript {
    /// Fail when the session reaches this sequence (earlier ledgers stay written).
    pub fail_at: AtomicU32,
    /// Panic when the session reaches this sequence, once.
    pub panic_at: AtomicU32,
    /// Cap on ledgers written per session; 0 means unlimited.
    pub max_per_session: AtomicU32,
    /// Report success without writing anything.
    pub ingest_nothing: AtomicBool,
    /// Report success and count ledgers without bumping their version.
    pub silently_skip_versions: AtomicBool,
    /// Advance the source tip to this sequence after the next session finishes.
    pub grow_source_to: AtomicU32,
    /// When set, sessions announce themselves on `entered` and wait on it.
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub entered: Notify,
}

/// Session factory that writes into [`MemoryLedgers`] and records every request.
#[derive(Clone)]
pub struct ScriptedSessions {
    ledgers: Arc<MemoryLedgers>,
    script: Arc<SessionScript>,
    requests: Arc<Mutex<Vec<SessionRequest>>>,
}

impl ScriptedSessions {
    pub fn new(ledgers: Arc<MemoryLedgers>) -> Self {
        Self {
            ledgers,
            script: Arc::new(SessionScript::default()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(&self) -> Arc<SessionScript> {
        self.script.clone()
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn ranges(&self) -> Vec<(LedgerSequence, LedgerSequence)> {
        self.requests()
            .iter()
            .map(|request| (request.from, request.to))
            .collect()
    }
}

impl SessionFactory for ScriptedSessions {
    fn create(
        &self,
        request: SessionRequest,
        context: SessionContext,
    ) -> Box<dyn IngestionSession> {
        self.requests.lock().unwrap().push(request);
        Box::new(ScriptedSession {
            request,
            context,
            ledgers: self.ledgers.clone(),
            script: self.script.clone(),
            ingested: 0,
        })
    }
}

struct ScriptedSession {
    request: SessionRequest,
    context: SessionContext,
    ledgers: Arc<MemoryLedgers>,
    script: Arc<SessionScript>,
    ingested: u64,
}

impl ScriptedSession {
    async fn ingest(&mut self) -> Result<()> {
        let gate = self.script.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.script.entered.notify_one();
            gate.notified().await;
        }

        if self.script.ingest_nothing.load(Ordering::SeqCst) {
            return Ok(());
        }

        let cap = self.script.max_per_session.load(Ordering::SeqCst);
        for seq in self.request.from..=self.request.to {
            if cap != 0 && self.ingested >= u64::from(cap) {
                break;
            }
            if self.script.fail_at.load(Ordering::SeqCst) == seq {
                return Err(anyhow!("failed to ingest ledger {seq}"));
            }
            if self
                .script
                .panic_at
                .compare_exchange(seq, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                panic!("corrupt ledger {seq}");
            }
            if !self.request.overwrite_existing && self.ledgers.contains(seq) {
                continue;
            }
            if !self.script.silently_skip_versions.load(Ordering::SeqCst) {
                self.ledgers.write(seq, self.request.version);
            }
            self.context
                .account_cache
                .insert(format!("ledger-{seq}-source"), i64::from(seq));
            self.ingested += 1;
        }

        let grow_to = self.script.grow_source_to.swap(0, Ordering::SeqCst);
        if grow_to != 0 {
            self.ledgers.set_core_latest(grow_to);
        }
        Ok(())
    }
}

impl IngestionSession for ScriptedSession {
    fn run(&mut self) -> BoxFuture<'_, Result<()>> {
        self.ingest().boxed()
    }

    fn ingested(&self) -> u64 {
        self.ingested
    }
}
