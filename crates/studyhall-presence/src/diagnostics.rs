//! Presence table self-test.
//!
//! Walks access, column shape, write permission and listing in order and
//! stops at the first failing step, so operators can tell a missing table
//! from a row-level-security problem.

use std::fmt;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::record::PresenceRecord;
use crate::store::{PresenceStore, StoreError, PRESENCE_COLUMNS};

/// Row id used by the write check. Deleted again right after.
pub const PROBE_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStep {
    Access,
    Structure,
    Write,
    List,
}

impl CheckStep {
    pub fn label(&self) -> &'static str {
        match self {
            CheckStep::Access => "table access",
            CheckStep::Structure => "table structure",
            CheckStep::Write => "write permission",
            CheckStep::List => "list rows",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed(String),
    Failed(String),
}

/// Ordered results of [`check_table`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableReport {
    pub steps: Vec<(CheckStep, CheckOutcome)>,
}

impl TableReport {
    pub fn passed(&self) -> bool {
        self.steps.len() == 4
            && self
                .steps
                .iter()
                .all(|(_, outcome)| matches!(outcome, CheckOutcome::Passed(_)))
    }

    pub fn failure(&self) -> Option<(CheckStep, &str)> {
        self.steps.iter().find_map(|(step, outcome)| match outcome {
            CheckOutcome::Failed(reason) => Some((*step, reason.as_str())),
            CheckOutcome::Passed(_) => None,
        })
    }

    fn pass(&mut self, step: CheckStep, detail: impl Into<String>) {
        let detail = detail.into();
        info!(step = step.label(), detail = %detail, "presence check passed");
        self.steps.push((step, CheckOutcome::Passed(detail)));
    }

    fn fail(&mut self, step: CheckStep, err: &StoreError) {
        let reason = match err {
            StoreError::AccessDenied(_) => format!(
                "{err}; review the row-level-security policies on the presence table"
            ),
            StoreError::SchemaMissing(_) => {
                format!("{err}; create the online_users table ({PRESENCE_COLUMNS})")
            }
            _ => err.to_string(),
        };
        warn!(step = step.label(), reason = %reason, "presence check failed");
        self.steps.push((step, CheckOutcome::Failed(reason)));
    }
}

impl fmt::Display for TableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (step, outcome)) in self.steps.iter().enumerate() {
            match outcome {
                CheckOutcome::Passed(detail) => {
                    writeln!(f, "{}. {}: ok ({detail})", i + 1, step.label())?
                }
                CheckOutcome::Failed(reason) => {
                    writeln!(f, "{}. {}: FAILED: {reason}", i + 1, step.label())?
                }
            }
        }
        if self.passed() {
            write!(f, "all checks passed")
        } else {
            write!(f, "presence table is not usable")
        }
    }
}

/// Run the table self-test against `store`.
pub async fn check_table(store: &dyn PresenceStore, clock: &dyn Clock) -> TableReport {
    let mut report = TableReport::default();

    if let Err(e) = store.probe("*").await {
        report.fail(CheckStep::Access, &e);
        return report;
    }
    report.pass(CheckStep::Access, "select succeeded");

    if let Err(e) = store.probe(PRESENCE_COLUMNS).await {
        report.fail(CheckStep::Structure, &e);
        return report;
    }
    report.pass(CheckStep::Structure, PRESENCE_COLUMNS);

    let probe = PresenceRecord {
        id: PROBE_USER_ID.to_string(),
        email: "test@example.com".to_string(),
        full_name: "Test User".to_string(),
        last_seen: clock.now(),
    };
    if let Err(e) = store.upsert(&probe).await {
        report.fail(CheckStep::Write, &e);
        return report;
    }
    if let Err(e) = store.delete(PROBE_USER_ID).await {
        report.fail(CheckStep::Write, &e);
        return report;
    }
    report.pass(CheckStep::Write, "probe row written and removed");

    match store.select_all().await {
        Ok(rows) => report.pass(CheckStep::List, format!("{} row(s)", rows.len())),
        Err(e) => report.fail(CheckStep::List, &e),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn healthy_store_passes_every_step() {
        let store = MemoryStore::new();
        let report = check_table(&*store, &SystemClock).await;
        assert!(report.passed(), "{report}");
        assert_eq!(report.steps.len(), 4);
        assert!(store.get(PROBE_USER_ID).await.is_none());
    }

    #[tokio::test]
    async fn stops_at_first_failure_with_rls_hint() {
        let store = MemoryStore::new();
        store.fail_always(Some(StoreError::AccessDenied("42501".into())));
        let report = check_table(&*store, &SystemClock).await;

        assert_eq!(report.steps.len(), 1);
        let (step, reason) = report.failure().unwrap();
        assert_eq!(step, CheckStep::Access);
        assert!(reason.contains("row-level-security"));
    }

    #[tokio::test]
    async fn report_renders_numbered_steps() {
        let store = MemoryStore::new();
        store
            .seed(PresenceRecord {
                id: "u1".into(),
                email: "ada@example.edu".into(),
                full_name: "Ada".into(),
                last_seen: SystemClock.now(),
            })
            .await;
        let text = check_table(&*store, &SystemClock).await.to_string();
        assert!(text.contains("3. write permission: ok"));
        assert!(text.contains("4. list rows: ok (1 row(s))"));
        assert!(text.ends_with("all checks passed"));
    }

    #[tokio::test]
    async fn missing_table_suggests_creating_it() {
        let store = MemoryStore::new();
        store.fail_always(Some(StoreError::SchemaMissing("42P01".into())));
        let report = check_table(&*store, &SystemClock).await;
        let (_, reason) = report.failure().unwrap();
        assert!(reason.contains("create the online_users table"));
        assert!(!report.passed());
    }
}
