use plansync_core::SyncRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The remote id names a test or placeholder object.
    Placeholder,
    /// Nothing changed since the last confirmed push.
    AlreadyClean,
    /// An overlapping push of the same entity already sent this payload.
    PushedConcurrently,
}

/// Result of one push. Failures are already recorded on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed { remote_id: String, created: bool },
    Skipped(SkipReason),
    Failed { error: String, transient: bool },
}

impl PushOutcome {
    #[must_use]
    pub fn is_pushed(&self) -> bool {
        matches!(self, PushOutcome::Pushed { .. })
    }
}

/// Why a local delete did not touch Shopify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeptReason {
    /// The entity type's deletion policy keeps the remote object.
    Policy,
    /// The record never reached Shopify.
    NeverPushed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    RemoteDeleted { remote_id: String },
    /// Shopify answered 404.
    AlreadyGone { remote_id: String },
    RemoteKept(KeptReason),
    Skipped(SkipReason),
    /// The local delete stands; the remote object may still exist.
    RemoteDeleteFailed {
        remote_id: String,
        error: String,
        transient: bool,
    },
}

/// A record together with the payload to push for it.
#[derive(Debug, Clone)]
pub struct SweepItem<P> {
    pub record: SyncRecord,
    pub payload: P,
}

#[derive(Debug)]
pub struct SweepReport<P> {
    /// Every item with its updated record, in completion order.
    pub results: Vec<(SweepItem<P>, PushOutcome)>,
    pub pushed: usize,
    pub created: usize,
    pub failed: usize,
    pub transient: usize,
    pub skipped: usize,
}

impl<P> SweepReport<P> {
    pub(crate) fn from_results(results: Vec<(SweepItem<P>, PushOutcome)>) -> Self {
        let mut report = Self {
            results: Vec::new(),
            pushed: 0,
            created: 0,
            failed: 0,
            transient: 0,
            skipped: 0,
        };
        for (_, outcome) in &results {
            match outcome {
                PushOutcome::Pushed { created, .. } => {
                    report.pushed += 1;
                    if *created {
                        report.created += 1;
                    }
                }
                PushOutcome::Skipped(_) => report.skipped += 1,
                PushOutcome::Failed { transient, .. } => {
                    report.failed += 1;
                    if *transient {
                        report.transient += 1;
                    }
                }
            }
        }
        report.results = results;
        report
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }
}
