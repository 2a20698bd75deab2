//! Offset/limit paging over a record collection.
//!
//! Pages are requested in ascending ID order with `offset = page * batch_size` until the
//! store returns an empty page. A short page does not end the run; only an empty one does.
//! Exclusions travel with the query so an empty page always means "no more records".

use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use crate::interface::{
    AnonymizerError, PageQuery, RecordError, RecordId, RecordKind, RecordOutcome, RecordStore, Summary,
};

/// Default page size, matching the host CMS's admin tooling
pub const DEFAULT_BATCH_SIZE: u64 = 25;

/// Largest page size SQLite can bind as a LIMIT
pub const MAX_BATCH_SIZE: u64 = i64::MAX as u64;

/// Why a single visit did not succeed
#[derive(Debug)]
pub enum VisitError {
    /// Logged, counted, and skipped
    Record(RecordError),
    /// Stops the run
    Fatal(AnonymizerError),
}

impl From<RecordError> for VisitError {
    fn from(e: RecordError) -> Self {
        VisitError::Record(e)
    }
}

impl From<AnonymizerError> for VisitError {
    fn from(e: AnonymizerError) -> Self {
        VisitError::Fatal(e)
    }
}

#[derive(Debug, Clone)]
pub struct BatchIterator {
    batch_size: u64,
    excluded: BTreeSet<RecordId>,
    pause: Option<Duration>,
}

impl BatchIterator {
    pub fn new(batch_size: u64) -> Result<Self, AnonymizerError> {
        if batch_size == 0 {
            return Err(AnonymizerError::InvalidInput("batch size must be at least 1".to_string()));
        }
        if batch_size > MAX_BATCH_SIZE {
            return Err(AnonymizerError::InvalidInput(format!(
                "batch size {} exceeds the maximum of {}",
                batch_size, MAX_BATCH_SIZE
            )));
        }
        Ok(Self {
            batch_size,
            excluded: BTreeSet::new(),
            pause: None,
        })
    }

    pub fn with_excluded(mut self, excluded: impl IntoIterator<Item = RecordId>) -> Self {
        self.excluded = excluded.into_iter().collect();
        self
    }

    /// Sleep between pages to bound load on the database
    pub fn with_pause(mut self, pause: Option<Duration>) -> Self {
        self.pause = pause.filter(|d| !d.is_zero());
        self
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn excluded(&self) -> &BTreeSet<RecordId> {
        &self.excluded
    }

    /// Visit every non-excluded record of `kind` exactly once, in ascending ID order.
    ///
    /// `report` sees each outcome as soon as its visit returns. Per-record failures are
    /// counted and iteration continues; a fatal visit error or a failed page fetch
    /// stops the run.
    pub fn run<S, V, R>(&self, store: &S, kind: RecordKind, mut visit: V, mut report: R) -> Result<Summary, AnonymizerError>
    where
        S: RecordStore + ?Sized,
        V: FnMut(RecordId) -> Result<(), VisitError>,
        R: FnMut(&RecordOutcome),
    {
        let mut summary = Summary::default();
        let mut page: u64 = 0;

        loop {
            let offset = page
                .checked_mul(self.batch_size)
                .filter(|&offset| offset <= MAX_BATCH_SIZE)
                .ok_or_else(|| AnonymizerError::InvalidInput(format!("page {} offset out of range", page)))?;
            let query = PageQuery {
                excluded: &self.excluded,
                offset,
                limit: self.batch_size,
            };
            let ids = store.fetch_ids(kind, &query)?;
            summary.pages += 1;
            tracing::debug!(kind = %kind, page, offset = query.offset, fetched = ids.len(), "fetched page");

            if ids.is_empty() {
                break;
            }

            for id in ids {
                let outcome = match visit(id) {
                    Ok(()) => {
                        summary.succeeded += 1;
                        RecordOutcome::Updated { id }
                    }
                    Err(VisitError::Record(e)) => {
                        tracing::warn!(kind = %kind, id, error = %e, "record failed");
                        summary.failed += 1;
                        RecordOutcome::Failed { id, reason: e.to_string() }
                    }
                    Err(VisitError::Fatal(e)) => return Err(e),
                };
                summary.visited += 1;
                report(&outcome);
            }

            page += 1;
            if let Some(pause) = self.pause {
                thread::sleep(pause);
            }
        }

        tracing::info!(
            kind = %kind,
            visited = summary.visited,
            failed = summary.failed,
            "batch run complete"
        );
        Ok(summary)
    }
}
