//! One pass of fetch → filter by ledger → extract → write, and the loop
//! that repeats it.

use std::future::Future;
use std::time::Duration;

use payment_types::extract_payment;
use tracing::{debug, error, info, warn};

use crate::error::{PollerError, PollerResult};
use crate::fetcher::{fetch_labeled_ids, MailProvider};
use crate::ledger::Ledger;
use crate::sink::PaymentSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// A single pass, then exit
    Once,
    /// Pass, sleep `interval`, repeat until shutdown
    Continuous { interval: Duration },
}

/// Counters for a single pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Message ids under the label
    pub listed: usize,
    /// Of those, ids not yet in the ledger
    pub new: usize,
    /// Rows appended to the sink
    pub written: usize,
    /// Messages that are not payment notifications
    pub skipped: usize,
    /// Messages that could not be fetched; retried next pass
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub passes: usize,
    pub written: usize,
    pub interrupted: bool,
}

pub struct Runner<P, S> {
    provider: P,
    ledger: Ledger,
    sink: S,
    label: String,
    query: Option<String>,
}

impl<P: MailProvider, S: PaymentSink> Runner<P, S> {
    pub fn new(
        provider: P,
        ledger: Ledger,
        sink: S,
        label: impl Into<String>,
        query: Option<String>,
    ) -> Self {
        Self {
            provider,
            ledger,
            sink,
            label: label.into(),
            query,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run one pass.
    ///
    /// Each payment's ledger entry is saved right after its row is written,
    /// with no suspension point in between, so dropping this future (on
    /// shutdown) can only happen between records. A sink failure stops the
    /// pass before the failed record reaches the ledger.
    pub async fn run_pass(&mut self) -> PollerResult<PassSummary> {
        let ids = fetch_labeled_ids(&self.provider, &self.label, self.query.as_deref()).await?;

        let mut summary = PassSummary {
            listed: ids.len(),
            ..Default::default()
        };

        let new_ids: Vec<String> = ids
            .into_iter()
            .filter(|id| !self.ledger.contains(id))
            .collect();
        summary.new = new_ids.len();

        if new_ids.is_empty() {
            info!("No new emails to process");
            return Ok(summary);
        }
        info!("Processing {} new email(s)", new_ids.len());

        for id in new_ids {
            let message = match self.provider.get_message(&id).await {
                Ok(message) => message,
                Err(e) => {
                    warn!("Failed to fetch message {}: {}", id, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let Some(payment) = extract_payment(&message) else {
                debug!("Message {} is not a payment notification, skipping", id);
                summary.skipped += 1;
                continue;
            };

            info!("  Found {}: {}", payment.direction().as_str(), payment.summary());
            self.sink.append(&payment)?;
            self.ledger.record(id)?;
            summary.written += 1;
        }

        info!(
            "Pass complete: {} listed, {} new, {} written, {} skipped, {} failed",
            summary.listed, summary.new, summary.written, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Run according to `mode` until done or `shutdown` resolves.
    ///
    /// In continuous mode, provider and sink failures end only the current
    /// pass; the next attempt happens after the usual interval. Ledger
    /// failures stop the loop since a row may already be written.
    pub async fn run(
        &mut self,
        mode: RunMode,
        shutdown: impl Future<Output = ()>,
    ) -> PollerResult<RunStats> {
        tokio::pin!(shutdown);
        let mut stats = RunStats::default();

        loop {
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Stopping poller...");
                    stats.interrupted = true;
                    return Ok(stats);
                }
                result = self.run_pass() => result,
            };
            stats.passes += 1;

            let interval = match mode {
                RunMode::Once => {
                    stats.written += result?.written;
                    return Ok(stats);
                }
                RunMode::Continuous { interval } => interval,
            };

            match result {
                Ok(summary) => stats.written += summary.written,
                Err(e) if survives_pass(&e) => error!("Pass failed, retrying next interval: {}", e),
                Err(e) => return Err(e),
            }

            debug!("Sleeping for {} seconds...", interval.as_secs());
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Stopping poller...");
                    stats.interrupted = true;
                    return Ok(stats);
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

fn survives_pass(err: &PollerError) -> bool {
    err.is_transient()
        || matches!(
            err,
            PollerError::Sink { .. } | PollerError::SinkSchema { .. }
        )
}
