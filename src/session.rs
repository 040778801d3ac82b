//! One user's import run: parsing, background resolution, review edits and
//! execution, with progress published as discrete events.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::{
    categorize::{BucketCounts, GroupedRow, counts_by_bucket, group},
    error::ImportError,
    executor::ImportExecutor,
    models::{ImportResult, InstrumentEdit, ResolvedInstrument},
    parser::{self, ParseResult},
    resolver::{ResolveResult, SymbolResolver},
    store::PortfolioStore,
    wizard::{Wizard, WizardEvent, WizardStep},
};

/// Stage events in the order a run produces them. `done` never decreases
/// within a stage.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportProgress {
    Parsed { rows: usize, transactions: usize },
    Resolved { done: usize, total: usize },
    Executing { done: usize, total: usize },
    Finished(ImportResult),
}

/// Handle to resolution running in the background.
#[derive(Debug)]
pub struct ResolutionTask {
    handle: JoinHandle<ResolveResult>,
}

impl ResolutionTask {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<ResolveResult, ImportError> {
        self.handle.await.map_err(|err| {
            if err.is_cancelled() {
                ImportError::Cancelled
            } else {
                ImportError::Store(anyhow!("resolution task failed: {}", err))
            }
        })
    }
}

pub struct ImportSession {
    wizard: Wizard,
    resolver: SymbolResolver,
    executor: ImportExecutor,
    store: Arc<dyn PortfolioStore>,
    progress: mpsc::UnboundedSender<ImportProgress>,
    parsed: Option<ParseResult>,
    instruments: Vec<ResolvedInstrument>,
    resolve_errors: Vec<String>,
}

impl ImportSession {
    pub fn new(
        resolver: SymbolResolver,
        executor: ImportExecutor,
        store: Arc<dyn PortfolioStore>,
    ) -> (Self, UnboundedReceiverStream<ImportProgress>) {
        let (progress, rx) = mpsc::unbounded_channel();
        let session = Self {
            wizard: Wizard::new(),
            resolver,
            executor,
            store,
            progress,
            parsed: None,
            instruments: Vec::new(),
            resolve_errors: Vec::new(),
        };
        (session, UnboundedReceiverStream::new(rx))
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn step(&self) -> WizardStep {
        self.wizard.step()
    }

    pub fn parsed(&self) -> Option<&ParseResult> {
        self.parsed.as_ref()
    }

    pub fn instruments(&self) -> &[ResolvedInstrument] {
        &self.instruments
    }

    pub fn resolve_errors(&self) -> &[String] {
        &self.resolve_errors
    }

    pub fn set_portfolio(&mut self, portfolio_id: i64) {
        self.wizard.set_portfolio(portfolio_id);
    }

    pub fn set_platform(&mut self, platform: &str) {
        self.wizard.set_platform(platform);
    }

    /// Parses the uploaded file. A file without a single usable row sends the
    /// wizard back to upload.
    pub fn analyze(&mut self, bytes: &[u8], platform_hint: Option<&str>) -> Result<&ParseResult, ImportError> {
        self.wizard.transition(WizardEvent::FileSelected)?;
        let parsed = parser::parse(bytes, platform_hint);

        if !parsed.success {
            self.wizard.transition(WizardEvent::ParseFailed)?;
            return Err(ImportError::Parse(parsed.errors));
        }

        self.wizard.transition(WizardEvent::ParseSucceeded)?;
        self.emit(ImportProgress::Parsed {
            rows: parsed.rows.len(),
            transactions: parsed.transactions.len(),
        });
        Ok(self.parsed.insert(parsed))
    }

    /// Starts resolving the parsed rows against the selected portfolio's
    /// assets. Nothing is written until `execute`.
    pub async fn start_resolution(&mut self) -> Result<ResolutionTask, ImportError> {
        let rows = match &self.parsed {
            Some(parsed) => parsed.rows.clone(),
            None => return Err(ImportError::InvalidTransition("nothing has been parsed yet".to_string())),
        };
        self.wizard.transition(WizardEvent::StartResolving)?;

        let existing = match self.wizard.portfolio_id() {
            Some(portfolio_id) => self.store.list_assets(portfolio_id).await?,
            None => Vec::new(),
        };

        let resolver = self.resolver.clone();
        let progress = self.progress.clone();
        let handle = tokio::spawn(async move {
            resolver
                .resolve_with_progress(&rows, &existing, move |done, total| {
                    let _ = progress.send(ImportProgress::Resolved { done, total });
                })
                .await
        });
        Ok(ResolutionTask { handle })
    }

    /// Waits for `task`. A cancelled task returns the wizard to preview.
    pub async fn finish_resolution(&mut self, task: ResolutionTask) -> Result<&[ResolvedInstrument], ImportError> {
        match task.wait().await {
            Ok(result) => {
                if !result.success {
                    warn!("Resolution degraded: {}", result.errors.join("; "));
                }
                self.instruments = result.resolved;
                self.resolve_errors = result.errors;
                self.wizard.transition(WizardEvent::ResolutionFinished)?;
                Ok(&self.instruments)
            }
            Err(ImportError::Cancelled) => {
                info!("Resolution cancelled");
                self.wizard.transition(WizardEvent::ResolutionCancelled)?;
                Err(ImportError::Cancelled)
            }
            Err(err) => {
                self.wizard.transition(WizardEvent::ResolutionCancelled)?;
                Err(err)
            }
        }
    }

    pub async fn cancel_resolution(&mut self, task: ResolutionTask) -> Result<(), ImportError> {
        task.cancel();
        match self.finish_resolution(task).await {
            Ok(_) | Err(ImportError::Cancelled) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Applies a review edit to the instrument at `index`.
    pub fn edit(&mut self, index: usize, edit: InstrumentEdit) -> Result<(), ImportError> {
        if self.wizard.step() != WizardStep::Review {
            return Err(ImportError::InvalidTransition(format!(
                "cannot edit instruments while in {}",
                self.wizard.step()
            )));
        }
        let instrument = self
            .instruments
            .get_mut(index)
            .ok_or_else(|| ImportError::InvalidTransition(format!("no instrument at index {}", index)))?;
        instrument.apply_edit(edit);
        Ok(())
    }

    pub fn grouped(&self) -> Vec<GroupedRow<'_, ResolvedInstrument>> {
        group(&self.instruments)
    }

    pub fn bucket_counts(&self) -> BucketCounts {
        counts_by_bucket(&self.instruments)
    }

    /// Writes the reviewed instruments and the parsed history. Fails without
    /// touching the store when the portfolio or platform is missing.
    pub async fn execute(&mut self) -> Result<ImportResult, ImportError> {
        self.wizard.transition(WizardEvent::StartImport)?;
        let (portfolio_id, platform) = match (self.wizard.portfolio_id(), self.wizard.platform()) {
            (Some(portfolio_id), Some(platform)) => (portfolio_id, platform.to_string()),
            _ => {
                self.wizard.transition(WizardEvent::ImportFailed)?;
                return Err(ImportError::InvalidTransition("import is not configured".to_string()));
            }
        };

        for instrument in &mut self.instruments {
            instrument.set_platform(&platform);
        }
        let transactions: Vec<_> = self
            .parsed
            .as_ref()
            .map(|parsed| parsed.transactions.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|tx| {
                if tx.platform().trim().is_empty() {
                    tx.with_platform(&platform)
                } else {
                    tx
                }
            })
            .collect();

        let progress = self.progress.clone();
        let result = self
            .executor
            .execute_with_progress(&self.instruments, &transactions, portfolio_id, move |done, total| {
                let _ = progress.send(ImportProgress::Executing { done, total });
            })
            .await;

        self.emit(ImportProgress::Finished(result.clone()));
        let event = if result.success {
            WizardEvent::ImportFinished
        } else {
            WizardEvent::ImportFailed
        };
        self.wizard.transition(event)?;
        Ok(result)
    }

    /// Back to upload, dropping everything parsed or resolved so far.
    pub fn reset(&mut self) -> Result<(), ImportError> {
        self.wizard.transition(WizardEvent::Reset)?;
        self.parsed = None;
        self.instruments.clear();
        self.resolve_errors.clear();
        Ok(())
    }

    fn emit(&self, event: ImportProgress) {
        // The receiver may have been dropped by a caller that ignores progress.
        let _ = self.progress.send(event);
    }
}
