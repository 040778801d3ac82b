//! Import flow as an explicit state machine, independent of any front end.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use tracing::debug;

use crate::error::{ImportError, ValidationError};

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, EnumIter, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WizardStep {
    #[default]
    Upload,
    Analyzing,
    Preview,
    Resolving,
    Review,
    Importing,
    Done,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum WizardEvent {
    FileSelected,
    ParseSucceeded,
    ParseFailed,
    StartResolving,
    ResolutionFinished,
    ResolutionCancelled,
    StartImport,
    ImportFinished,
    ImportFailed,
    Back,
    Reset,
}

#[derive(Clone, Debug, Default)]
pub struct Wizard {
    step: WizardStep,
    portfolio_id: Option<i64>,
    platform: Option<String>,
    errors: Vec<ValidationError>,
}

impl Wizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn portfolio_id(&self) -> Option<i64> {
        self.portfolio_id
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// Errors of the last validation that are still unresolved.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn set_portfolio(&mut self, portfolio_id: i64) {
        self.portfolio_id = Some(portfolio_id);
        self.errors.retain(|err| *err != ValidationError::MissingPortfolio);
    }

    /// Blank labels count as unset.
    pub fn set_platform(&mut self, platform: &str) {
        let platform = platform.trim();
        if platform.is_empty() {
            self.platform = None;
            return;
        }
        self.platform = Some(platform.to_string());
        self.errors.retain(|err| *err != ValidationError::MissingPlatform);
    }

    pub fn validate(&mut self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.portfolio_id.is_none() {
            errors.push(ValidationError::MissingPortfolio);
        }
        if self.platform.is_none() {
            errors.push(ValidationError::MissingPlatform);
        }
        self.errors = errors.clone();
        errors
    }

    /// Applies `event` and returns the new step. Entering `Importing`
    /// requires validation to pass.
    pub fn transition(&mut self, event: WizardEvent) -> Result<WizardStep, ImportError> {
        use WizardEvent::*;
        use WizardStep::*;

        let next = match (self.step, event) {
            (Upload, FileSelected) => Analyzing,
            (Analyzing, ParseSucceeded) => Preview,
            (Analyzing, ParseFailed) => Upload,
            (Preview, StartResolving) => Resolving,
            (Preview, Back) => Upload,
            (Resolving, ResolutionFinished) => Review,
            (Resolving, ResolutionCancelled) => Preview,
            (Review, Back) => Preview,
            (Review, StartImport) => {
                let errors = self.validate();
                if !errors.is_empty() {
                    return Err(ImportError::Validation(errors));
                }
                Importing
            }
            (Importing, ImportFinished) => Done,
            (Importing, ImportFailed) => Review,
            (Importing, Reset) => return Err(self.invalid(event)),
            (_, Reset) => Upload,
            _ => return Err(self.invalid(event)),
        };

        debug!("Wizard {} --{}--> {}", self.step, event, next);
        self.step = next;
        if next == Upload {
            self.errors.clear();
        }
        Ok(next)
    }

    fn invalid(&self, event: WizardEvent) -> ImportError {
        ImportError::InvalidTransition(format!("cannot {} while in {}", event, self.step))
    }
}
