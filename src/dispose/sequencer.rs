use super::Disposable;
use std::borrow::Cow;

struct Step {
    label: Cow<'static, str>,
    target: Disposable,
}

/// Releases a fixed, ordered list of resources.
///
/// Every step is attempted even when an earlier one fails. Failures are
/// logged and counted, never propagated.
///
/// # Example
///
/// ```rust,ignore
/// let failures = DisposalSequencer::new()
///     .then("content root provider", provider)
///     .then("application", application)
///     .then("service container", container)
///     .run()
///     .await;
/// ```
#[derive(Default)]
pub struct DisposalSequencer {
    steps: Vec<Step>,
}

impl DisposalSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resource to the end of the sequence.
    pub fn then(mut self, label: impl Into<Cow<'static, str>>, target: Disposable) -> Self {
        self.steps.push(Step {
            label: label.into(),
            target,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order and returns how many of them failed.
    pub async fn run(self) -> usize {
        let mut failures = 0;

        for step in self.steps {
            if step.target.is_inert() {
                continue;
            }
            tracing::debug!("Disposing: {}", step.label);
            if let Err(e) = step.target.release().await {
                failures += 1;
                tracing::warn!("Disposal failed for {}: {:#}", step.label, e);
            }
        }

        failures
    }
}
