//! Drives a task record through its step graph until a terminal status.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::record::TaskRecord;
use crate::step::{Step, StepError, Transition};

/// Runs one task to completion. The upcoming step lives here, not on the
/// record, so records stay plain data.
pub struct StateMachine<D, I, O> {
    current: Box<dyn Step<D, I, O>>,
}

impl<D, I, O> StateMachine<D, I, O>
where
    D: Send,
    I: Send,
    O: Send,
{
    pub fn new(initial: Box<dyn Step<D, I, O>>) -> Self {
        Self { current: initial }
    }

    /// Execute steps until the record reaches a terminal status. Cancellation
    /// is cooperative: the token is checked between steps, so a step that is
    /// already running completes before the task is marked `Cancelled`.
    ///
    /// On `Err` the record is left non-terminal; the caller decides how the
    /// failure terminates the task.
    pub async fn run(
        mut self,
        driver: &mut D,
        record: &mut TaskRecord<I, O>,
        cancel: &CancellationToken,
    ) -> Result<(), StepError> {
        while !record.status.is_terminal() {
            if cancel.is_cancelled() {
                record.cancel();
                break;
            }

            let name = self.current.name().to_string();
            record.current_step = Some(name.clone());
            debug!(task = %record.id, step = %name, "Running step");

            match self.current.run(driver, record).await? {
                Transition::Next(step) => self.current = step,
                Transition::Finish(status) if status.is_terminal() => record.finish(status),
                Transition::Finish(status) => {
                    return Err(StepError::unexpected(anyhow::anyhow!(
                        "step '{name}' finished with non-terminal status {status:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TaskStatus;
    use async_trait::async_trait;

    struct Done(TaskStatus);

    #[async_trait]
    impl Step<(), (), u32> for Done {
        fn name(&self) -> &str {
            "done"
        }

        async fn run(
            &self,
            _driver: &mut (),
            record: &mut TaskRecord<(), u32>,
        ) -> Result<Transition<(), (), u32>, StepError> {
            record.output += 1;
            Ok(Transition::Finish(self.0))
        }
    }

    struct Chain(u32);

    #[async_trait]
    impl Step<(), (), u32> for Chain {
        fn name(&self) -> &str {
            "chain"
        }

        async fn run(
            &self,
            _driver: &mut (),
            record: &mut TaskRecord<(), u32>,
        ) -> Result<Transition<(), (), u32>, StepError> {
            record.output += 1;
            if self.0 == 0 {
                Ok(Transition::Finish(TaskStatus::Succeeded))
            } else {
                Ok(Transition::Next(Box::new(Chain(self.0 - 1))))
            }
        }
    }

    #[tokio::test]
    async fn runs_chain_to_success() {
        let mut record = TaskRecord::new((), 0u32);
        let machine = StateMachine::new(Box::new(Chain(2)));
        machine
            .run(&mut (), &mut record, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.status, TaskStatus::Succeeded);
        assert_eq!(record.output, 3);
        assert_eq!(record.current_step.as_deref(), Some("chain"));
    }

    #[tokio::test]
    async fn non_terminal_finish_is_an_error() {
        let mut record = TaskRecord::new((), 0u32);
        let machine = StateMachine::new(Box::new(Done(TaskStatus::Initialized)));
        let err = machine
            .run(&mut (), &mut record, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Unexpected(_)));
        assert!(!record.status.is_terminal());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_step() {
        let token = CancellationToken::new();
        token.cancel();
        let mut record = TaskRecord::new((), 0u32);
        let machine = StateMachine::new(Box::new(Chain(5)));
        machine.run(&mut (), &mut record, &token).await.unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(record.output, 0);
    }
}
