//! Action execution against resolved elements.
//!
//! Non-forced actions wait (bounded by the step deadline) until the target
//! is attached, visible and enabled, then perform the action exactly once.
//! Payloads never appear in logs or diagnostics.

use crate::result::{SessionError, StepError};
use crate::session::{ElementAction, ElementHandle, UiSession};
use crate::wait::{poll_until, Probe, WaitError, DEFAULT_POLL_INTERVAL_MS};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Performs [`ElementAction`]s with actionability checks
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    poll_interval: Duration,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl ActionExecutor {
    /// Create an executor with a custom poll interval
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Perform `action` on `handle`.
    ///
    /// With `force` the actionability wait is skipped; the session is still
    /// free to reject the action.
    ///
    /// # Errors
    ///
    /// Always `ActionFailed`: element detached, not actionable before
    /// `deadline`, input rejected, or the action itself did not finish in
    /// time.
    pub async fn execute<S: UiSession + ?Sized>(
        &self,
        session: &mut S,
        handle: ElementHandle,
        action: &ElementAction,
        force: bool,
        deadline: Instant,
    ) -> Result<(), StepError> {
        let verb = action.verb();
        if force {
            warn!(%handle, action = verb, "forcing action, actionability checks skipped");
        } else {
            self.wait_actionable(&*session, handle, verb, deadline).await?;
        }

        debug!(%handle, action = verb, "performing action");
        match tokio::time::timeout_at(deadline, session.perform_action(handle, action)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(SessionError::Detached { .. })) => Err(StepError::action_failed(format!(
                "{verb}: element {handle} detached mid-action"
            ))),
            Ok(Err(SessionError::Rejected { message })) => Err(StepError::action_failed(format!(
                "{verb}: input rejected on {handle}: {message}"
            ))),
            Ok(Err(e)) => Err(StepError::action_failed(format!("{verb}: {e}"))),
            Err(_) => Err(StepError::action_failed(format!(
                "{verb}: action on {handle} did not complete before the step deadline"
            ))),
        }
    }

    async fn wait_actionable<S: UiSession + ?Sized>(
        &self,
        session: &S,
        handle: ElementHandle,
        verb: &str,
        deadline: Instant,
    ) -> Result<(), StepError> {
        let started = Instant::now();
        let outcome = poll_until(deadline, self.poll_interval, || async move {
            match session.read_state(handle).await {
                Ok(state) if !state.attached => Probe::Fail("element detached".to_string()),
                Ok(state) if state.is_actionable() => Probe::Ready(()),
                Ok(state) if !state.visible => Probe::Retry("hidden".to_string()),
                Ok(_) => Probe::Retry("disabled".to_string()),
                Err(SessionError::Detached { .. }) => Probe::Fail("element detached".to_string()),
                Err(e) => Probe::Retry(e.to_string()),
            }
        })
        .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(WaitError::Failed(observed)) => Err(StepError::action_failed(format!(
                "{verb}: {handle} not actionable ({observed})"
            ))),
            Err(WaitError::TimedOut(observed)) => Err(StepError::action_failed(format!(
                "{verb}: {handle} not actionable after {}ms ({observed})",
                started.elapsed().as_millis()
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::Selector;
    use crate::mock::{MockEffect, MockElement, MockSession};
    use crate::result::FailureKind;
    use crate::wait::deadline_after;

    async fn first_handle(session: &MockSession, selector: &Selector) -> ElementHandle {
        session.query_elements(selector).await.unwrap()[0]
    }

    mod actionability_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_click_on_actionable_element() {
            let mut session = MockSession::new().with_element(MockElement::new(Selector::css("#go")));
            let handle = first_handle(&session, &Selector::css("#go")).await;
            let result = ActionExecutor::default()
                .execute(&mut session, handle, &ElementAction::Click, false, Instant::now())
                .await;
            assert!(result.is_ok());
            assert!(session.was_called("click:"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_waits_until_shown() {
            let mut session = MockSession::new()
                .with_element(MockElement::new(Selector::css("#menu")).hidden())
                .with_element(MockElement::new(Selector::css("#toggle")).on_click(MockEffect::Show(
                    Selector::css("#menu"),
                )));
            let menu = first_handle(&session, &Selector::css("#menu")).await;
            let toggle = first_handle(&session, &Selector::css("#toggle")).await;
            session
                .perform_action(toggle, &ElementAction::Click)
                .await
                .unwrap();
            let result = ActionExecutor::default()
                .execute(
                    &mut session,
                    menu,
                    &ElementAction::Click,
                    false,
                    deadline_after(Instant::now(), 1000),
                )
                .await;
            assert!(result.is_ok());
        }

        #[tokio::test(start_paused = true)]
        async fn test_disabled_element_times_out_as_action_failed() {
            let mut session =
                MockSession::new().with_element(MockElement::new(Selector::css("#save")).disabled());
            let handle = first_handle(&session, &Selector::css("#save")).await;
            let start = Instant::now();
            let err = ActionExecutor::default()
                .execute(
                    &mut session,
                    handle,
                    &ElementAction::Click,
                    false,
                    deadline_after(start, 500),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::ActionFailed);
            assert!(err.message.contains("not actionable"));
            assert!(err.message.contains("disabled"));
            assert!(start.elapsed() >= Duration::from_millis(500));
            assert!(!session.was_called("click:"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_force_skips_checks() {
            let mut session =
                MockSession::new().with_element(MockElement::new(Selector::css("#tab")).hidden());
            let handle = first_handle(&session, &Selector::css("#tab")).await;
            let result = ActionExecutor::default()
                .execute(&mut session, handle, &ElementAction::Click, true, Instant::now())
                .await;
            assert!(result.is_ok());
            assert!(session.was_called("click:"));
        }
    }

    mod failure_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_detached_mid_action() {
            let mut session = MockSession::new()
                .with_element(MockElement::new(Selector::css("#flaky")).detaches_on_action());
            let handle = first_handle(&session, &Selector::css("#flaky")).await;
            let err = ActionExecutor::default()
                .execute(&mut session, handle, &ElementAction::Click, false, Instant::now())
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::ActionFailed);
            assert!(err.message.contains("detached mid-action"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_rejected_input_hides_payload() {
            let mut session = MockSession::new()
                .with_element(MockElement::new(Selector::css("#pw")).rejects_input("readonly"));
            let handle = first_handle(&session, &Selector::css("#pw")).await;
            let err = ActionExecutor::default()
                .execute(
                    &mut session,
                    handle,
                    &ElementAction::TypeText("hunter2".to_string()),
                    false,
                    Instant::now(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::ActionFailed);
            assert!(err.message.contains("input rejected"));
            assert!(!err.message.contains("hunter2"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_stale_handle_fails() {
            let mut session = MockSession::new().with_element(MockElement::new(Selector::css("#a")));
            let handle = first_handle(&session, &Selector::css("#a")).await;
            session.navigate("https://app.test/next").await.unwrap();
            let err = ActionExecutor::default()
                .execute(&mut session, handle, &ElementAction::Click, false, Instant::now())
                .await
                .unwrap_err();
            assert_eq!(err.kind, FailureKind::ActionFailed);
            assert!(err.message.contains("detached"));
        }
    }
}
