//! MockSession - scripted in-memory page for unit testing.
//!
//! Elements can appear after a delay, react to clicks, refuse input or
//! detach mid-action. Time is `tokio::time`, so tests running with a paused
//! clock see reveals and timeouts without real sleeping.

use crate::locator::Selector;
use crate::result::SessionError;
use crate::session::{ElementAction, ElementHandle, ElementSnapshot, UiSession};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Declarative element for a mock page
#[derive(Debug, Clone)]
pub struct MockElement {
    selector: Selector,
    text: Option<String>,
    value: Option<String>,
    visible: bool,
    enabled: bool,
    attached: bool,
    appears_after: Duration,
    options: Vec<String>,
    reject_input: Option<String>,
    detach_on_action: bool,
    on_click: Vec<MockEffect>,
}

impl MockElement {
    /// Visible, enabled element matching `selector`
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            text: None,
            value: None,
            visible: true,
            enabled: true,
            attached: true,
            appears_after: Duration::ZERO,
            options: Vec::new(),
            reject_input: None,
            detach_on_action: false,
            on_click: Vec::new(),
        }
    }

    /// Set the text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Render the element hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Render the element disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Start out detached from the document
    #[must_use]
    pub const fn detached(mut self) -> Self {
        self.attached = false;
        self
    }

    /// Only show up `delay` after the page (or the triggering click)
    #[must_use]
    pub const fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    /// Allowed options for `SelectOption`
    #[must_use]
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Refuse typed input with `message`
    #[must_use]
    pub fn rejects_input(mut self, message: impl Into<String>) -> Self {
        self.reject_input = Some(message.into());
        self
    }

    /// Detach as soon as any action touches the element
    #[must_use]
    pub const fn detaches_on_action(mut self) -> Self {
        self.detach_on_action = true;
        self
    }

    /// Run `effect` when clicked
    #[must_use]
    pub fn on_click(mut self, effect: MockEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn matches(&self, query: &Selector) -> bool {
        if &self.selector == query {
            return true;
        }
        let text = self.text.as_deref().unwrap_or("");
        match query {
            Selector::Text(needle) => text.contains(needle.as_str()),
            Selector::CssWithText { css, text: needle } => {
                self.selector == Selector::Css(css.clone()) && text.contains(needle.as_str())
            }
            _ => false,
        }
    }
}

/// Page mutation triggered by a click
#[derive(Debug, Clone)]
pub enum MockEffect {
    /// Insert a new element (its `appears_after` counts from the click)
    Reveal(MockElement),
    /// Detach every element matching the selector
    Remove(Selector),
    /// Make matching elements visible
    Show(Selector),
    /// Replace the text of matching elements
    SetText {
        /// Target elements
        selector: Selector,
        /// New text
        text: String,
    },
    /// Load another page
    Navigate(String),
}

/// Elements loaded when a URL is visited
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    elements: Vec<MockElement>,
}

impl MockPage {
    /// Empty page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element
    #[must_use]
    pub fn with(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }
}

#[derive(Debug, Clone)]
struct LiveElement {
    id: u64,
    spec: MockElement,
    visible_from: Instant,
}

impl LiveElement {
    fn present(&self, now: Instant) -> bool {
        self.spec.attached && now >= self.visible_from
    }
}

/// Mock session for unit testing
#[derive(Debug)]
pub struct MockSession {
    pages: HashMap<String, MockPage>,
    current_url: String,
    live: Vec<LiveElement>,
    next_id: u64,
    call_history: Vec<String>,
    failing_navigation: Option<String>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    /// Blank session on `about:blank`
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            current_url: "about:blank".to_string(),
            live: Vec::new(),
            next_id: 1,
            call_history: Vec::new(),
            failing_navigation: None,
        }
    }

    /// Register a page served at `url`
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, page: MockPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    /// Insert an element into the current page right away
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.insert(element, Instant::now());
        self
    }

    /// Make navigation to `url` fail
    #[must_use]
    pub fn failing_navigation(mut self, url: impl Into<String>) -> Self {
        self.failing_navigation = Some(url.into());
        self
    }

    /// Current URL
    #[must_use]
    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    /// Call history for verification
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.call_history
    }

    /// Check if a call starting with `method` was made
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history.iter().any(|c| c.starts_with(method))
    }

    /// Current value of the single element matching `selector`
    #[must_use]
    pub fn value_of(&self, selector: &Selector) -> Option<String> {
        self.live
            .iter()
            .find(|e| e.spec.attached && e.spec.matches(selector))
            .and_then(|e| e.spec.value.clone())
    }

    fn insert(&mut self, element: MockElement, origin: Instant) {
        let visible_from = origin + element.appears_after;
        self.live.push(LiveElement {
            id: self.next_id,
            spec: element,
            visible_from,
        });
        self.next_id += 1;
    }

    fn load(&mut self, url: &str) {
        for element in &mut self.live {
            element.spec.attached = false;
        }
        self.live.clear();
        self.current_url = url.to_string();
        let now = Instant::now();
        let elements = self
            .pages
            .get(url)
            .map(|p| p.elements.clone())
            .unwrap_or_default();
        for element in elements {
            self.insert(element, now);
        }
    }

    fn apply(&mut self, effect: MockEffect) {
        let now = Instant::now();
        match effect {
            MockEffect::Reveal(element) => self.insert(element, now),
            MockEffect::Remove(selector) => {
                for e in self.live.iter_mut().filter(|e| e.spec.matches(&selector)) {
                    e.spec.attached = false;
                }
            }
            MockEffect::Show(selector) => {
                for e in self.live.iter_mut().filter(|e| e.spec.matches(&selector)) {
                    e.spec.visible = true;
                }
            }
            MockEffect::SetText { selector, text } => {
                for e in self.live.iter_mut().filter(|e| e.spec.matches(&selector)) {
                    e.spec.text = Some(text.clone());
                }
            }
            MockEffect::Navigate(url) => self.load(&url),
        }
    }

    fn live_mut(&mut self, handle: ElementHandle) -> Result<&mut LiveElement, SessionError> {
        let now = Instant::now();
        self.live
            .iter_mut()
            .find(|e| e.id == handle.id() && e.present(now))
            .ok_or(SessionError::Detached {
                handle: handle.id(),
            })
    }
}

#[async_trait]
impl UiSession for MockSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.call_history.push(format!("navigate:{url}"));
        if self.failing_navigation.as_deref() == Some(url) {
            return Err(SessionError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        self.load(url);
        Ok(())
    }

    async fn query_elements(&self, selector: &Selector) -> Result<Vec<ElementHandle>, SessionError> {
        let now = Instant::now();
        Ok(self
            .live
            .iter()
            .filter(|e| e.present(now) && e.spec.matches(selector))
            .map(|e| ElementHandle::new(e.id))
            .collect())
    }

    async fn perform_action(
        &mut self,
        handle: ElementHandle,
        action: &ElementAction,
    ) -> Result<(), SessionError> {
        self.call_history
            .push(format!("{}:{}", action.verb(), handle.id()));
        let element = self.live_mut(handle)?;
        if element.spec.detach_on_action {
            element.spec.attached = false;
            return Err(SessionError::Detached {
                handle: handle.id(),
            });
        }

        let mut effects = Vec::new();
        match action {
            ElementAction::Click => effects = element.spec.on_click.clone(),
            ElementAction::TypeText(text) => {
                if let Some(message) = &element.spec.reject_input {
                    return Err(SessionError::rejected(message.clone()));
                }
                element
                    .spec
                    .value
                    .get_or_insert_with(String::new)
                    .push_str(text);
            }
            ElementAction::SelectOption(option) => {
                if !element.spec.options.is_empty() && !element.spec.options.contains(option) {
                    return Err(SessionError::rejected(format!("no option {option:?}")));
                }
                element.spec.value = Some(option.clone());
            }
            ElementAction::Clear => element.spec.value = Some(String::new()),
            ElementAction::ScrollIntoView => {}
        }

        for effect in effects {
            self.apply(effect);
        }
        Ok(())
    }

    async fn read_state(&self, handle: ElementHandle) -> Result<ElementSnapshot, SessionError> {
        let now = Instant::now();
        Ok(self
            .live
            .iter()
            .find(|e| e.id == handle.id() && e.present(now))
            .map_or_else(ElementSnapshot::detached, |e| ElementSnapshot {
                attached: true,
                visible: e.spec.visible,
                enabled: e.spec.enabled,
                text: e.spec.text.clone(),
                value: e.spec.value.clone(),
            }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_navigate_loads_page_and_records_history() {
        let mut session = MockSession::new().with_page(
            "https://app.test/login",
            MockPage::new().with(MockElement::new(Selector::test_id("txtFieldEmail"))),
        );
        session.navigate("https://app.test/login").await.unwrap();
        assert_eq!(session.current_url(), "https://app.test/login");
        assert!(session.was_called("navigate:https://app.test/login"));
        let found = session
            .query_elements(&Selector::test_id("txtFieldEmail"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_invalidates_old_handles() {
        let mut session = MockSession::new().with_element(MockElement::new(Selector::css("#a")));
        let handle = session.query_elements(&Selector::css("#a")).await.unwrap()[0];
        session.navigate("https://app.test/other").await.unwrap();
        let state = session.read_state(handle).await.unwrap();
        assert!(!state.attached);
        let err = session
            .perform_action(handle, &ElementAction::Click)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Detached { handle: handle.id() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_element_appears() {
        let session = MockSession::new().with_element(
            MockElement::new(Selector::css("#late")).appears_after(Duration::from_millis(500)),
        );
        assert!(session.query_elements(&Selector::css("#late")).await.unwrap().is_empty());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(session.query_elements(&Selector::css("#late")).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_reveals_element() {
        let mut session = MockSession::new().with_element(
            MockElement::new(Selector::css("#save")).on_click(MockEffect::Reveal(
                MockElement::new(Selector::css(".swal2-header")).text("Sucesso"),
            )),
        );
        let save = session.query_elements(&Selector::css("#save")).await.unwrap()[0];
        session.perform_action(save, &ElementAction::Click).await.unwrap();
        let found = session.query_elements(&Selector::text("Sucesso")).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_appends_and_rejects() {
        let mut session = MockSession::new()
            .with_element(MockElement::new(Selector::css("#cpf")))
            .with_element(MockElement::new(Selector::css("#ro")).rejects_input("readonly"));
        let cpf = session.query_elements(&Selector::css("#cpf")).await.unwrap()[0];
        session
            .perform_action(cpf, &ElementAction::TypeText("123".into()))
            .await
            .unwrap();
        session
            .perform_action(cpf, &ElementAction::TypeText("45".into()))
            .await
            .unwrap();
        assert_eq!(session.value_of(&Selector::css("#cpf")).as_deref(), Some("12345"));

        let ro = session.query_elements(&Selector::css("#ro")).await.unwrap()[0];
        let err = session
            .perform_action(ro, &ElementAction::TypeText("x".into()))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::rejected("readonly"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_option_checks_options() {
        let mut session = MockSession::new()
            .with_element(MockElement::new(Selector::css("select")).options(["Unimed", "SUS"]));
        let select = session.query_elements(&Selector::css("select")).await.unwrap()[0];
        assert!(session
            .perform_action(select, &ElementAction::SelectOption("SUS".into()))
            .await
            .is_ok());
        assert!(session
            .perform_action(select, &ElementAction::SelectOption("Bradesco".into()))
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_navigation() {
        let mut session = MockSession::new().failing_navigation("https://down.test/");
        let err = session.navigate("https://down.test/").await.unwrap_err();
        assert!(matches!(err, SessionError::Navigation { .. }));
    }
}
