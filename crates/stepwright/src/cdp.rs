//! Chromium session over the DevTools protocol.
//!
//! Elements found by a query are registered in a page-side map and referred
//! to by numeric id. The map lives in the page's JS realm, so a navigation
//! drops it and every earlier handle reads as detached. Ids keep increasing
//! across navigations and never point at a new element.

#![allow(clippy::significant_drop_tightening)]

use crate::config::BrowserConfig;
use crate::locator::Selector;
use crate::result::{FlowError, FlowResult, SessionError};
use crate::session::{ElementAction, ElementHandle, ElementSnapshot, UiSession};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Page-side registry shared by every script below
const REGISTRY: &str = "const r = window.__stepwright || (window.__stepwright = \
    { next: 1, nodes: new Map(), ids: new WeakMap() });";

/// A launched Chromium
#[derive(Debug)]
pub struct Browser {
    config: BrowserConfig,
    inner: Arc<Mutex<CdpBrowser>>,
    #[allow(dead_code)]
    handle: tokio::task::JoinHandle<()>,
}

impl Browser {
    /// Launch Chromium
    ///
    /// # Errors
    ///
    /// `BrowserLaunch` when no executable is found or it fails to start
    pub async fn launch(config: BrowserConfig) -> FlowResult<Self> {
        let mut builder = CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);

        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(|message| FlowError::BrowserLaunch { message })?;
        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| FlowError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        debug!(headless = config.headless, "browser launched");
        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(browser)),
            handle,
        })
    }

    /// Open a fresh page as a session
    ///
    /// # Errors
    ///
    /// `Session` when the page cannot be created
    pub async fn new_session(&self) -> FlowResult<CdpSession> {
        let browser = self.inner.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::transport(e.to_string()))?;
        Ok(CdpSession {
            page: Arc::new(Mutex::new(page)),
            test_id_attribute: self.config.test_id_attribute.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Launch configuration
    #[must_use]
    pub const fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Close the browser
    ///
    /// # Errors
    ///
    /// `Session` when the browser does not shut down cleanly
    pub async fn close(self) -> FlowResult<()> {
        let mut browser = self.inner.lock().await;
        browser
            .close()
            .await
            .map_err(|e| SessionError::transport(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    ids: Vec<u64>,
    next: u64,
}

/// One Chromium page driven through [`UiSession`]
#[derive(Debug)]
pub struct CdpSession {
    page: Arc<Mutex<CdpPage>>,
    test_id_attribute: String,
    next_id: AtomicU64,
}

impl CdpSession {
    async fn eval_json<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T, SessionError> {
        let page = self.page.lock().await;
        let raw: String = page
            .evaluate(script)
            .await
            .map_err(|e| SessionError::transport(e.to_string()))?
            .into_value()
            .map_err(|e| SessionError::transport(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| SessionError::transport(e.to_string()))
    }

    fn query_script(&self, selector: &Selector) -> String {
        let query = match selector {
            Selector::Text(text) => json!({ "text": text }),
            Selector::XPath(xpath) => json!({ "xpath": xpath }),
            Selector::CssWithText { css, text } => json!({ "css": css, "text": text }),
            other => json!({ "css": other.to_css(&self.test_id_attribute) }),
        };
        Self::registry_query(&query, self.next_id.load(Ordering::SeqCst))
    }

    /// Registers matches of `query` and prunes nodes that left the document,
    /// so their handles read as detached from then on
    fn registry_query(query: &serde_json::Value, start: u64) -> String {
        format!(
            r"(() => {{
  {REGISTRY}
  r.next = Math.max(r.next, {start});
  for (const [id, n] of r.nodes) if (!n.isConnected) {{ r.nodes.delete(id); r.ids.delete(n); }}
  const q = {query};
  let found = [];
  if (q.xpath) {{
    const snap = document.evaluate(q.xpath, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    for (let i = 0; i < snap.snapshotLength; i++) found.push(snap.snapshotItem(i));
  }} else if (q.css) {{
    found = Array.from(document.querySelectorAll(q.css));
    if (q.text) found = found.filter(n => (n.textContent || '').includes(q.text));
  }} else {{
    const all = Array.from(document.body ? document.body.querySelectorAll('*') : []);
    const hits = all.filter(n => (n.textContent || '').includes(q.text));
    found = hits.filter(n => !hits.some(m => m !== n && n.contains(m)));
  }}
  const ids = found.filter(n => n instanceof Element).map(n => {{
    let id = r.ids.get(n);
    if (id === undefined) {{ id = r.next++; r.ids.set(n, id); r.nodes.set(id, n); }}
    return id;
  }});
  return JSON.stringify({{ ids, next: r.next }});
}})()"
        )
    }

    fn node_script(handle: ElementHandle, body: &str) -> String {
        format!(
            r"(() => {{
  {REGISTRY}
  const n = r.nodes.get({id});
  if (!n || !n.isConnected) return JSON.stringify('detached');
  {body}
}})()",
            id = handle.id()
        )
    }

    async fn run_node_action(&self, handle: ElementHandle, body: &str) -> Result<(), SessionError> {
        let status: String = self.eval_json(&Self::node_script(handle, body)).await?;
        match status.as_str() {
            "ok" => Ok(()),
            "detached" => Err(SessionError::Detached { handle: handle.id() }),
            other => Err(SessionError::rejected(
                other.strip_prefix("rejected:").unwrap_or(other),
            )),
        }
    }
}

const CLICK: &str = "n.scrollIntoView({ block: 'center' }); n.click(); return JSON.stringify('ok');";

const FOCUS_EDITABLE: &str = "\
  const editable = n.isContentEditable || ((n.tagName === 'INPUT' || n.tagName === 'TEXTAREA') && !n.readOnly);
  if (!editable) {
    const inner = n.querySelector('input:not([readonly]), textarea:not([readonly])');
    if (!inner) return JSON.stringify('rejected:element is not editable');
    inner.focus();
    return JSON.stringify('ok');
  }
  n.focus();
  return JSON.stringify('ok');";

const CLEAR: &str = "\
  const t = ('value' in n) ? n : n.querySelector('input, textarea');
  if (!t) return JSON.stringify('rejected:element has no value');
  t.value = '';
  t.dispatchEvent(new Event('input', { bubbles: true }));
  t.dispatchEvent(new Event('change', { bubbles: true }));
  return JSON.stringify('ok');";

const SCROLL: &str = "n.scrollIntoView({ block: 'center' }); return JSON.stringify('ok');";

#[async_trait]
impl UiSession for CdpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let page = self.page.lock().await;
        page.goto(url).await.map_err(|e| SessionError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn query_elements(&self, selector: &Selector) -> Result<Vec<ElementHandle>, SessionError> {
        let result: QueryResult = self.eval_json(&self.query_script(selector)).await?;
        self.next_id.fetch_max(result.next, Ordering::SeqCst);
        Ok(result.ids.into_iter().map(ElementHandle::new).collect())
    }

    async fn perform_action(
        &mut self,
        handle: ElementHandle,
        action: &ElementAction,
    ) -> Result<(), SessionError> {
        match action {
            ElementAction::Click => self.run_node_action(handle, CLICK).await,
            ElementAction::TypeText(text) => {
                self.run_node_action(handle, FOCUS_EDITABLE).await?;
                let page = self.page.lock().await;
                page.execute(InsertTextParams::new(text.clone()))
                    .await
                    .map_err(|e| SessionError::transport(e.to_string()))?;
                Ok(())
            }
            ElementAction::SelectOption(option) => {
                let wanted = serde_json::to_string(option)
                    .map_err(|e| SessionError::transport(e.to_string()))?;
                let body = format!(
                    "const want = {wanted};
  if (n.tagName !== 'SELECT') return JSON.stringify('rejected:element is not a select');
  const opt = Array.from(n.options).find(o => o.value === want || o.label === want || o.text.trim() === want);
  if (!opt) return JSON.stringify('rejected:no matching option');
  n.value = opt.value;
  n.dispatchEvent(new Event('input', {{ bubbles: true }}));
  n.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return JSON.stringify('ok');"
                );
                self.run_node_action(handle, &body).await
            }
            ElementAction::Clear => self.run_node_action(handle, CLEAR).await,
            ElementAction::ScrollIntoView => self.run_node_action(handle, SCROLL).await,
        }
    }

    async fn read_state(&self, handle: ElementHandle) -> Result<ElementSnapshot, SessionError> {
        let script = format!(
            r"(() => {{
  {REGISTRY}
  const n = r.nodes.get({id});
  if (!n || !n.isConnected) return JSON.stringify({{ attached: false, visible: false, enabled: false }});
  const s = getComputedStyle(n);
  const b = n.getBoundingClientRect();
  return JSON.stringify({{
    attached: true,
    visible: s.visibility !== 'hidden' && s.display !== 'none' && (b.width > 0 || b.height > 0),
    enabled: !n.disabled && !n.closest('fieldset[disabled]'),
    text: n.innerText !== undefined ? n.innerText : n.textContent,
    value: ('value' in n) ? String(n.value) : null,
  }});
}})()",
            id = handle.id()
        );
        self.eval_json(&script).await
    }
}
