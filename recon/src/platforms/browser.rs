//! [`DocumentEngine`] backed by JavaScript evaluated in the active browser tab.
//!
//! Every operation is a single script sent over the [`ExtensionBridge`].
//! Located elements are tagged with a `data-recon-ref` attribute so later
//! calls can find them again; when the remote UI re-renders, the tag is gone
//! and the call fails with [`ReconError::ElementDetached`].

use crate::extension_bridge::ExtensionBridge;
use crate::platforms::{
    ContextId, DocumentEngine, DomEvent, ElementRef, ElementSnapshot, FrameInfo,
};
use crate::{ReconError, Selector, SourceDocument};
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};

const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(20);

// Shared helpers, prepended to every operation. `p` holds the parameters.
const PRELUDE: &str = r#"
const doc = (ctx) => {
  if (ctx === null) return document;
  const frame = document.getElementById(ctx);
  if (!frame || !frame.contentDocument) throw new Error('frame not reachable: ' + ctx);
  return frame.contentDocument;
};
const tag = (el) => {
  let ref = el.getAttribute('data-recon-ref');
  if (!ref) {
    window.top.__reconSeq = (window.top.__reconSeq || 0) + 1;
    ref = 'r' + window.top.__reconSeq;
    el.setAttribute('data-recon-ref', ref);
  }
  return ref;
};
const find = (ctx, handle) => doc(ctx).querySelector('[data-recon-ref="' + handle + '"]');
const snap = (el) => ({
  handle: tag(el),
  text: el.textContent || '',
  value: typeof el.value === 'string' ? el.value : null,
  checked: el.type === 'checkbox' || el.type === 'radio' ? el.checked : null,
});
const fire = (el, events) => {
  for (const e of events) {
    if (e === 'input' || e === 'change') {
      el.dispatchEvent(new Event(e, { bubbles: true }));
    } else if (e === 'enter_key') {
      el.dispatchEvent(new KeyboardEvent('keydown', {
        key: 'Enter', code: 'Enter', keyCode: 13, which: 13, bubbles: true, cancelable: true,
      }));
    } else if (e === 'blur') {
      el.blur();
    }
  }
};
"#;

const QUERY_ALL: &str = r#"
const root = p.scope === null ? doc(p.ctx) : find(p.ctx, p.scope);
if (!root) return { detached: true };
return { elements: Array.from(root.querySelectorAll(p.css)).map(snap) };
"#;

const FRAMES: &str = r#"
return Array.from(document.querySelectorAll(p.css)).map((f, i) => {
  if (!f.id) f.id = 'recon-frame-' + i;
  let length = null;
  try {
    const d = f.contentDocument;
    if (d && d.documentElement) length = d.documentElement.innerHTML.length;
  } catch (e) {}
  return { id: f.id, content_length: length };
});
"#;

const TEXT_CONTENT: &str = r#"
const d = doc(p.ctx);
return d.body ? d.body.textContent : '';
"#;

const CLICK: &str = r#"
const el = find(p.ctx, p.handle);
if (!el) return { detached: true };
el.click();
return {};
"#;

// The native setter bypasses framework wrappers that swallow plain writes.
const SET_VALUE: &str = r#"
const el = find(p.ctx, p.handle);
if (!el) return { detached: true };
el.focus();
const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
if (desc && desc.set) desc.set.call(el, p.value); else el.value = p.value;
fire(el, p.events);
return {};
"#;

const SET_CHECKED: &str = r#"
const el = find(p.ctx, p.handle);
if (!el) return { detached: true };
if (el.checked !== p.checked) el.click();
return {};
"#;

const ATTACH_FILE: &str = r#"
const el = find(p.ctx, p.handle);
if (!el) return { detached: true };
const bytes = Uint8Array.from(atob(p.data), (c) => c.charCodeAt(0));
const dt = new DataTransfer();
dt.items.add(new File([bytes], p.name, { type: p.mime }));
el.files = dt.files;
fire(el, p.events);
return {};
"#;

#[derive(Debug, Default, Deserialize)]
struct ActionResult {
    #[serde(default)]
    detached: bool,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResult {
    #[serde(default)]
    detached: bool,
    #[serde(default)]
    elements: Vec<ElementSnapshot>,
}

pub struct BrowserEngine {
    bridge: Arc<ExtensionBridge>,
    eval_timeout: Duration,
}

impl BrowserEngine {
    pub fn new(bridge: Arc<ExtensionBridge>) -> Self {
        Self {
            bridge,
            eval_timeout: DEFAULT_EVAL_TIMEOUT,
        }
    }

    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = timeout;
        self
    }

    async fn run<T: DeserializeOwned>(&self, body: &str, params: Value) -> Result<T, ReconError> {
        let code = build_script(body, &params);
        trace!(script_bytes = code.len(), "Evaluating page script");
        let value = self.bridge.eval(&code, self.eval_timeout).await?;
        decode(value)
    }

    async fn act(
        &self,
        element: &ElementRef,
        body: &str,
        mut params: Value,
    ) -> Result<(), ReconError> {
        params["ctx"] = context_param(&element.context);
        params["handle"] = json!(element.handle);
        let result: ActionResult = self.run(body, params).await?;
        if result.detached {
            return Err(ReconError::ElementDetached(element.handle.clone()));
        }
        Ok(())
    }
}

fn build_script(body: &str, params: &Value) -> String {
    format!("(async () => {{\nconst p = {params};\n{PRELUDE}\n{body}\n}})()")
}

fn context_param(context: &ContextId) -> Value {
    match context {
        ContextId::Top => Value::Null,
        ContextId::Frame(id) => json!(id),
    }
}

// The extension may hand back results already serialized as a JSON string.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ReconError> {
    if let Value::String(s) = &value {
        if let Ok(parsed) = serde_json::from_str::<T>(s) {
            return Ok(parsed);
        }
    }
    serde_json::from_value(value)
        .map_err(|e| ReconError::Script(format!("unexpected script result: {e}")))
}

#[async_trait::async_trait]
impl DocumentEngine for BrowserEngine {
    #[instrument(level = "trace", skip(self, scope), fields(selector = %selector))]
    async fn query_all(
        &self,
        context: &ContextId,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> Result<Vec<ElementSnapshot>, ReconError> {
        let params = json!({
            "ctx": context_param(context),
            "scope": scope.map(|s| s.handle.clone()),
            "css": selector.to_css()?,
        });
        let result: QueryResult = self.run(QUERY_ALL, params).await?;
        if result.detached {
            let handle = scope.map(|s| s.handle.clone()).unwrap_or_default();
            return Err(ReconError::ElementDetached(handle));
        }
        Ok(result.elements)
    }

    async fn frames(&self, naming: &Selector) -> Result<Vec<FrameInfo>, ReconError> {
        self.run(FRAMES, json!({ "css": naming.to_css()? })).await
    }

    async fn text_content(&self, context: &ContextId) -> Result<String, ReconError> {
        self.run(TEXT_CONTENT, json!({ "ctx": context_param(context) }))
            .await
    }

    #[instrument(level = "debug", skip(self), fields(handle = %element.handle))]
    async fn click(&self, element: &ElementRef) -> Result<(), ReconError> {
        self.act(element, CLICK, json!({})).await
    }

    #[instrument(level = "debug", skip(self, value), fields(handle = %element.handle))]
    async fn set_value(
        &self,
        element: &ElementRef,
        value: &str,
        events: &[DomEvent],
    ) -> Result<(), ReconError> {
        self.act(element, SET_VALUE, json!({ "value": value, "events": events }))
            .await
    }

    async fn set_checked(&self, element: &ElementRef, checked: bool) -> Result<(), ReconError> {
        self.act(element, SET_CHECKED, json!({ "checked": checked }))
            .await
    }

    #[instrument(level = "debug", skip(self, document), fields(handle = %element.handle, file = %document.name()))]
    async fn attach_file(
        &self,
        element: &ElementRef,
        document: &SourceDocument,
        events: &[DomEvent],
    ) -> Result<(), ReconError> {
        let bytes = tokio::fs::read(document.path()).await?;
        let params = json!({
            "data": base64::engine::general_purpose::STANDARD.encode(&bytes),
            "name": document.name(),
            "mime": document.mime_type(),
            "events": events,
        });
        self.act(element, ATTACH_FILE, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_embeds_parameters_as_json() {
        let params = json!({
            "ctx": context_param(&ContextId::Frame("ptModFrame_1".into())),
            "value": "it's \"quoted\"",
        });
        let script = build_script(CLICK, &params);
        assert!(script.starts_with("(async () => {"));
        assert!(script.contains(r#""ctx":"ptModFrame_1""#));
        assert!(script.contains(r#""value":"it's \"quoted\"""#));
        assert!(script.trim_end().ends_with("})()"));
    }

    #[test]
    fn events_serialize_to_script_names() {
        let events = json!([DomEvent::Input, DomEvent::EnterKey, DomEvent::Blur]);
        assert_eq!(events, json!(["input", "enter_key", "blur"]));
    }

    #[test]
    fn decode_accepts_stringified_results() {
        let frames: Vec<FrameInfo> =
            decode(Value::String(r#"[{"id":"ptModFrame_0","content_length":812}]"#.into()))
                .unwrap();
        assert_eq!(frames[0].content_length, Some(812));

        let text: String = decode(Value::String("plain body text".into())).unwrap();
        assert_eq!(text, "plain body text");
        let numeric: String = decode(Value::String("123.45".into())).unwrap();
        assert_eq!(numeric, "123.45");

        let action: ActionResult = decode(json!({ "detached": true })).unwrap();
        assert!(action.detached);
    }
}
