//! Session registry.
//!
//! A session is one live connection + page handle pair, addressed by a
//! caller-supplied identifier. Any tool call naming a session id provisions
//! one lazily; get-or-create is atomic per key, so two concurrent calls on
//! the same new id await a single connection attempt.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use webgate_core::{Error, Result};

use super::cdp::CdpClient;
use super::page::{CdpPage, PageOps};
use crate::notify::Notifier;
use crate::resources::ResourceCatalog;

/// One addressable live session. The registry owns it; tools borrow the
/// page handle per call.
pub struct Session {
    pub id: String,
    pub page: Arc<dyn PageOps>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Produces a connected page handle for a session id. The production
/// implementation dials the remote provider; tests substitute their own.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, session_id: &str) -> Result<Arc<dyn PageOps>>;
}

type SessionSlot = Arc<OnceCell<Arc<Session>>>;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionSlot>>,
    connector: Arc<dyn Connector>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            connector,
        }
    }

    /// Get or create the session for `id`. Creation connects to the
    /// provider, installs the console subscription, and stores the pair.
    /// A failed connection leaves the slot empty so the id can be retried.
    pub async fn resolve(&self, id: &str) -> Result<Arc<Session>> {
        let slot = {
            let mut map = self.sessions.lock().await;
            map.entry(id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let session = slot
            .get_or_try_init(|| async {
                debug!(session = id, "creating browser session");
                let page = self.connector.connect(id).await?;
                info!(session = id, "browser session established");
                Ok::<_, Error>(Arc::new(Session {
                    id: id.to_string(),
                    page,
                }))
            })
            .await?;

        Ok(session.clone())
    }

    /// Force creation for `id` (the explicit create-session action).
    pub async fn create(&self, id: &str) -> Result<Arc<Session>> {
        self.resolve(id).await
    }

    /// Release the session for `id`. The connection drops once the last
    /// in-flight call holding the handle finishes.
    pub async fn close(&self, id: &str) -> Result<()> {
        let mut map = self.sessions.lock().await;
        match map.get(id) {
            // A slot mid-creation stays put: the pending resolve still owns
            // it and must hand out the same session it is initializing.
            Some(slot) if slot.initialized() => {
                map.remove(id);
                info!(session = id, "browser session closed");
                Ok(())
            }
            _ => Err(Error::NotFound(format!("session '{}' not found", id))),
        }
    }

    /// Identifiers of currently live sessions.
    pub async fn session_ids(&self) -> Vec<String> {
        let map = self.sessions.lock().await;
        map.iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Dials the remote browser provider over its CDP WebSocket endpoint and
/// wires console events into the resource catalog and notifier.
pub struct RemoteConnector {
    connect_string: String,
    catalog: Arc<ResourceCatalog>,
    notifier: Notifier,
}

impl RemoteConnector {
    pub fn new(connect_string: String, catalog: Arc<ResourceCatalog>, notifier: Notifier) -> Self {
        Self {
            connect_string,
            catalog,
            notifier,
        }
    }
}

#[async_trait]
impl Connector for RemoteConnector {
    async fn connect(&self, session_id: &str) -> Result<Arc<dyn PageOps>> {
        let cdp = CdpClient::connect(&self.connect_string).await?;

        cdp.enable_domain("Runtime").await?;
        cdp.enable_domain("Page").await?;
        cdp.enable_domain("DOM").await?;

        // Console subscription: every console event appends one formatted
        // log entry and emits one message notification, independent of any
        // in-flight tool call.
        let mut events = cdp.subscribe_event("Runtime.consoleAPICalled").await;
        let catalog = self.catalog.clone();
        let notifier = self.notifier.clone();
        let id = session_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let level = event
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("log")
                    .to_string();
                let text = format_console_args(event.get("args"));
                let line = catalog.append_console(&id, &level, &text).await;
                notifier.console_message(line);
            }
            warn!(session = %id, "console event stream ended");
        });

        Ok(Arc::new(CdpPage::new(cdp)))
    }
}

/// Render CDP RemoteObject console arguments as one display string.
fn format_console_args(args: Option<&Value>) -> String {
    let Some(arr) = args.and_then(|v| v.as_array()) else {
        return String::new();
    };
    arr.iter()
        .map(|arg| {
            if let Some(s) = arg.get("value").and_then(|v| v.as_str()) {
                s.to_string()
            } else if let Some(v) = arg.get("value") {
                v.to_string()
            } else if let Some(d) = arg.get("description").and_then(|v| v.as_str()) {
                d.to_string()
            } else {
                String::new()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::page::PageSources;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullPage;

    #[async_trait]
    impl PageOps for NullPage {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn set_viewport(&self, _w: u32, _h: u32) -> Result<()> {
            Ok(())
        }
        async fn click(&self, _selector: &str) -> Result<()> {
            Ok(())
        }
        async fn fill(&self, _selector: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn wait_for_selector(&self, _selector: &str, _timeout_ms: u64) -> Result<()> {
            Ok(())
        }
        async fn screenshot(&self, _clip: Option<&str>) -> Result<Option<String>> {
            Ok(Some("aGVsbG8=".to_string()))
        }
        async fn evaluate(&self, _expression: &str) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn text_content(&self, _selector: Option<&str>) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn page_sources(&self) -> Result<PageSources> {
            Ok(PageSources::default())
        }
    }

    /// Counts connections and optionally fails the first attempt.
    struct CountingConnector {
        connects: AtomicUsize,
        fail_first: bool,
    }

    impl CountingConnector {
        fn new() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                fail_first: false,
            }
        }

        fn failing_once() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                fail_first: true,
            }
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, _session_id: &str) -> Result<Arc<dyn PageOps>> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(Error::Provider("provider unreachable".to_string()));
            }
            Ok(Arc::new(NullPage))
        }
    }

    #[tokio::test]
    async fn resolve_creates_session_once() {
        let connector = Arc::new(CountingConnector::new());
        let registry = SessionRegistry::new(connector.clone());

        let a = registry.resolve("s1").await.unwrap();
        let b = registry.resolve("s1").await.unwrap();
        assert_eq!(a.id, "s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_resolves_of_new_id_create_one_session() {
        let connector = Arc::new(CountingConnector::new());
        let registry = Arc::new(SessionRegistry::new(connector.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = registry.clone();
            handles.push(tokio::spawn(async move { reg.resolve("shared").await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(registry.session_ids().await, vec!["shared".to_string()]);
    }

    #[tokio::test]
    async fn distinct_ids_create_distinct_sessions() {
        let connector = Arc::new(CountingConnector::new());
        let registry = SessionRegistry::new(connector.clone());

        registry.resolve("a").await.unwrap();
        registry.resolve("b").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

        let mut ids = registry.session_ids().await;
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn failed_connection_can_be_retried() {
        let connector = Arc::new(CountingConnector::failing_once());
        let registry = SessionRegistry::new(connector.clone());

        let err = registry.resolve("flaky").await.unwrap_err();
        assert!(err.to_string().contains("provider unreachable"));
        assert!(registry.session_ids().await.is_empty());

        registry.resolve("flaky").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    /// Holds every connect attempt until the gate is released.
    struct GatedConnector {
        connects: AtomicUsize,
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Connector for GatedConnector {
        async fn connect(&self, _session_id: &str) -> Result<Arc<dyn PageOps>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Arc::new(NullPage))
        }
    }

    #[tokio::test]
    async fn close_during_creation_leaves_the_pending_session_intact() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let connector = Arc::new(GatedConnector {
            connects: AtomicUsize::new(0),
            gate: gate.clone(),
        });
        let registry = Arc::new(SessionRegistry::new(connector.clone()));

        let reg = registry.clone();
        let pending = tokio::spawn(async move { reg.resolve("slow").await });
        while connector.connects.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let err = registry.close("slow").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        gate.notify_one();
        pending.await.unwrap().unwrap();

        registry.resolve("slow").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(registry.session_ids().await, vec!["slow".to_string()]);
    }

    #[test]
    fn session_debug_carries_the_id() {
        let session = Session {
            id: "s9".to_string(),
            page: Arc::new(NullPage),
        };
        assert!(format!("{:?}", session).contains("s9"));
    }

    #[tokio::test]
    async fn close_removes_session() {
        let connector = Arc::new(CountingConnector::new());
        let registry = SessionRegistry::new(connector.clone());

        registry.resolve("gone").await.unwrap();
        registry.close("gone").await.unwrap();
        assert!(registry.session_ids().await.is_empty());

        let err = registry.close("gone").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn console_args_render_values_and_descriptions() {
        let args = serde_json::json!([
            { "type": "string", "value": "hello" },
            { "type": "number", "value": 42 },
            { "type": "object", "description": "Object" },
        ]);
        assert_eq!(format_console_args(Some(&args)), "hello 42 Object");
        assert_eq!(format_console_args(None), "");
    }
}
