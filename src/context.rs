//! Per-document project context tracking
//!
//! A document in a multi-targeted project belongs to several project
//! contexts (one per target framework); the server designates a default.
//! [`ProjectContextTracker`] resolves the *effective* context for the
//! active document: a previously selected context wins while it is still
//! valid, otherwise the server default. Selections are cached per document
//! and a [`ContextChanged`] event goes out on every resolution.
//!
//! Two external triggers funnel into [`refresh`](ProjectContextTracker::refresh):
//! the host reporting an active-document change, and the server reporting
//! project initialization complete (documents may move out of the
//! miscellaneous-files context once the project system has loaded).
//!
//! At most one request is logically in flight: issuing a refresh cancels
//! the previous one, and a generation counter guarantees that a superseded
//! request which completes anyway can neither emit nor touch the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{BridgeError, Result};
use crate::event::{ContextChanged, EventEmitter, ServerState, ServerStateChange};
use crate::lsp::{CancelSource, CancelToken, DocumentUri, ProjectContext, ProjectContextList};

/// The document the host currently has focused.
#[derive(Debug, Clone)]
pub struct ActiveDocument {
    pub uri: DocumentUri,
    pub language_id: String,
}

impl ActiveDocument {
    pub fn new(uri: DocumentUri, language_id: impl Into<String>) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
        }
    }
}

/// The server-facing seam: everything the tracker needs from the language
/// server. [`crate::lsp::RoslynClient`] is the production implementation.
#[async_trait]
pub trait ProjectContextProvider: Send + Sync {
    /// Which project contexts does a document belong to?
    async fn project_contexts(
        &self,
        uri: &DocumentUri,
        token: CancelToken,
    ) -> Result<ProjectContextList>;
}

#[derive(Default)]
struct TrackerState {
    /// Last resolved context per document. Never proactively evicted;
    /// entries for closed documents are unused but harmless.
    cache: HashMap<DocumentUri, ProjectContext>,
    active: Option<ActiveDocument>,
    /// Cancellation handle for the most recent refresh request.
    in_flight: Option<CancelSource>,
    /// Bumped on every issued refresh; a completed request only applies if
    /// its captured generation is still current.
    generation: u64,
}

/// Tracks the effective project context for documents of one language.
pub struct ProjectContextTracker {
    provider: Arc<dyn ProjectContextProvider>,
    language_id: String,
    state: Mutex<TrackerState>,
    events: EventEmitter<ContextChanged>,
}

impl ProjectContextTracker {
    pub fn new(provider: Arc<dyn ProjectContextProvider>, language_id: impl Into<String>) -> Self {
        Self {
            provider,
            language_id: language_id.into(),
            state: Mutex::new(TrackerState::default()),
            events: EventEmitter::new(),
        }
    }

    /// Subscribe to context change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextChanged> {
        self.events.subscribe()
    }

    /// Cached context for a document; `None` until a refresh or selection
    /// has resolved one.
    pub fn get_document_context(&self, uri: &DocumentUri) -> Option<ProjectContext> {
        self.state.lock().unwrap().cache.get(uri).cloned()
    }

    /// Explicitly select a context for a document, bypassing the server.
    ///
    /// No validation happens here; the caller asserts the context belongs
    /// to the document (the selection UI sources it from a prior
    /// [`project_contexts`](Self::project_contexts) fetch).
    pub fn set_document_context(
        &self,
        uri: &DocumentUri,
        context: ProjectContext,
        has_additional_contexts: bool,
    ) {
        self.state
            .lock()
            .unwrap()
            .cache
            .insert(uri.clone(), context.clone());
        self.events.emit(ContextChanged {
            uri: uri.clone(),
            context,
            has_additional_contexts,
        });
    }

    pub fn active_document(&self) -> Option<ActiveDocument> {
        self.state.lock().unwrap().active.clone()
    }

    /// Host trigger: the active document changed. Records it and refreshes.
    pub async fn document_activated(&self, document: Option<ActiveDocument>) -> Result<()> {
        self.state.lock().unwrap().active = document;
        self.refresh().await
    }

    /// Re-resolve the effective context for the active document.
    ///
    /// No-op when there is no active document or it is not ours. Cancels
    /// any outstanding request first. On success updates the cache and
    /// emits exactly one [`ContextChanged`]; a cancelled request emits
    /// nothing. Other failures propagate and leave the cache untouched.
    pub async fn refresh(&self) -> Result<()> {
        let (document, token, generation) = {
            let mut state = self.state.lock().unwrap();

            let Some(document) = state.active.clone() else {
                return Ok(());
            };
            if document.language_id != self.language_id {
                return Ok(());
            }

            // Supersede the open request, if any.
            if let Some(previous) = state.in_flight.take() {
                previous.cancel();
            }
            let source = CancelSource::new();
            let token = source.token();
            state.in_flight = Some(source);
            state.generation += 1;

            (document, token, state.generation)
        };

        let Some(list) = self.project_contexts(&document.uri, token).await? else {
            // Superseded; the newer refresh owns the outcome.
            return Ok(());
        };

        let (context, has_additional_contexts) = {
            let mut state = self.state.lock().unwrap();
            if state.generation != generation {
                // A newer refresh was issued while we awaited; discard.
                return Ok(());
            }

            let selected = state.cache.get(&document.uri).cloned();
            let context = match selected {
                Some(context) if list.contains(&context.id) => context,
                _ => list
                    .default_context()
                    .ok_or(BridgeError::InvalidDefaultIndex(list.default_index))?
                    .clone(),
            };

            state.cache.insert(document.uri.clone(), context.clone());
            (context, list.has_additional())
        };

        self.events.emit(ContextChanged {
            uri: document.uri,
            context,
            has_additional_contexts,
        });
        Ok(())
    }

    /// Raw request wrapper: the context list for a document, `None` if the
    /// request was cancelled, other failures propagated.
    pub async fn project_contexts(
        &self,
        uri: &DocumentUri,
        token: CancelToken,
    ) -> Result<Option<ProjectContextList>> {
        match self.provider.project_contexts(uri, token).await {
            Ok(list) => Ok(Some(list)),
            Err(e) if e.is_cancelled() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Spawn a task that refreshes whenever the server reports project
    /// initialization complete.
    pub fn spawn_server_listener(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<ServerStateChange>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.state == ServerState::ProjectInitializationComplete => {
                        if let Err(e) = self.refresh().await {
                            tracing::warn!("context refresh after project initialization failed: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!("server event listener lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// One scripted reply from the fake server, consumed per request.
    enum Scripted {
        /// Resolve immediately with the list.
        Ready(ProjectContextList),
        /// Resolve with the list only once released, ignoring the token
        /// (a request that completes instead of observing cancellation).
        Gated(ProjectContextList, Arc<Notify>),
        /// Pend until the token fires, then report cancellation.
        UntilCancelled,
        /// Fail immediately.
        Fail(BridgeError),
    }

    struct FakeProvider {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProjectContextProvider for FakeProvider {
        async fn project_contexts(
            &self,
            _uri: &DocumentUri,
            mut token: CancelToken,
        ) -> Result<ProjectContextList> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = {
                let mut script = self.script.lock().unwrap();
                script
                    .pop_front()
                    .expect("provider called more times than scripted")
            };
            match step {
                Scripted::Ready(list) => Ok(list),
                Scripted::Gated(list, release) => {
                    release.notified().await;
                    Ok(list)
                }
                Scripted::UntilCancelled => {
                    token.cancelled().await;
                    Err(BridgeError::Cancelled)
                }
                Scripted::Fail(err) => Err(err),
            }
        }
    }

    fn uri(s: &str) -> DocumentUri {
        DocumentUri::parse(s).unwrap()
    }

    fn csharp_doc(s: &str) -> ActiveDocument {
        ActiveDocument::new(uri(s), "csharp")
    }

    fn list(contexts: &[(&str, &str)], default_index: usize) -> ProjectContextList {
        ProjectContextList {
            contexts: contexts
                .iter()
                .map(|(id, label)| ProjectContext::new(*id, *label))
                .collect(),
            default_index,
        }
    }

    fn tracker(script: Vec<Scripted>) -> (Arc<ProjectContextTracker>, Arc<FakeProvider>) {
        let provider = FakeProvider::new(script);
        let tracker = Arc::new(ProjectContextTracker::new(provider.clone(), "csharp"));
        (tracker, provider)
    }

    fn drain(rx: &mut broadcast::Receiver<ContextChanged>) -> Vec<ContextChanged> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn wait_for_calls(provider: &FakeProvider, n: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while provider.calls() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("provider never received the expected request");
    }

    #[tokio::test]
    async fn test_refresh_noop_without_active_document() {
        let (tracker, provider) = tracker(vec![]);
        let mut rx = tracker.subscribe();

        tracker.refresh().await.unwrap();

        assert_eq!(provider.calls(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_noop_for_other_language() {
        let (tracker, provider) = tracker(vec![]);
        let mut rx = tracker.subscribe();

        let doc = ActiveDocument::new(uri("file:///lib.rs"), "rust");
        tracker.document_activated(Some(doc)).await.unwrap();

        assert_eq!(provider.calls(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    /// Scenario: no cache entry, server returns two contexts with default
    /// index 1 -> cache gets the default, event says additional contexts.
    #[tokio::test]
    async fn test_refresh_selects_server_default() {
        let doc = uri("file:///a.cs");
        let (tracker, provider) = tracker(vec![Scripted::Ready(list(
            &[("1", "net6.0"), ("2", "net8.0")],
            1,
        ))]);
        let mut rx = tracker.subscribe();

        tracker.document_activated(Some(csharp_doc("file:///a.cs"))).await.unwrap();

        assert_eq!(provider.calls(), 1);
        let cached = tracker.get_document_context(&doc).unwrap();
        assert_eq!(cached.id, "2");
        assert_eq!(cached.label, "net8.0");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uri, doc);
        assert_eq!(events[0].context.id, "2");
        assert!(events[0].has_additional_contexts);
    }

    /// An explicit selection overwrites the cache and fires the event
    /// without any server round-trip.
    #[tokio::test]
    async fn test_explicit_selection_bypasses_server() {
        let doc = uri("file:///a.cs");
        let (tracker, provider) = tracker(vec![]);
        let mut rx = tracker.subscribe();

        tracker.set_document_context(&doc, ProjectContext::new("1", "net6.0"), true);

        assert_eq!(provider.calls(), 0);
        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "1");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.id, "1");
        assert!(events[0].has_additional_contexts);
    }

    /// A cached selection that is still in the returned list survives
    /// a refresh even though the server default points elsewhere.
    #[tokio::test]
    async fn test_refresh_keeps_valid_selection() {
        let doc = uri("file:///a.cs");
        let (tracker, _provider) = tracker(vec![Scripted::Ready(list(
            &[("1", "net6.0"), ("2", "net8.0")],
            1,
        ))]);
        tracker.set_document_context(&doc, ProjectContext::new("1", "net6.0"), true);
        let mut rx = tracker.subscribe();

        tracker.document_activated(Some(csharp_doc("file:///a.cs"))).await.unwrap();

        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "1");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.id, "1");
    }

    /// A cached selection that disappeared from the list falls back to
    /// the server default and the cache is updated.
    #[tokio::test]
    async fn test_refresh_falls_back_when_selection_gone() {
        let doc = uri("file:///a.cs");
        let (tracker, _provider) = tracker(vec![Scripted::Ready(list(
            &[("D", "net8.0"), ("E", "net9.0")],
            0,
        ))]);
        tracker.set_document_context(&doc, ProjectContext::new("C", "net6.0"), true);
        let mut rx = tracker.subscribe();

        tracker.document_activated(Some(csharp_doc("file:///a.cs"))).await.unwrap();

        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "D");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.id, "D");
    }

    /// A cancelled request emits nothing and leaves the cache alone.
    #[tokio::test]
    async fn test_cancelled_refresh_is_silent() {
        let doc = uri("file:///a.cs");
        let (tracker, _provider) = tracker(vec![Scripted::Fail(BridgeError::Cancelled)]);
        tracker.set_document_context(&doc, ProjectContext::new("C", "net6.0"), false);
        let mut rx = tracker.subscribe();

        tracker.document_activated(Some(csharp_doc("file:///a.cs"))).await.unwrap();

        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "C");
        assert!(drain(&mut rx).is_empty());
    }

    /// A second refresh before the first resolves cancels it; exactly
    /// one event fires, carrying the second request's result.
    #[tokio::test]
    async fn test_supersede_cancels_older_request() {
        let doc = uri("file:///a.cs");
        let (tracker, provider) = tracker(vec![
            Scripted::UntilCancelled,
            Scripted::Ready(list(&[("B", "net8.0")], 0)),
        ]);
        {
            // Set the active document without triggering a refresh.
            tracker.state.lock().unwrap().active = Some(csharp_doc("file:///a.cs"));
        }
        let mut rx = tracker.subscribe();

        // First refresh hangs until its token is cancelled.
        let first = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.refresh().await })
        };
        wait_for_calls(&provider, 1).await;

        tracker.refresh().await.unwrap();
        first.await.unwrap().unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.id, "B");
        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "B");
    }

    /// A superseded request that completes instead of observing
    /// cancellation must neither emit nor overwrite the cache.
    #[tokio::test]
    async fn test_late_completion_of_superseded_request_is_discarded() {
        let doc = uri("file:///a.cs");
        let release = Arc::new(Notify::new());
        let (tracker, provider) = tracker(vec![
            Scripted::Gated(list(&[("A", "net6.0")], 0), release.clone()),
            Scripted::Ready(list(&[("B", "net8.0")], 0)),
        ]);
        {
            // Set the active document without triggering a refresh.
            tracker.state.lock().unwrap().active = Some(csharp_doc("file:///a.cs"));
        }
        let mut rx = tracker.subscribe();

        let first = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.refresh().await })
        };
        wait_for_calls(&provider, 1).await;

        // Newer refresh completes with B.
        tracker.refresh().await.unwrap();
        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "B");

        // Now let the stale request finish; its generation is outdated.
        release.notify_one();
        first.await.unwrap().unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.id, "B");
        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "B");
    }

    /// A non-cancellation failure propagates; the previously resolved
    /// context stays displayed (stale but consistent).
    #[tokio::test]
    async fn test_request_failure_propagates_and_leaves_cache() {
        let doc = uri("file:///a.cs");
        let (tracker, _provider) = tracker(vec![Scripted::Fail(BridgeError::Rpc {
            code: -32603,
            message: "server fell over".into(),
        })]);
        tracker.set_document_context(&doc, ProjectContext::new("C", "net6.0"), false);
        let mut rx = tracker.subscribe();

        let err = tracker
            .document_activated(Some(csharp_doc("file:///a.cs")))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rpc { .. }));

        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "C");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_default_index_is_an_error() {
        let doc = uri("file:///a.cs");
        let (tracker, _provider) =
            tracker(vec![Scripted::Ready(list(&[("A", "net6.0")], 7))]);
        let mut rx = tracker.subscribe();

        let err = tracker
            .document_activated(Some(csharp_doc("file:///a.cs")))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidDefaultIndex(7)));
        assert!(tracker.get_document_context(&doc).is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_project_contexts_wrapper_maps_cancellation_to_none() {
        let (tracker, _provider) = tracker(vec![
            Scripted::Fail(BridgeError::Cancelled),
            Scripted::Ready(list(&[("A", "net6.0")], 0)),
            Scripted::Fail(BridgeError::NotRunning),
        ]);
        let doc = uri("file:///a.cs");

        let result = tracker.project_contexts(&doc, CancelToken::none()).await;
        assert!(matches!(result, Ok(None)));

        let result = tracker.project_contexts(&doc, CancelToken::none()).await;
        assert_eq!(result.unwrap().unwrap().contexts.len(), 1);

        let result = tracker.project_contexts(&doc, CancelToken::none()).await;
        assert!(matches!(result, Err(BridgeError::NotRunning)));
    }

    /// Server trigger: project initialization completing re-resolves the
    /// active document (it may have left the miscellaneous context).
    #[tokio::test]
    async fn test_initialization_complete_triggers_refresh() {
        let doc = uri("file:///a.cs");
        let (tracker, provider) = tracker(vec![
            Scripted::Ready(list(&[("misc", "Miscellaneous Files")], 0)),
            Scripted::Ready(list(&[("1", "net6.0"), ("2", "net8.0")], 0)),
        ]);
        let mut rx = tracker.subscribe();

        tracker
            .document_activated(Some(csharp_doc("file:///a.cs")))
            .await
            .unwrap();
        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "misc");

        let server_events = EventEmitter::new();
        let handle = tracker.clone().spawn_server_listener(server_events.subscribe());

        // Unrelated lifecycle noise first; must not trigger a refresh.
        server_events.emit(ServerStateChange {
            state: ServerState::Started,
            workspace_label: "App".into(),
        });
        server_events.emit(ServerStateChange {
            state: ServerState::ProjectInitializationComplete,
            workspace_label: "App".into(),
        });

        wait_for_calls(&provider, 2).await;
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.context.id, "misc");
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.context.id, "1");
        assert_eq!(tracker.get_document_context(&doc).unwrap().id, "1");

        handle.abort();
    }
}
