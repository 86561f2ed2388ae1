//! Live reload: file changes under the fixture root are pushed to open pages
//! over server-sent events

use crate::server::WebServerState;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::{self, Stream};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Server-sent events endpoint polled by the injected script
pub const EVENTS_PATH: &str = "/__livereload";

const SCRIPT: &str = r#"<script>new EventSource("/__livereload").addEventListener("reload", function () { location.reload(); });</script>"#;

/// Fan-out of change notifications to connected pages
#[derive(Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<()>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tell every connected page to reload
    pub fn notify(&self) {
        // No receivers just means no page is open.
        let _ = self.tx.send(());
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Watch `root` recursively and notify `hub` on content changes
///
/// The returned watcher must be kept alive for as long as events are wanted.
pub fn watch(root: &Path, hub: ReloadHub) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) if is_content_change(&event.kind) => {
                debug!("Change detected: {:?}", event.paths);
                hub.notify();
            }
            Ok(_) => {}
            Err(e) => warn!("File watcher error: {}", e),
        }
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Insert the reload script before `</body>`, or append it
pub fn inject_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], SCRIPT, &html[idx..]),
        None => format!("{}{}", html, SCRIPT),
    }
}

pub(crate) async fn events_handler(State(state): State<Arc<WebServerState>>) -> Response {
    let Some(hub) = state.reload.as_ref() else {
        return axum::http::StatusCode::NOT_FOUND.into_response();
    };
    Sse::new(reload_events(hub.subscribe(), state.shutdown.clone()))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// One `reload` event per change. Ends when the server shuts down.
fn reload_events(
    rx: broadcast::Receiver<()>,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((rx, shutdown), |(mut rx, shutdown)| async move {
        tokio::select! {
            _ = shutdown.cancelled() => None,
            received = rx.recv() => match received {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    let event = Event::default().event("reload").data("changed");
                    Some((Ok(event), (rx, shutdown)))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            },
        }
    })
}
