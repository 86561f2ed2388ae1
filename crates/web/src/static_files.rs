//! Static file serving from the configured root directory

use crate::livereload;
use crate::server::WebServerState;
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) async fn static_handler(
    State(state): State<Arc<WebServerState>>,
    uri: Uri,
) -> Response {
    let Ok(decoded) = urlencoding::decode(uri.path()) else {
        return (StatusCode::BAD_REQUEST, "Bad path encoding").into_response();
    };
    serve_path(&state, decoded.trim_start_matches('/')).await
}

async fn serve_path(state: &WebServerState, rel: &str) -> Response {
    let root = &state.config.root;

    // Canonicalize both sides so `..` and symlinks cannot escape the root.
    let Ok(canon_root) = root.canonicalize() else {
        warn!("Fixture root {} is not accessible", root.display());
        return (StatusCode::INTERNAL_SERVER_ERROR, "Bad fixture root").into_response();
    };
    let Ok(canon_req) = root.join(rel).canonicalize() else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    if !canon_req.starts_with(&canon_root) {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    if canon_req.is_dir() {
        let index = canon_req.join("index.html");
        if index.is_file() {
            return serve_file(state, &index).await;
        }
        if state.config.directory_listing {
            return directory_listing(state, &canon_req, rel).await;
        }
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    serve_file(state, &canon_req).await
}

async fn serve_file(state: &WebServerState, path: &Path) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Failed to read {}: {}", path.display(), e);
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        }
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.essence_str() == "text/html" {
        let html = String::from_utf8_lossy(&bytes);
        return html_response(state, &html);
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.essence_str().to_string())],
        bytes,
    )
        .into_response()
}

/// HTML response, with the reload script injected when live reload is on
pub(crate) fn html_response(state: &WebServerState, html: &str) -> Response {
    if state.reload.is_some() {
        Html(livereload::inject_script(html)).into_response()
    } else {
        Html(html.to_string()).into_response()
    }
}

async fn directory_listing(state: &WebServerState, dir: &Path, rel: &str) -> Response {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) => {
            warn!("Failed to list {}: {}", dir.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Cannot list directory").into_response();
        }
    };

    let mut entries: Vec<(String, bool)> = Vec::new();
    while let Ok(Some(entry)) = reader.next_entry().await {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    // Directories first, then by name.
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    html_response(state, &render_listing(rel, &entries))
}

fn render_listing(rel: &str, entries: &[(String, bool)]) -> String {
    let base = if rel.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", rel.trim_end_matches('/'))
    };
    let title = escape_html(&base);

    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Index of {title}</title></head>\n<body>\n<h1>Index of {title}</h1>\n<ul>\n"
    );
    if base != "/" {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for (name, is_dir) in entries {
        let suffix = if *is_dir { "/" } else { "" };
        let href = format!("{}{}{}", base, urlencoding::encode(name), suffix);
        html.push_str(&format!(
            "<li><a href=\"{}\">{}{}</a></li>\n",
            escape_html(&href),
            escape_html(name),
            suffix
        ));
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::WebServer;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use visreg_common::WebserverConfig;

    fn fixture_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist/img")).unwrap();
        std::fs::write(dir.path().join("dist/vis.css"), "body { margin: 0 }").unwrap();
        std::fs::write(
            dir.path().join("dist/page.html"),
            "<html><body>page</body></html>",
        )
        .unwrap();
        std::fs::write(dir.path().join("dist/img/a b.png"), [0x89, b'P', b'N', b'G']).unwrap();
        dir
    }

    async fn get(config: WebserverConfig, path: &str) -> (StatusCode, String, String) {
        let response = WebServer::new(config)
            .router()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    fn config_for(dir: &tempfile::TempDir) -> WebserverConfig {
        WebserverConfig {
            root: dir.path().to_path_buf(),
            dynamic_dir: dir.path().join("dynamic"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_serves_file_with_guessed_type() {
        let dir = fixture_root();
        let (status, content_type, body) = get(config_for(&dir), "/dist/vis.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/css");
        assert_eq!(body, "body { margin: 0 }");
    }

    #[tokio::test]
    async fn test_percent_encoded_path() {
        let dir = fixture_root();
        let (status, content_type, _) = get(config_for(&dir), "/dist/img/a%20b.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = fixture_root();
        let (status, _, _) = get(config_for(&dir), "/dist/nope.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let outer = tempfile::tempdir().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "secret").unwrap();
        std::fs::create_dir_all(outer.path().join("root")).unwrap();
        let config = WebserverConfig {
            root: outer.path().join("root"),
            ..Default::default()
        };

        let (status, _, body) = get(config, "/%2E%2E/secret.txt").await;
        assert_ne!(status, StatusCode::OK);
        assert!(!body.contains("secret"));
    }

    #[tokio::test]
    async fn test_directory_listing_toggle() {
        let dir = fixture_root();
        let (status, _, _) = get(config_for(&dir), "/dist/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let config = WebserverConfig {
            directory_listing: true,
            ..config_for(&dir)
        };
        let (status, content_type, body) = get(config, "/dist/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/html"));
        assert!(body.contains("Index of /dist/"));
        assert!(body.contains("href=\"/dist/img/\""));
        assert!(body.contains("href=\"/dist/vis.css\""));
        // directories are listed before files
        assert!(body.find("img/").unwrap() < body.find("vis.css").unwrap());
    }

    #[tokio::test]
    async fn test_directory_index_html_wins_over_listing() {
        let dir = fixture_root();
        std::fs::write(dir.path().join("dist/index.html"), "<p>index</p>").unwrap();
        let config = WebserverConfig {
            directory_listing: true,
            ..config_for(&dir)
        };
        let (status, _, body) = get(config, "/dist/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>index</p>");
    }

    #[tokio::test]
    async fn test_livereload_script_injected_into_html_only() {
        let dir = fixture_root();
        let config = WebserverConfig {
            livereload: true,
            ..config_for(&dir)
        };
        let (_, _, html) = get(config.clone(), "/dist/page.html").await;
        assert!(html.contains(livereload::EVENTS_PATH));
        assert!(html.find("EventSource").unwrap() < html.find("</body>").unwrap());

        let (_, _, css) = get(config, "/dist/vis.css").await;
        assert!(!css.contains("EventSource"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
