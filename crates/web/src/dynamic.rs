//! Dynamically rendered test pages
//!
//! Requests under the configured prefix are answered from a per-test
//! settings file (`<dynamic_dir>/<name>.test`, YAML or JSON) rendered through
//! the page template. Everything else falls through to the next handler.

use crate::server::WebServerState;
use crate::static_files::html_response;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{debug, warn};
use visreg_common::WebserverConfig;

/// Failure to produce a dynamic page, isolated to the request it came from
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Invalid test name: {0:?}")]
    InvalidName(String),

    #[error("No test settings at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid test settings in {}: {source}", .path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Test settings in {} must be a mapping", .0.display())]
    NotMapping(PathBuf),

    #[error("error rendering \"{template}\" ({detail})")]
    Render { template: String, detail: String },
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = match &self {
            PageError::InvalidName(_) => StatusCode::BAD_REQUEST,
            PageError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

pub(crate) async fn dynamic_page_middleware(
    State(state): State<Arc<WebServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(name) = request
        .uri()
        .path()
        .strip_prefix(state.config.dynamic_prefix.as_str())
        .map(str::to_owned)
    else {
        return next.run(request).await;
    };

    debug!("Rendering dynamic test page {:?}", name);
    match render_test_page(&state.config, &name).await {
        Ok(html) => html_response(&state, &html),
        Err(e) => {
            warn!("Dynamic page {:?} failed: {}", name, e);
            e.into_response()
        }
    }
}

/// Load the settings for `name` and render them through the page template
pub async fn render_test_page(config: &WebserverConfig, name: &str) -> Result<String, PageError> {
    let name = urlencoding::decode(name)
        .map_err(|_| PageError::InvalidName(name.to_string()))?
        .into_owned();
    validate_name(&name)?;

    let mut settings = load_settings(&config.test_config_path(&name)).await?;
    settings.insert("name".to_string(), serde_json::Value::String(name));

    let template_path = config.template_path();
    let template_label = template_path.display().to_string();
    let render_err = |detail: String| PageError::Render {
        template: template_label.clone(),
        detail,
    };

    let source = tokio::fs::read_to_string(&template_path)
        .await
        .map_err(|e| render_err(e.to_string()))?;
    let context = Context::from_serialize(&settings).map_err(|e| render_err(error_chain(&e)))?;
    Tera::one_off(&source, &context, false).map_err(|e| render_err(error_chain(&e)))
}

fn validate_name(name: &str) -> Result<(), PageError> {
    let path = Path::new(name);
    let plain = !name.is_empty()
        && !name.contains('\\')
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(PageError::InvalidName(name.to_string()))
    }
}

async fn load_settings(
    path: &Path,
) -> Result<serde_json::Map<String, serde_json::Value>, PageError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PageError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(PageError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let value: serde_json::Value =
        serde_yaml::from_str(&text).map_err(|source| PageError::Settings {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        _ => Err(PageError::NotMapping(path.to_path_buf())),
    }
}

/// Tera keeps the useful part of a render failure in the source chain
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
