//! Dashboard files for browsers that open the hub directly.

use anyhow::{bail, Result};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::path::PathBuf;
use tower_http::services::{ServeDir, ServeFile};

const PLACEHOLDER_PAGE: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Sensor Hub</title>
  </head>
  <body style="font-family: system-ui; padding: 24px">
    <h1>Sensor Hub</h1>
    <p>No dashboard is installed. Start the hub with <code>--static-root &lt;dir&gt;</code> to serve one.</p>
    <p>Devices on the local network can only reach the hub when it listens on
      all interfaces: <code>--host 0.0.0.0</code>.</p>
    <ul>
      <li><code>POST /api/data</code> stores a reading</li>
      <li><code>GET /api/data</code>, <code>GET /api/history</code> read stored readings</li>
      <li><code>GET /ws</code>, <code>GET /api/events</code> stream new readings</li>
    </ul>
  </body>
</html>
"#;

async fn placeholder() -> Html<&'static str> {
    Html(PLACEHOLDER_PAGE)
}

/// Serves `static_root`, answering unknown paths with its `index.html` so
/// client-side routes resolve. Without a root every path gets the placeholder.
pub fn service(static_root: Option<PathBuf>) -> Result<Router> {
    let Some(root) = static_root else {
        return Ok(Router::new().fallback(get(placeholder)));
    };
    if !root.is_dir() {
        bail!("static root {} is not a directory", root.display());
    }
    let index = ServeFile::new(root.join("index.html"));
    Ok(Router::new().fallback_service(ServeDir::new(root).fallback(index)))
}
