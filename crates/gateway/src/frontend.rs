//! Embedded web client.
//!
//! The voice client in `frontend/` (push-to-talk recording, typed input,
//! reply playback) is compiled into the binary with `include_str!`, so the
//! gateway ships as a single executable.

use axum::{
    Router,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};

const INDEX_HTML: &str = include_str!("../../../frontend/index.html");
const STYLE_CSS: &str = include_str!("../../../frontend/style.css");
const APP_JS: &str = include_str!("../../../frontend/app.js");

/// `/`, `/static/style.css` and `/static/app.js`.
pub fn frontend_router() -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route(
            "/static/style.css",
            get(|| async { asset("text/css; charset=utf-8", STYLE_CSS) }),
        )
        .route(
            "/static/app.js",
            get(|| async { asset("application/javascript; charset=utf-8", APP_JS) }),
        )
}

fn asset(content_type: &'static str, body: &'static str) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
}
