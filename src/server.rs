//! HTTP front end: the annotated image and a self-refreshing page around it.

use std::sync::Arc;

use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use towercam_core::{AppError, ArtifactError};
use towercam_refresh::RefreshError;

use crate::app::App;
use crate::error_mapping::{app_error, status_for};

pub fn routes(app: Arc<App>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_app = warp::any().map(move || app.clone());

    let image = warp::get()
        .and(warp::path("tower.png"))
        .and(warp::path::end())
        .and(with_app.clone())
        .then(tower_png);

    let index = warp::get()
        .and(warp::path::end())
        .and(with_app)
        .then(index_page);

    image.or(index).with(warp::trace::request())
}

async fn tower_png(app: Arc<App>) -> Response {
    let report = match app.refresh().await {
        Ok(report) => report,
        Err(e) => return failure(&app, e, app.fallback_poll_secs()),
    };

    match app.gate().resolve(&report) {
        Ok(composite) => png_response(composite.png),
        Err(e) => failure(&app, e, report.poll_hint_secs),
    }
}

async fn index_page(app: Arc<App>) -> Response {
    match app.refresh().await {
        Ok(report) => {
            // the image request that follows sees no merge, so rebuild here
            if let Err(e) = app.gate().resolve(&report) {
                if matches!(e, RefreshError::NoFrameYet) {
                    info!("No tower frame stored yet");
                } else {
                    warn!(error = %e, "Composite not rebuilt for page request");
                }
            }
            let page = render_page(
                &app.local_time(report.record.last_image_success),
                &app.local_time(report.record.last_weather_success),
                report.poll_hint_secs,
                report.now.timestamp(),
            );
            warp::reply::html(page).into_response()
        }
        Err(e) => {
            let err = app_error(e);
            error!(error = %err, "Refresh pass failed");
            let page = render_page(
                "unavailable",
                "unavailable",
                app.fallback_poll_secs(),
                chrono::Utc::now().timestamp(),
            );
            warp::reply::with_status(warp::reply::html(page), status_for(&err)).into_response()
        }
    }
}

/// Respond to a pass or gate failure, falling back to the last composite when allowed.
fn failure(app: &App, e: RefreshError, retry_secs: i64) -> Response {
    let degraded = e.allows_degraded();
    let err = app_error(e);

    if matches!(err, AppError::Artifact(ArtifactError::NoFrameYet)) {
        info!("No tower frame stored yet");
    } else {
        error!(error = %err, "Serving tower image failed");
    }

    if degraded {
        if let Some(png) = app.gate().last_built() {
            warn!("Serving last built composite");
            return warp::reply::with_header(
                png_response(png),
                "warning",
                "110 - \"Response is Stale\"",
            )
            .into_response();
        }
    }

    let status = status_for(&err);
    let reply = warp::reply::with_status(err.user_message(), status);
    if status == StatusCode::SERVICE_UNAVAILABLE {
        warp::reply::with_header(reply, "retry-after", retry_secs.to_string()).into_response()
    } else {
        reply.into_response()
    }
}

fn png_response(png: Vec<u8>) -> Response {
    let reply = warp::reply::with_header(png, "content-type", "image/png");
    let reply = warp::reply::with_header(reply, "cache-control", "no-cache, no-store, must-revalidate");
    let reply = warp::reply::with_header(reply, "pragma", "no-cache");
    warp::reply::with_header(reply, "expires", "0").into_response()
}

fn render_page(tower_updated: &str, weather_updated: &str, refresh_secs: i64, cache_bust: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>Towercam</title>
    <meta charset="utf-8" />
    <meta http-equiv="pragma" content="no-cache" />
    <meta http-equiv="cache-control" content="no-cache" />
    <meta http-equiv="expires" content="0" />
    <meta http-equiv="refresh" content="{refresh_secs}" />
    <style>
      #tower {{ display: block; width: 352px; height: 288px; }}
      #timestamp {{ font-family: monospace; font-size: small; }}
    </style>
  </head>
  <body>
    <img id="tower" src="tower.png?r={cache_bust}" alt="Tower webcam" />
    <div id="timestamp">Tower: {tower_updated} - Weather: {weather_updated}</div>
  </body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::{DurationRound, TimeDelta, Utc};
    use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;
    use towercam_core::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn observation_page() -> String {
        let stamp = Utc::now().duration_trunc(TimeDelta::minutes(1)).unwrap();
        format!(
            r#"<div id="obsTable"><table>
              <tr><td>{time}</td><td>Sunny</td><td>14.2&deg;C</td><td>E</td><td>NE</td><td>8</td></tr>
              <tr><td>Last updated: {time} on {date}</td></tr>
            </table></div>"#,
            time = stamp.format("%H%M"),
            date = stamp.format("%a %d %b %Y"),
        )
    }

    fn jpeg() -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_pixel(352, 288, Rgb([60, 90, 140]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg).unwrap();
        out
    }

    async fn mount(server: &MockServer, weather: ResponseTemplate, image: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/obs"))
            .respond_with(weather)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tower.jpg"))
            .respond_with(image)
            .mount(server)
            .await;
    }

    fn app(dir: &TempDir, server: &MockServer) -> Arc<App> {
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.weather.page_url = format!("{}/obs", server.uri());
        config.weather.timezone = "UTC".into();
        config.tower.image_url = format!("{}/tower.jpg", server.uri());
        config.fetch.timeout_secs = 5;
        Arc::new(App::from_config(&config).unwrap())
    }

    async fn fetched(server: &MockServer, route: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }

    #[tokio::test]
    async fn test_tower_png_builds_then_reuses() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_string(observation_page()),
            ResponseTemplate::new(200).set_body_bytes(jpeg()),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let first = warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["content-type"], "image/png");
        assert_eq!(
            first.headers()["cache-control"],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(image::guess_format(first.body()).unwrap(), ImageFormat::Png);

        let second = warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.body(), first.body());

        assert_eq!(fetched(&server, "/obs").await, 1);
        assert_eq!(fetched(&server, "/tower.jpg").await, 1);
    }

    #[tokio::test]
    async fn test_weather_outage_still_serves_image() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(500),
            ResponseTemplate::new(200).set_body_bytes(jpeg()),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let res = warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::OK);

        // the failed weather attempt is throttled on the next request
        warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(fetched(&server, "/obs").await, 1);
    }

    #[tokio::test]
    async fn test_no_frame_yet_is_503_with_retry_after() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_string(observation_page()),
            ResponseTemplate::new(503),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let res = warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let retry: i64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
        assert!(retry >= 60);
    }

    #[tokio::test]
    async fn test_deleted_composite_is_500() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_string(observation_page()),
            ResponseTemplate::new(200).set_body_bytes(jpeg()),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let res = warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::OK);

        std::fs::remove_file(dir.path().join("tower.png")).unwrap();
        let res = warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_index_page_links_image_and_sets_refresh() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_string(observation_page()),
            ResponseTemplate::new(200).set_body_bytes(jpeg()),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let res = warp::test::request().path("/").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(body.contains(r#"<meta http-equiv="refresh" content=""#));
        assert!(body.contains("tower.png?r="));
        assert!(!body.contains("Tower: never"));
    }

    #[tokio::test]
    async fn test_index_then_image_on_fresh_install() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_string(observation_page()),
            ResponseTemplate::new(200).set_body_bytes(jpeg()),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let page = warp::test::request().path("/").reply(&filter).await;
        assert_eq!(page.status(), StatusCode::OK);
        assert!(dir.path().join("tower.png").exists());

        let res = warp::test::request().path("/tower.png").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(image::guess_format(res.body()).unwrap(), ImageFormat::Png);
        assert_eq!(fetched(&server, "/tower.jpg").await, 1);
    }

    #[tokio::test]
    async fn test_index_page_before_first_frame() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_body_string(observation_page()),
            ResponseTemplate::new(404),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let res = warp::test::request().path("/").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(body.contains("Tower: never"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let filter = routes(app(&dir, &server));

        let res = warp::test::request().path("/nope").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_render_page_fields() {
        let page = render_page("14:01 Mon 20 May 2024", "14:00 Mon 20 May 2024", 180, 42);
        assert!(page.contains(r#"content="180""#));
        assert!(page.contains("tower.png?r=42"));
        assert!(page.contains("Tower: 14:01 Mon 20 May 2024"));
    }
}
