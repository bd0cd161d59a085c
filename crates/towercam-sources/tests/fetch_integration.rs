//! Integration tests for the upstream fetchers using wiremock.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use towercam_sources::{
    FetchError, ImageFetcher, MetOfficeFetcher, ParseErrorKind, TowerCamFetcher, WeatherFetcher,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OBSERVATION_PAGE: &str = r#"<html><body>
<div id="obsTable">
  <table>
    <tr><th>Time</th><th>Weather</th><th>Temp</th><th>Vis</th><th>Dir</th><th>Speed</th></tr>
    <tr><td>0900</td><td>Cloudy</td><td>8.1&deg;C</td><td>G</td><td>W</td><td>11</td></tr>
    <tr><td>1000</td><td>Cloudy</td><td>8.6&deg;C</td><td>G</td><td>W</td><td>13</td></tr>
    <tr><td colspan="6">Last updated: 1000 on Wed 10 Jan 2024</td></tr>
  </table>
</div>
</body></html>"#;

fn weather_fetcher(server: &MockServer, timeout: Duration) -> MetOfficeFetcher {
    let url = format!("{}/observations/portsmouth", server.uri());
    MetOfficeFetcher::new(&url, chrono_tz::Europe::London, timeout).unwrap()
}

fn image_fetcher(server: &MockServer, timeout: Duration) -> TowerCamFetcher {
    let url = format!("{}/tower.jpg", server.uri());
    TowerCamFetcher::new(&url, timeout).unwrap()
}

#[tokio::test]
async fn test_fetch_weather_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/observations/portsmouth"))
        .respond_with(ResponseTemplate::new(200).set_body_string(OBSERVATION_PAGE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = weather_fetcher(&mock_server, Duration::from_secs(5));
    let reading = fetcher.fetch_weather().await.unwrap();

    assert_eq!(reading.temperature, 8.6);
    assert_eq!(reading.wind_speed, 13);
    assert_eq!(
        reading.observed_at,
        Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_fetch_weather_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/observations/portsmouth"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let fetcher = weather_fetcher(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch_weather().await.unwrap_err();

    assert!(matches!(err, FetchError::Status(500)));
}

#[tokio::test]
async fn test_fetch_weather_malformed_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/observations/portsmouth"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><p>maintenance</p></html>"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = weather_fetcher(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch_weather().await.unwrap_err();

    match err {
        FetchError::Parse(e) => assert_eq!(e.kind, ParseErrorKind::TableNotFound),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_weather_empty_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/observations/portsmouth"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let fetcher = weather_fetcher(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch_weather().await.unwrap_err();

    assert!(matches!(err, FetchError::EmptyBody));
}

#[tokio::test]
async fn test_fetch_weather_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/observations/portsmouth"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(OBSERVATION_PAGE)
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = weather_fetcher(&mock_server, Duration::from_millis(200));
    let err = fetcher.fetch_weather().await.unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[tokio::test]
async fn test_fetch_image_success() {
    let mock_server = MockServer::start().await;
    let jpeg = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46];

    Mock::given(method("GET"))
        .and(path("/tower.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(jpeg.clone()),
        )
        .mount(&mock_server)
        .await;

    let before = Utc::now();
    let fetcher = image_fetcher(&mock_server, Duration::from_secs(5));
    let frame = fetcher.fetch_image().await.unwrap();

    assert_eq!(frame.bytes, jpeg);
    assert!(frame.observed_at >= before);
    assert_eq!(frame.checksum().len(), 32);
}

#[tokio::test]
async fn test_fetch_image_identical_bytes_share_checksum() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tower.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"same frame".to_vec()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let fetcher = image_fetcher(&mock_server, Duration::from_secs(5));
    let first = fetcher.fetch_image().await.unwrap();
    let second = fetcher.fetch_image().await.unwrap();

    assert_eq!(first.checksum(), second.checksum());
}

#[tokio::test]
async fn test_fetch_image_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tower.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let fetcher = image_fetcher(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch_image().await.unwrap_err();

    assert!(matches!(err, FetchError::Status(404)));
}

#[tokio::test]
async fn test_fetch_image_empty_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tower.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let fetcher = image_fetcher(&mock_server, Duration::from_secs(5));
    let err = fetcher.fetch_image().await.unwrap_err();

    assert!(matches!(err, FetchError::EmptyBody));
}

#[tokio::test]
async fn test_fetch_image_unreachable_host() {
    // Bind then drop a server so the port is closed.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let fetcher = TowerCamFetcher::new(&format!("{uri}/tower.jpg"), Duration::from_secs(2)).unwrap();
    let err = fetcher.fetch_image().await.unwrap_err();

    assert!(matches!(err, FetchError::Network(_) | FetchError::Timeout));
}
