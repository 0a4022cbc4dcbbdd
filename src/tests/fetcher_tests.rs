// @file: kline_engine/src/tests/fetcher_tests.rs
// @description: Page walk behaviour against a mock Binance REST server.
// @author: LAS.

#[cfg(test)]
mod fetcher_tests {
    use crate::connectors::binance_rest::{reconcile, FetcherSettings, PageFetcher};
    use crate::connectors::{build_http_client, Endpoints};
    use crate::core::models::{Candle, FetchReport, FetchWindow, MarketSegment, PartialReason};
    use crate::tests::fixtures::{fast_settings, kline_page, MINUTE, T0};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

    //
    // HELPERS
    //

    fn fetcher(server: &MockServer, settings: FetcherSettings) -> PageFetcher {
        fetcher_with_timeout(server, settings, Duration::from_secs(5))
    }

    fn fetcher_with_timeout(server: &MockServer, settings: FetcherSettings, timeout: Duration) -> PageFetcher {
        let client = build_http_client(timeout).unwrap();
        let endpoints: Endpoints = Endpoints::uniform(&server.uri()).unwrap();
        PageFetcher::new(client, endpoints, settings)
    }

    fn window(start_time: i64, end_time: i64) -> FetchWindow {
        FetchWindow {
            symbol: "BTCUSDT".to_string(),
            market: MarketSegment::Spot,
            frequency: "1m".parse().unwrap(),
            start_time,
            end_time,
        }
    }

    fn page_request(start: i64, end: i64) -> MockBuilder {
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("interval", "1m"))
            .and(query_param("startTime", start.to_string()))
            .and(query_param("endTime", end.to_string()))
    }

    fn open_times(candles: &[Candle]) -> Vec<i64> {
        candles.iter().map(|c| c.open_time).collect()
    }

    //
    // SINGLE PAGE
    //

    #[tokio::test]
    async fn test_five_rows_in_five_interval_window() {
        // #1. Setup
        let server: MockServer = MockServer::start().await;
        let rows: Vec<i64> = (0..5).map(|k| T0 + k * MINUTE).collect();

        page_request(T0 - MINUTE, T0 + 5 * MINUTE)
            .and(query_param("limit", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&rows)))
            .expect(1)
            .mount(&server)
            .await;

        // #2. Execute
        let report: FetchReport = fetcher(&server, fast_settings(1000))
            .fetch(&window(T0, T0 + 5 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        // #3. Verify
        assert!(report.is_complete());
        assert_eq!(open_times(&report.candles), rows);
        assert!(report.candles.iter().all(|c| c.open_time < T0 + 5 * MINUTE));
        assert!((report.candles[0].volume - 10.0).abs() < 1e-9);
        assert_eq!(report.candles[0].trade_count, 42.0);
    }

    #[tokio::test]
    async fn test_rows_outside_window_are_dropped() {
        let server: MockServer = MockServer::start().await;
        let rows: Vec<i64> = (-1..7).map(|k| T0 + k * MINUTE).collect();

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&rows)))
            .expect(1)
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(1000))
            .fetch(&window(T0, T0 + 5 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        let expected: Vec<i64> = (0..5).map(|k| T0 + k * MINUTE).collect();
        assert_eq!(open_times(&report.candles), expected);
    }

    #[tokio::test]
    async fn test_short_page_ends_the_walk() {
        let server: MockServer = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&[T0, T0 + MINUTE])))
            .expect(1)
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(3))
            .fetch(&window(T0, T0 + 100 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.candles.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_page_ends_the_walk() {
        let server: MockServer = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(3))
            .fetch(&window(T0, T0 + 100 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert!(report.candles.is_empty());
    }

    //
    // PAGINATION
    //

    #[tokio::test]
    async fn test_next_page_starts_one_interval_before_last_row() {
        // #1. Three pages of limit 3; each restarts at last_open - 1m
        let server: MockServer = MockServer::start().await;

        page_request(T0 - MINUTE, T0 + 2 * MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&[T0 - MINUTE, T0, T0 + MINUTE])))
            .expect(1)
            .mount(&server)
            .await;

        page_request(T0, T0 + 3 * MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&[T0, T0 + MINUTE, T0 + 2 * MINUTE])))
            .expect(1)
            .mount(&server)
            .await;

        page_request(T0 + MINUTE, T0 + 3 * MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&[T0 + MINUTE, T0 + 2 * MINUTE])))
            .expect(1)
            .mount(&server)
            .await;

        // #2. Execute
        let report: FetchReport = fetcher(&server, fast_settings(3))
            .fetch(&window(T0, T0 + 3 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        // #3. Overlapping rows collapse into a strictly ordered series
        assert!(report.is_complete());
        assert_eq!(open_times(&report.candles), vec![T0, T0 + MINUTE, T0 + 2 * MINUTE]);
        assert!(report.candles.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    //
    // FAILURE MODES
    //

    #[tokio::test]
    async fn test_rate_limit_retries_the_same_window() {
        let server: MockServer = MockServer::start().await;
        let rows: Vec<i64> = (0..5).map(|k| T0 + k * MINUTE).collect();

        page_request(T0 - MINUTE, T0 + 5 * MINUTE)
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;

        page_request(T0 - MINUTE, T0 + 5 * MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&rows)))
            .expect(1)
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(1000))
            .fetch(&window(T0, T0 + 5 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.candles.len(), 5);

        // Every attempt carried identical parameters
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.url.query() == requests[0].url.query()));
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_is_partial() {
        let server: MockServer = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(429))
            .expect(4) // first try + 3 cooldowns
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(1000))
            .fetch(&window(T0, T0 + 5 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.partial, Some(PartialReason::RateLimitExhausted));
        assert!(report.candles.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_returns_accumulated_rows_flagged() {
        let server: MockServer = MockServer::start().await;

        page_request(T0 - MINUTE, T0 + 2 * MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&[T0 - MINUTE, T0, T0 + MINUTE])))
            .expect(1)
            .mount(&server)
            .await;

        page_request(T0, T0 + 3 * MINUTE)
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .expect(1)
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(3))
            .fetch(&window(T0, T0 + 10 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.partial, Some(PartialReason::HttpStatus(500)));
        assert!(!report.is_complete());
        assert_eq!(open_times(&report.candles), vec![T0, T0 + MINUTE]);
    }

    #[tokio::test]
    async fn test_error_object_body_is_malformed() {
        let server: MockServer = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": -1121, "msg": "Invalid symbol."})))
            .expect(1)
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(1000))
            .fetch(&window(T0, T0 + 5 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.partial, Some(PartialReason::MalformedBody));
        assert!(report.candles.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_skips_the_window() {
        let server: MockServer = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(2)))
            .expect(1)
            .mount(&server)
            .await;

        // One window covers the whole range, so one skip ends the walk
        let report: FetchReport = fetcher_with_timeout(&server, fast_settings(3), Duration::from_millis(200))
            .fetch(&window(T0, T0 + 2 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.partial, Some(PartialReason::SkippedWindows(1)));
        assert_eq!(report.skipped_windows, 1);
        assert!(report.candles.is_empty());
    }

    #[tokio::test]
    async fn test_non_numeric_fields_become_nan() {
        let server: MockServer = MockServer::start().await;
        let body = json!([
            [T0, "abc", "101.0", "99.0", "100.5", "10.0", T0 + MINUTE - 1, "1005.0", 42, "4.0", "402.0", "0"]
        ]);

        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(1000))
            .fetch(&window(T0, T0 + 5 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.candles.len(), 1);
        assert!(report.candles[0].open.is_nan());
        assert_eq!(report.candles[0].high, 101.0);
    }

    #[tokio::test]
    async fn test_cancelled_walk_sends_nothing() {
        let server: MockServer = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let cancel: CancellationToken = CancellationToken::new();
        cancel.cancel();

        let report: FetchReport = fetcher(&server, fast_settings(1000))
            .fetch(&window(T0, T0 + 5 * MINUTE), &cancel)
            .await
            .unwrap();

        assert_eq!(report.partial, Some(PartialReason::Cancelled));
    }

    #[tokio::test]
    async fn test_skip_count_survives_a_later_abort() {
        // #1. First window times out, second answers 500
        let server: MockServer = MockServer::start().await;

        page_request(T0 - MINUTE, T0 + 2 * MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(2)))
            .expect(1)
            .mount(&server)
            .await;

        page_request(T0 + 2 * MINUTE, T0 + 5 * MINUTE)
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        // #2. Execute
        let report: FetchReport = fetcher_with_timeout(&server, fast_settings(3), Duration::from_millis(200))
            .fetch(&window(T0, T0 + 10 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        // #3. Both facts are reported
        assert_eq!(report.partial, Some(PartialReason::HttpStatus(500)));
        assert_eq!(report.skipped_windows, 1);
    }

    #[tokio::test]
    async fn test_full_page_without_timestamps_is_malformed() {
        let server: MockServer = MockServer::start().await;
        let body = json!([
            ["x", "100.0", "101.0", "99.0", "100.5", "10.0", "x", "1005.0", 42, "4.0", "402.0", "0"],
            ["x", "100.0", "101.0", "99.0", "100.5", "10.0", "x", "1005.0", 42, "4.0", "402.0", "0"]
        ]);

        page_request(T0 - MINUTE, T0 + MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        // Later data exists, but the walk cannot advance past the unreadable page
        page_request(T0 + 5 * MINUTE, T0 + 7 * MINUTE)
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&[T0 + 5 * MINUTE])))
            .expect(0)
            .mount(&server)
            .await;

        let report: FetchReport = fetcher(&server, fast_settings(2))
            .fetch(&window(T0, T0 + 10 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.partial, Some(PartialReason::MalformedBody));
        assert!(!report.is_complete());
        assert!(report.candles.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_iteration_cap_stops_the_walk() {
        let server: MockServer = MockServer::start().await;

        // Always a full page of 2
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(kline_page(&[T0 - MINUTE, T0])))
            .expect(2)
            .mount(&server)
            .await;

        let settings: FetcherSettings = FetcherSettings { max_iterations: 2, ..fast_settings(2) };
        let report: FetchReport = fetcher(&server, settings)
            .fetch(&window(T0, T0 + 100 * MINUTE), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.partial, Some(PartialReason::IterationLimit));
        assert_eq!(open_times(&report.candles), vec![T0]);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    //
    // RECONCILIATION
    //

    #[test]
    fn test_reconcile_keeps_latest_copy_per_open_time() {
        let make = |open_time: i64, close: f64| Candle {
            open_time,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close,
            volume: 1.0,
            close_time: open_time + MINUTE - 1,
            quote_asset_volume: 1.0,
            trade_count: 1.0,
            taker_buy_base_volume: 0.5,
            taker_buy_quote_volume: 0.5,
        };

        let rows: Vec<Candle> = vec![
            make(T0 + MINUTE, 1.0),
            make(T0, 1.0),
            make(T0 + MINUTE, 2.0), // re-fetched, newer
            make(T0 + 2 * MINUTE, 1.0),
        ];

        let series = reconcile(rows, T0, T0 + 2 * MINUTE);

        assert_eq!(open_times(&series), vec![T0, T0 + MINUTE]);
        assert_eq!(series[1].close, 2.0);
    }
}
