//! Smoke tests against the venue's demo environment
//!
//! Run with `RUN_LIVE_TESTS=true` and `XTB_USER_ID` / `XTB_PASSWORD` set
//! (a `.env` file works too).
#![cfg(feature = "env-file")]

mod common;

use common::{init_tracing, print_test_result, print_warning, should_run_live_tests};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use xapi_client::{ApiClient, ClientConfig, StreamClient};

fn live_config() -> Option<ClientConfig> {
    if !should_run_live_tests() {
        println!("Skipping live test (set RUN_LIVE_TESTS=true)");
        return None;
    }
    match ClientConfig::from_env_file("XTB") {
        Ok(config) => Some(config.demo(true)),
        Err(e) => {
            print_warning("live_config", &format!("missing credentials: {}", e));
            None
        }
    }
}

#[tokio::test]
async fn test_demo_login_and_market_data() -> anyhow::Result<()> {
    let Some(config) = live_config() else {
        return Ok(());
    };
    init_tracing();

    let api = ApiClient::new(config.api_options().with_call_timeout(Duration::from_secs(5)));
    api.connect().await?;
    let session = api.login(&config).await?;
    assert!(!session.is_empty());

    let version = api.get_version().await?;
    print_test_result("get_version", true, &version);

    let symbol = api.get_symbol("EURUSD").await?;
    assert_eq!(symbol.symbol, "EURUSD");
    assert!(symbol.ask >= symbol.bid);

    let margin = api.get_margin_level().await?;
    print_test_result("get_margin_level", true, &format!("{} {}", margin.balance, margin.currency));

    api.logout().await?;
    api.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_demo_stream_keep_alive() -> anyhow::Result<()> {
    let Some(config) = live_config() else {
        return Ok(());
    };
    init_tracing();

    let api = ApiClient::new(config.api_options().with_call_timeout(Duration::from_secs(5)));
    api.connect().await?;
    let session = api.login(&config).await?;

    let stream = StreamClient::new(config.stream_options());
    stream.connect().await?;
    stream.set_session_id(session).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    stream
        .subscribe_keep_alive(move |record| {
            let _ = tx.send(record);
        })
        .await?;

    let token = CancellationToken::new();
    let listening = stream.listen(&token);
    let received = async {
        let record = timeout(Duration::from_secs(15), rx.recv()).await;
        token.cancel();
        record
    };
    let (listen_result, record) = tokio::join!(listening, received);
    listen_result?;

    match record {
        Ok(Some(record)) => print_test_result("keep_alive", true, &record.timestamp.to_string()),
        _ => print_warning("keep_alive", "no keep-alive within 15s"),
    }

    stream.disconnect().await?;
    api.logout().await?;
    Ok(())
}
