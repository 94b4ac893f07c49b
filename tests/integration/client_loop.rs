//! End-to-end runs of the client loop.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use lottery_client::client::{Client, ClientConfig};
use lottery_client::net::TcpConnector;
use lottery_client::protocol;
use lottery_client::source::{data_file_path, CsvBetSource, InMemorySource};
use lottery_client::types::{BetRecord, ClientError, RunOutcome};

use crate::mock_server::MockServer;

fn config(batch_size: usize, period_ms: u64) -> ClientConfig {
    ClientConfig {
        id: 1,
        loop_period: Duration::from_millis(period_ms),
        loop_lapse: None,
        batch_size,
        await_submission_ack: true,
    }
}

fn bets(n: u64) -> Vec<BetRecord> {
    (1..=n)
        .map(|i| {
            BetRecord::new(
                1,
                7000 + i as u32,
                "Holder",
                "Surname",
                30_000_000 + i,
                "1990-05-17",
            )
        })
        .collect()
}

fn client(
    server: &MockServer,
    cfg: ClientConfig,
    cancel: CancellationToken,
) -> Client<TcpConnector> {
    Client::new(cfg, TcpConnector::new(server.address()), cancel)
}

#[tokio::test]
async fn test_batches_follow_source_order() {
    let all = bets(7);
    let server = MockServer::start(&["WAIT", "OK:ID:30000002,30000006,5"], true).await;
    let mut client = client(&server, config(3, 10), CancellationToken::new());

    let report = client.run(&mut InMemorySource::from(all.clone())).await.unwrap();

    assert_eq!(report.batches_sent, 3);
    assert_eq!(report.bets_sent, 7);
    assert_eq!(report.poll_attempts, 2);
    assert_eq!(report.outcome, RunOutcome::Winners(2));

    let received = server.received();
    assert_eq!(received.len(), 5);
    assert_eq!(received[0], protocol::encode_batch(1, &all[0..3]));
    assert_eq!(received[1], protocol::encode_batch(1, &all[3..6]));
    assert_eq!(received[2], protocol::encode_batch(1, &all[6..7]));
    assert_eq!(received[3], protocol::awaiting_results(1));
    assert_eq!(received[4], protocol::awaiting_results(1));
    assert_eq!(server.connections(), 5);
}

#[tokio::test]
async fn test_wait_issues_one_more_request_after_period() {
    let server = MockServer::start(&["WAIT", "OK:ID:"], true).await;
    let mut client = client(&server, config(10, 100), CancellationToken::new());

    let started = Instant::now();
    let report = client.run(&mut InMemorySource::default()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(report.batches_sent, 0);
    assert_eq!(report.poll_attempts, 2);
    assert_eq!(server.polls(), 2);
    assert_eq!(report.outcome, RunOutcome::Winners(0));
}

#[tokio::test]
async fn test_error_terminates_polling() {
    let server = MockServer::start(&["ERROR:bad request", "OK:ID:1"], true).await;
    let mut client = client(&server, config(10, 10), CancellationToken::new());

    let err = client
        .run(&mut InMemorySource::from(bets(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::ServerError(ref msg) if msg == "ERROR:bad request"));
    assert_eq!(server.polls(), 1);
}

#[tokio::test]
async fn test_fire_and_forget_submission() {
    let all = bets(4);
    let server = MockServer::start(&["OK:ID:30000004"], false).await;
    let mut cfg = config(2, 10);
    cfg.await_submission_ack = false;
    let mut client = client(&server, cfg, CancellationToken::new());

    let report = client.run(&mut InMemorySource::from(all)).await.unwrap();
    assert_eq!(report.batches_sent, 2);
    assert_eq!(report.outcome, RunOutcome::Winners(1));
}

#[tokio::test]
async fn test_cancel_before_start_sends_nothing() {
    let server = MockServer::start(&["OK:ID:"], true).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut client = client(&server, config(2, 10), cancel);

    let report = client.run(&mut InMemorySource::from(bets(5))).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.batches_sent, 0);
    assert_eq!(server.connections(), 0);
    assert!(server.received().is_empty());
}

#[tokio::test]
async fn test_cancel_while_awaiting_ack() {
    let server = MockServer::silent().await;
    let cancel = CancellationToken::new();
    let mut client = client(&server, config(3, 10), cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        client.run(&mut InMemorySource::from(bets(6))),
    )
    .await
    .expect("client did not stop after cancellation")
    .unwrap();

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.batches_sent, 0);
    assert_eq!(server.connections(), 1);
    assert_eq!(server.received().len(), 1);
}

#[tokio::test]
async fn test_poll_deadline_bounds_polling() {
    let server = MockServer::start(&[], true).await;
    let mut cfg = config(10, 20);
    cfg.loop_lapse = Some(Duration::from_millis(50));
    let mut client = client(&server, cfg, CancellationToken::new());

    let err = client.run(&mut InMemorySource::default()).await.unwrap_err();

    match err {
        ClientError::PollDeadlineExceeded { attempts } => {
            assert!(attempts >= 2);
            assert_eq!(attempts, server.polls());
        }
        other => panic!("expected deadline error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut client = Client::new(
        config(2, 10),
        TcpConnector::new(address),
        CancellationToken::new(),
    );
    let err = client
        .run(&mut InMemorySource::from(bets(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connection { .. }));
}

#[tokio::test]
async fn test_csv_file_end_to_end() {
    let mut dir = std::env::temp_dir();
    dir.push(format!("lottery_client_it_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = data_file_path(&dir, "agency-", 2);
    std::fs::write(
        &path,
        "Santiago Lionel,Lorca,30904465,1999-03-17,7574\n\
         Ana,Gomez,22333444,1985-11-02,2201\n\
         Juan,Perez,40111222,2001-01-30,15\n",
    )
    .unwrap();

    let server = MockServer::start(&["OK:ID:22333444,99999999"], true).await;
    let mut cfg = config(2, 10);
    cfg.id = 2;
    let mut client = client(&server, cfg, CancellationToken::new());
    let mut source = CsvBetSource::open(&path, 2).unwrap();

    let report = client.run(&mut source).await.unwrap();

    assert_eq!(report.batches_sent, 2);
    assert_eq!(report.outcome, RunOutcome::Winners(1));
    let received = server.received();
    assert!(received[0].starts_with(
        "[CLIENT 2] Bets -> [AgencyID:2,ID:7574,Name:Santiago Lionel,Surname:Lorca,PersonalID:30904465,BirthDate:1999-03-17]"
    ));

    std::fs::remove_dir_all(&dir).unwrap();
}
