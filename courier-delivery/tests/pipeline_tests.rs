//! End-to-end tests of the delivery pipeline against a mock relay.

mod support;

use std::{sync::Arc, time::Duration};

use courier_common::{ClientTimeouts, RelayConfig, Secret, TlsConfig};
use courier_delivery::{
    DeliveryOrchestrator, DeliveryRecorder, DeliveryRequest, FailureKind, FileRecorder,
    MemoryRecorder, PatientAttributes, Prediction, RetryPolicy,
};
use pretty_assertions::assert_eq;
use support::{MockRelay, SmtpCommand, mock_server::END_OF_DATA};

fn timeouts() -> ClientTimeouts {
    ClientTimeouts {
        connect_ms: 2_000,
        command_ms: 2_000,
        send_ms: 5_000,
        total_ms: 10_000,
        quit_ms: 500,
    }
}

fn relay_config(port: u16) -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".to_string(),
        port,
        sender: Some("reports@example.com".to_string()),
        secret: Some(Secret::new("app-password")),
        timeouts: timeouts(),
        ..RelayConfig::default()
    }
}

fn attributes() -> PatientAttributes {
    PatientAttributes {
        age: Some(30.into()),
        bmi: Some(25.5.into()),
        gender: Some("Male".into()),
        smoker: Some("No".into()),
        region: Some("North".into()),
        premium: Some(20000.into()),
    }
}

fn request(recipient: &str) -> DeliveryRequest {
    DeliveryRequest::new(
        recipient,
        Prediction {
            amount: 19777.48,
            confidence: 0.85,
        },
        attributes(),
    )
}

fn orchestrator(config: RelayConfig) -> (DeliveryOrchestrator, MemoryRecorder) {
    let recorder = MemoryRecorder::new();
    let orchestrator = DeliveryOrchestrator::new(config, Arc::new(recorder.clone()));
    (orchestrator, recorder)
}

/// A port nothing listens on.
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_report_is_delivered() {
    let relay = MockRelay::builder().build().await.unwrap();
    let (orchestrator, recorder) = orchestrator(relay_config(relay.addr().port()));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.message.contains("user@example.com"));
    assert!(outcome.processing_time_ms > 0.0);
    assert_eq!(outcome.failure_kind, None);
    assert!(outcome.remediation.is_empty());

    // Probe and transmission each use their own connection.
    assert_eq!(relay.connections(), 2);

    let records = recorder.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].recipient, "user@example.com");

    let commands = relay.commands().await;
    assert!(commands.contains(&SmtpCommand::Auth("PLAIN".to_string())));
    assert!(commands.contains(&SmtpCommand::MailFrom("FROM:<reports@example.com>".to_string())));
    assert!(commands.contains(&SmtpCommand::RcptTo("TO:<user@example.com>".to_string())));

    let content = commands
        .iter()
        .find_map(|command| match command {
            SmtpCommand::MessageContent(content) => Some(String::from_utf8_lossy(content).into_owned()),
            _ => None,
        })
        .unwrap();
    assert!(content.contains("From: MediCare+ Platform <reports@example.com>\r\n"));
    assert!(content.contains("To: user@example.com\r\n"));
    assert!(content.contains("Reply-To: reports@example.com\r\n"));
    assert!(content.contains("Subject: =?UTF-8?B?"));
    assert!(content.contains("@example.com>\r\n"));
    assert!(content.contains("Content-Type: multipart/alternative"));
    assert!(content.contains("Content-Type: text/plain; charset=utf-8"));
    assert!(content.contains("Content-Type: text/html; charset=utf-8"));
}

#[tokio::test]
async fn test_malformed_addresses_never_touch_the_network() {
    let relay = MockRelay::builder().build().await.unwrap();
    let (orchestrator, recorder) = orchestrator(relay_config(relay.addr().port()));

    for recipient in [
        "",
        "not-an-email",
        "user@@example.com",
        "a@b@example.com",
        "@example.com",
        "user@",
        "user@example",
        "user..name@example.com",
        "user@example..com",
    ] {
        let outcome = orchestrator.send_report(&request(recipient)).await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.failure_kind,
            Some(FailureKind::Validation),
            "{recipient:?}"
        );
        assert!(!outcome.remediation.is_empty());
    }

    assert_eq!(relay.connections(), 0);
    assert_eq!(recorder.len(), 9);
}

#[tokio::test]
async fn test_missing_credentials_are_not_configured() {
    let relay = MockRelay::builder().build().await.unwrap();

    for config in [
        RelayConfig {
            sender: None,
            ..relay_config(relay.addr().port())
        },
        RelayConfig {
            secret: None,
            ..relay_config(relay.addr().port())
        },
        RelayConfig {
            sender: Some("   ".to_string()),
            ..relay_config(relay.addr().port())
        },
    ] {
        let (orchestrator, _) = orchestrator(config);
        let outcome = orchestrator.send_report(&request("user@example.com")).await;
        assert_eq!(outcome.failure_kind, Some(FailureKind::NotConfigured));
    }

    assert_eq!(relay.connections(), 0);
}

#[tokio::test]
async fn test_refused_recipient_is_not_delivered() {
    let relay = MockRelay::builder()
        .with_rcpt_to_response(550, "5.1.1 User unknown")
        .build()
        .await
        .unwrap();
    let (orchestrator, recorder) = orchestrator(relay_config(relay.addr().port()));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure_kind, Some(FailureKind::RecipientRefused));
    assert!(outcome.message.contains("550"));

    let commands = relay.commands().await;
    assert!(!commands.contains(&SmtpCommand::Data));
    assert_eq!(
        commands
            .iter()
            .filter(|command| matches!(command, SmtpCommand::MailFrom(_)))
            .count(),
        1
    );
    assert!(commands.contains(&SmtpCommand::Rset));
    assert_eq!(recorder.len(), 1);
}

#[tokio::test]
async fn test_total_timeout_aborts_and_closes_the_connection() {
    let relay = MockRelay::builder()
        .with_stall_on("DATA")
        .build()
        .await
        .unwrap();
    let config = RelayConfig {
        timeouts: ClientTimeouts {
            total_ms: 500,
            ..timeouts()
        },
        ..relay_config(relay.addr().port())
    };
    let (orchestrator, recorder) = orchestrator(config);

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::Timeout));
    assert!(outcome.processing_time_ms < 3_000.0);
    assert!(
        relay.wait_until_idle(Duration::from_secs(2)).await,
        "relay connection left open"
    );
    assert!(relay.commands().await.contains(&SmtpCommand::Data));
    assert_eq!(recorder.len(), 1);
}

#[tokio::test]
async fn test_send_timeout_bounds_transmission() {
    let relay = MockRelay::builder()
        .with_stall_on(END_OF_DATA)
        .build()
        .await
        .unwrap();
    let config = RelayConfig {
        timeouts: ClientTimeouts {
            send_ms: 300,
            ..timeouts()
        },
        ..relay_config(relay.addr().port())
    };
    let (orchestrator, _) = orchestrator(config);

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::Timeout));
    assert!(outcome.message.contains("send timeout"));
    assert!(relay.wait_until_idle(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_cancelled_caller_stops_transmission() {
    // Each connection waits 400ms for its greeting, so the caller gives up
    // while the transmission session is still connecting.
    let relay = MockRelay::builder()
        .with_connection_delay(Duration::from_millis(400))
        .build()
        .await
        .unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(600),
        orchestrator.send_report(&request("user@example.com")),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let commands = relay.commands().await;
    assert!(
        !commands
            .iter()
            .any(|command| matches!(command, SmtpCommand::MailFrom(_) | SmtpCommand::MessageContent(_))),
        "message sent after the caller gave up: {commands:?}"
    );
    assert!(relay.wait_until_idle(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_rejected_credentials() {
    let relay = MockRelay::builder()
        .with_auth_response(535, "5.7.8 Username and Password not accepted")
        .build()
        .await
        .unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::Authentication));
    assert_eq!(outcome.remediation[0], "Check sender credentials");
    // The probe fails fast: no message is ever composed or sent.
    assert_eq!(relay.connections(), 1);
    assert!(
        !relay
            .commands()
            .await
            .iter()
            .any(|command| matches!(command, SmtpCommand::MailFrom(_)))
    );
}

#[tokio::test]
async fn test_auth_login_is_used_when_plain_is_not_offered() {
    let relay = MockRelay::builder()
        .with_ehlo_response(
            250,
            vec!["mock.example.com".to_string(), "AUTH LOGIN".to_string()],
        )
        .build()
        .await
        .unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert!(outcome.success, "{outcome:?}");
    assert!(
        relay
            .commands()
            .await
            .contains(&SmtpCommand::Auth("LOGIN".to_string()))
    );
}

#[tokio::test]
async fn test_unreachable_relay_is_connection_failed() {
    let (orchestrator, _) = orchestrator(relay_config(closed_port().await));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ConnectionFailed));
}

#[tokio::test]
async fn test_rejected_greeting_is_connection_failed() {
    let relay = MockRelay::builder()
        .with_greeting(554, "5.3.2 Service unavailable")
        .build()
        .await
        .unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ConnectionFailed));
}

#[tokio::test]
async fn test_dropped_connection_is_connection_failed() {
    let relay = MockRelay::builder()
        .with_network_error_after_commands(1)
        .build()
        .await
        .unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ConnectionFailed));
}

#[tokio::test]
async fn test_required_tls_without_starttls_is_connection_failed() {
    let relay = MockRelay::builder().build().await.unwrap();
    let config = RelayConfig {
        tls: TlsConfig::required(),
        ..relay_config(relay.addr().port())
    };
    let (orchestrator, _) = orchestrator(config);

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ConnectionFailed));
    assert!(!relay.commands().await.contains(&SmtpCommand::Auth("PLAIN".to_string())));
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_disabled_certificate_validation_warns_once() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish(),
    );

    let relay = MockRelay::builder()
        .with_ehlo_response(
            250,
            vec!["mock.example.com".to_string(), "STARTTLS".to_string(), "AUTH PLAIN".to_string()],
        )
        .with_starttls_response(220, "2.0.0 Ready to start TLS")
        .build()
        .await
        .unwrap();
    let config = RelayConfig {
        tls: TlsConfig {
            accept_invalid_certs: true,
            ..TlsConfig::required()
        },
        ..relay_config(relay.addr().port())
    };
    let (orchestrator, _) = orchestrator(config);

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ConnectionFailed));
    assert!(relay.commands().await.contains(&SmtpCommand::StartTls));
    assert_eq!(
        logs.contents()
            .matches("TLS certificate validation is disabled")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_rejected_message_data_is_unknown() {
    let relay = MockRelay::builder()
        .with_data_end_response(554, "5.6.0 Message rejected")
        .build()
        .await
        .unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure_kind, Some(FailureKind::Unknown));
}

#[tokio::test]
async fn test_invalid_prediction_is_content_preparation() {
    let relay = MockRelay::builder().build().await.unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let mut request = request("user@example.com");
    request.prediction.confidence = 1.7;
    let outcome = orchestrator.send_report(&request).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ContentPreparation));
    // Only the probe connected.
    assert_eq!(relay.connections(), 1);
}

#[tokio::test]
async fn test_recorder_failure_does_not_mask_delivery() {
    let relay = MockRelay::builder().build().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"").unwrap();

    let orchestrator = DeliveryOrchestrator::new(
        relay_config(relay.addr().port()),
        Arc::new(FileRecorder::new(blocker.join("history.json"), 50)),
    );

    let outcome = orchestrator.send_report(&request("user@example.com")).await;

    assert!(outcome.success, "{outcome:?}");
}

#[tokio::test]
async fn test_file_recorder_keeps_the_latest_records() {
    let relay = MockRelay::builder().build().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delivery_records.json");
    let recorder = Arc::new(FileRecorder::new(&path, 3));

    let orchestrator = DeliveryOrchestrator::new(
        relay_config(relay.addr().port()),
        Arc::clone(&recorder) as Arc<dyn DeliveryRecorder>,
    );

    for n in 0..4 {
        orchestrator
            .send_report(&request(&format!("user{n}@example.com")))
            .await;
    }

    let recipients: Vec<_> = recorder
        .records()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.recipient)
        .collect();
    assert_eq!(
        recipients,
        vec!["user1@example.com", "user2@example.com", "user3@example.com"]
    );
}

#[tokio::test]
async fn test_concurrent_reports_are_independent() {
    let relay = MockRelay::builder().build().await.unwrap();
    let (orchestrator, recorder) = orchestrator(relay_config(relay.addr().port()));

    let handles: Vec<_> = (0..5)
        .map(|n| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .send_report(&request(&format!("user{n}@example.com")))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().success);
    }
    assert_eq!(recorder.len(), 5);
}

#[tokio::test]
async fn test_probe() {
    let relay = MockRelay::builder().build().await.unwrap();
    let (orchestrator, recorder) = orchestrator(relay_config(relay.addr().port()));

    let result = orchestrator.probe().await;

    assert!(result.ok, "{result:?}");
    assert_eq!(result.failure_kind, None);
    assert_eq!(result.relay_endpoint, format!("127.0.0.1:{}", relay.addr().port()));
    assert_eq!(result.sender_identity.as_deref(), Some("reports@example.com"));
    assert!(relay.commands().await.contains(&SmtpCommand::Quit));
    // A probe is not a delivery.
    assert!(recorder.is_empty());
}

#[tokio::test]
async fn test_probe_reports_rejected_credentials() {
    let relay = MockRelay::builder()
        .with_auth_response(535, "5.7.8 Bad credentials")
        .build()
        .await
        .unwrap();
    let (orchestrator, _) = orchestrator(relay_config(relay.addr().port()));

    let result = orchestrator.probe().await;

    assert!(!result.ok);
    assert_eq!(result.failure_kind, Some(FailureKind::Authentication));
    assert!(result.detail.contains("535"));
}

#[tokio::test]
async fn test_retry_stops_on_permanent_failure() {
    let relay = MockRelay::builder()
        .with_rcpt_to_response(550, "5.1.1 User unknown")
        .build()
        .await
        .unwrap();
    let (orchestrator, recorder) = orchestrator(relay_config(relay.addr().port()));
    let policy = RetryPolicy {
        base_delay_ms: 10,
        jitter_factor: 0.0,
        ..RetryPolicy::default()
    };

    let outcome = orchestrator
        .send_report_with_retry(&request("user@example.com"), &policy)
        .await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::RecipientRefused));
    assert_eq!(recorder.len(), 1);
}

#[tokio::test]
async fn test_retry_exhausts_attempts_on_transient_failure() {
    let (orchestrator, recorder) = orchestrator(relay_config(closed_port().await));
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 10,
        max_delay_ms: 20,
        jitter_factor: 0.0,
        ..RetryPolicy::default()
    };

    let outcome = orchestrator
        .send_report_with_retry(&request("user@example.com"), &policy)
        .await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ConnectionFailed));
    assert_eq!(recorder.len(), 3);
}

#[tokio::test]
async fn test_retry_respects_overall_ceiling() {
    let (orchestrator, recorder) = orchestrator(relay_config(closed_port().await));
    let policy = RetryPolicy {
        max_attempts: 10,
        base_delay_ms: 5_000,
        overall_ms: 1_000,
        jitter_factor: 0.0,
        ..RetryPolicy::default()
    };

    let started = std::time::Instant::now();
    let outcome = orchestrator
        .send_report_with_retry(&request("user@example.com"), &policy)
        .await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::ConnectionFailed));
    // The first backoff would already pass the ceiling.
    assert_eq!(recorder.len(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_outcome_json_shape() {
    let (orchestrator, _) = orchestrator(relay_config(closed_port().await));

    let outcome = orchestrator.send_report(&request("not-an-email")).await;
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["success"], serde_json::json!(false));
    assert_eq!(json["failureKind"], serde_json::json!("validation"));
    assert_eq!(json["recipient"], serde_json::json!("not-an-email"));
    assert!(json["processingTimeMs"].as_f64().unwrap() > 0.0);
    assert!(json["remediation"].is_array());
}
