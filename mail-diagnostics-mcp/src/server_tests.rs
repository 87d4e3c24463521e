use super::test_mocks::*;
use super::*;

use rmcp::model::ErrorCode;

fn domain(name: &str) -> Parameters<DomainParams> {
    Parameters(DomainParams {
        domain: name.to_string(),
    })
}

fn short_timeouts() -> ToolTimeouts {
    ToolTimeouts {
        dns_check_ms: 5,
        ports_ms: 5,
        tls_ms: 5,
        dnsbl_ms: 5,
        run_all_ms: 1_000,
    }
}

#[test]
fn sanitize_internal_error_hides_error_details() {
    let error = sanitize_internal_error("sensitive: /etc/secret", "Serialize check_mx result");
    let message = error.to_string();
    assert!(message.contains("Serialize check_mx result failed"));
    assert!(!message.contains("/etc/secret"));
}

#[tokio::test]
async fn check_mx_returns_envelope_json() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let result = server.check_mx(domain(" Example.COM. ")).await.unwrap();
    let json = result_json(&result);

    assert_eq!(json["ok"], true);
    assert!(json["error"].is_null());
    assert_eq!(json["data"][0]["preference"], 10);
    assert_eq!(json["data"][0]["host"], "mx.example.com");

    let calls = checks.calls_to("check_mx").await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].domain(), "example.com");
}

#[tokio::test]
async fn empty_domain_is_invalid_params() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let error = server.check_spf(domain("   ")).await.unwrap_err();

    assert_eq!(error.code, ErrorCode::INVALID_PARAMS);
    assert!(error.message.contains("Domain name is required"));
    assert!(checks.calls().await.is_empty());
}

#[tokio::test]
async fn malformed_domain_is_invalid_params() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let error = server
        .check_dmarc(domain("exa mple.com"))
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::INVALID_PARAMS);
    assert!(error.message.contains("Invalid domain name"));
    assert!(checks.calls().await.is_empty());
}

#[tokio::test]
async fn check_dkim_passes_deduplicated_selectors() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let result = server
        .check_dkim(Parameters(DkimParams {
            domain: "example.com".to_string(),
            selectors: Some(vec![
                "s1".to_string(),
                " ".to_string(),
                "s2".to_string(),
                "s1".to_string(),
            ]),
        }))
        .await
        .unwrap();

    let calls = checks.calls_to("check_dkim").await;
    assert_eq!(calls[0].selectors(), ["s1", "s2"]);
    let json = result_json(&result);
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn check_dkim_defaults_selector() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    server
        .check_dkim(Parameters(DkimParams {
            domain: "example.com".to_string(),
            selectors: None,
        }))
        .await
        .unwrap();

    let calls = checks.calls_to("check_dkim").await;
    assert_eq!(calls[0].selectors(), ["default"]);
}

#[tokio::test]
async fn host_override_reaches_port_and_tls_checks() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let params = || {
        Parameters(HostCheckParams {
            domain: "example.com".to_string(),
            host: Some("Relay.Example.NET".to_string()),
        })
    };
    server.check_ports(params()).await.unwrap();
    let result = server.check_tls(params()).await.unwrap();

    assert_eq!(
        checks.calls_to("check_ports").await[0].host_override(),
        Some("relay.example.net")
    );
    assert_eq!(
        checks.calls_to("check_tls").await[0].host_override(),
        Some("relay.example.net")
    );
    let json = result_json(&result);
    assert_eq!(json["data"]["host"], "relay.example.net");
    assert_eq!(json["data"]["certCN"], "relay.example.net");
}

#[tokio::test]
async fn invalid_host_override_is_invalid_params() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let error = server
        .check_ports(Parameters(HostCheckParams {
            domain: "example.com".to_string(),
            host: Some("not a host".to_string()),
        }))
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::INVALID_PARAMS);
    assert!(checks.calls().await.is_empty());
}

#[tokio::test]
async fn blank_host_override_is_ignored() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    server
        .check_tls(Parameters(HostCheckParams {
            domain: "example.com".to_string(),
            host: Some("  ".to_string()),
        }))
        .await
        .unwrap();

    assert_eq!(checks.calls_to("check_tls").await[0].host_override(), None);
}

#[tokio::test]
async fn check_timeout_returns_failed_envelope() {
    let checks = Arc::new(MockCheckGateway::default());
    checks
        .set_delay("check_mx", Duration::from_millis(50))
        .await;
    let server = build_server(Arc::clone(&checks) as Arc<dyn CheckGateway>, short_timeouts());

    let result = server.check_mx(domain("example.com")).await.unwrap();
    let json = result_json(&result);

    assert_eq!(json["ok"], false);
    assert!(json["data"].is_null());
    assert_eq!(json["error"], "check_mx timed out");
}

#[tokio::test]
async fn check_error_envelope_is_passed_through() {
    let checks = Arc::new(MockCheckGateway::default());
    checks
        .set_error("check_ptr", "No address found for example.com")
        .await;
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let result = server.check_ptr(domain("example.com")).await.unwrap();
    let json = result_json(&result);

    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "No address found for example.com");
}

#[tokio::test]
async fn single_checks_delegate_to_gateway() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    assert!(server.check_spf(domain("example.com")).await.is_ok());
    assert!(server.check_dmarc(domain("example.com")).await.is_ok());
    assert!(server.check_dnsbl(domain("example.com")).await.is_ok());
    assert!(server.check_ptr(domain("example.com")).await.is_ok());

    let tools: Vec<String> = checks.calls().await.into_iter().map(|(t, _)| t).collect();
    assert_eq!(
        tools,
        ["check_spf", "check_dmarc", "check_dnsbl", "check_ptr"]
    );
}

#[tokio::test]
async fn run_all_checks_returns_report_and_summary() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(
        Arc::clone(&checks) as Arc<dyn CheckGateway>,
        ToolTimeouts::default(),
    );

    let result = server
        .run_all_checks(Parameters(RunAllParams {
            domain: "example.com".to_string(),
            host: None,
            selectors: Some(vec!["s1".to_string()]),
        }))
        .await
        .unwrap();
    let json = result_json(&result);

    assert_eq!(json["ok"], true);
    let data = &json["data"];
    assert_eq!(data["domain"], "example.com");
    for key in ["mx", "spf", "dkim", "dmarc", "ports", "tls", "dnsbl", "ptr"] {
        assert_eq!(data[key]["ok"], true, "{key}");
    }

    let summary = data["summary"].as_array().unwrap();
    assert_eq!(summary.len(), 8);
    assert_eq!(summary[0]["check"], "mx");
    assert!(summary.iter().all(|item| item["status"] == "pass"));

    let calls = checks.calls().await;
    assert_eq!(calls.len(), 8);
    assert!(calls.iter().all(|(_, target)| target.selectors() == ["s1"]));
}

#[tokio::test]
async fn run_all_checks_isolates_slow_and_failing_checks() {
    let checks = Arc::new(MockCheckGateway::default());
    checks
        .set_delay("check_tls", Duration::from_millis(50))
        .await;
    checks
        .set_error("check_dnsbl", "DNS query timed out")
        .await;
    let server = build_server(Arc::clone(&checks) as Arc<dyn CheckGateway>, short_timeouts());

    let result = server
        .run_all_checks(Parameters(RunAllParams {
            domain: "example.com".to_string(),
            host: None,
            selectors: None,
        }))
        .await
        .unwrap();
    let json = result_json(&result);
    let data = &json["data"];

    assert_eq!(data["tls"]["ok"], false);
    assert_eq!(data["tls"]["error"], "check_tls timed out");
    assert_eq!(data["dnsbl"]["error"], "DNS query timed out");
    assert_eq!(data["mx"]["ok"], true);

    let summary = data["summary"].as_array().unwrap();
    let status = |check: &str| {
        summary
            .iter()
            .find(|item| item["check"] == check)
            .map(|item| item["status"].clone())
            .unwrap()
    };
    assert_eq!(status("tls"), "error");
    assert_eq!(status("dnsbl"), "error");
    assert_eq!(status("spf"), "pass");
}

#[tokio::test]
async fn run_all_checks_outer_timeout() {
    let checks = Arc::new(MockCheckGateway::default());
    checks
        .set_delay("check_ports", Duration::from_millis(50))
        .await;
    let timeouts = ToolTimeouts {
        run_all_ms: 5,
        ..ToolTimeouts::default()
    };
    let server = build_server(Arc::clone(&checks) as Arc<dyn CheckGateway>, timeouts);

    let result = server
        .run_all_checks(Parameters(RunAllParams {
            domain: "example.com".to_string(),
            host: None,
            selectors: None,
        }))
        .await
        .unwrap();
    let json = result_json(&result);

    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "run_all_checks timed out");
}

#[tokio::test]
async fn get_info_contains_expected_instructions() {
    let checks = Arc::new(MockCheckGateway::default());
    let server = build_server(checks, ToolTimeouts::default());

    let info = server.get_info();

    assert_eq!(info.protocol_version, ProtocolVersion::LATEST);
    assert!(info.capabilities.tools.is_some());
    let instructions = info.instructions.unwrap_or_default();
    assert!(instructions.contains("run_all_checks"));
    assert!(instructions.contains("check_tls"));
}

#[tokio::test]
async fn bounded_passes_through_completed_envelope() {
    let envelope = bounded(
        Duration::from_secs(1),
        async { CheckEnvelope::success("hello".to_string()) },
        "test tool",
    )
    .await;
    assert_eq!(envelope.data.as_deref(), Some("hello"));
}

#[tokio::test]
async fn run_check_tool_serializes_pretty_json() {
    let result = run_check_tool(
        Duration::from_secs(1),
        async { CheckEnvelope::success(vec![1, 2]) },
        "test tool",
    )
    .await
    .unwrap();
    let json = result_json(&result);
    assert_eq!(json["data"], serde_json::json!([1, 2]));
    assert!(json["error"].is_null());
}
