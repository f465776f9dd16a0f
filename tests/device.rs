use serde_json::json;
use smu_cycler::{ClientConfig, ClientError, SmuClient};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn smu(server: &MockServer) -> SmuClient {
    SmuClient::new(&ClientConfig::new(server.uri())).unwrap()
}

#[tokio::test]
async fn set_voltage_sends_potential_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/smu/set_potential"))
        .and(body_json(json!({"channel": 1, "potential": 3.8})))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(smu(&server).set_voltage(1, 3.8).await.unwrap(), "OK");
}

#[tokio::test]
async fn enable_and_set_current_hit_their_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/smu/enable_channel"))
        .and(body_json(json!({"channel": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_string("enabled"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/smu/set_current"))
        .and(body_json(json!({"channel": 2, "current": -0.005})))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;

    let client = smu(&server);
    client.enable_channel(2).await.unwrap();
    client.set_current(2, -0.005).await.unwrap();
}

#[tokio::test]
async fn measurement_parses_both_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/smu/measure_voltage_and_current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voltage": 3.712,
            "current": "0.0101",
            "timestamp": 1_700_000_000
        })))
        .mount(&server)
        .await;

    let m = smu(&server).measure_voltage_and_current(1).await.unwrap();
    assert_eq!(m.voltage, 3.712);
    assert_eq!(m.current, 0.0101);
    assert_eq!(m.timestamp, Some(json!(1_700_000_000)));
}

#[tokio::test]
async fn measurement_without_field_is_a_device_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/smu/measure_current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "busy"})))
        .mount(&server)
        .await;

    let err = smu(&server).measure_current(1).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::DeviceOperation {
            operation: "measure_current",
            ..
        }
    ));
}

#[tokio::test]
async fn non_json_measurement_is_a_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/smu/measure_voltage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("3.71 V"))
        .mount(&server)
        .await;

    let err = smu(&server).measure_voltage(1).await.unwrap_err();
    assert!(matches!(err, ClientError::ResponseFormat { .. }));
}
