use helios::config::InverterConfig;
use helios::modbus::{ModbusClient, RegisterReader, RegisterType, decode_32bit_float, decode_power};

#[test]
fn modbus_client_starts_disconnected() {
    let cfg = InverterConfig::default();
    let client = ModbusClient::new(&cfg);
    assert!(!client.is_connected());
    assert_eq!(client.endpoint(), "192.168.178.36:502 unit 3");
}

#[test]
fn inverter_config_defaults() {
    let c = InverterConfig::default();
    assert_eq!(c.port, 502);
    assert_eq!(c.unit_id, 3);
    assert_eq!(c.power_register, 30775);
    assert_eq!(c.register_count, 2);
    assert_eq!(c.data_type, RegisterType::S32);
}

#[test]
fn decode_32bit_float_happy_path() {
    let regs = [0x3F80u16, 0x0000u16];
    assert!((decode_32bit_float(&regs).unwrap() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn decode_power_signed_and_unsigned() {
    // 1234 W in the SMA total AC power register
    assert_eq!(
        decode_power(&[0x0000, 0x04D2], RegisterType::S32).unwrap(),
        Some(1234.0)
    );
    assert_eq!(
        decode_power(&[0xFFFF, 0xFFF6], RegisterType::S32).unwrap(),
        Some(-10.0)
    );
    assert_eq!(
        decode_power(&[0x0001, 0x0000], RegisterType::U32).unwrap(),
        Some(65536.0)
    );
    assert_eq!(decode_power(&[0xFF9C], RegisterType::S16).unwrap(), Some(-100.0));
    assert_eq!(decode_power(&[0x0BB8], RegisterType::U16).unwrap(), Some(3000.0));
    assert_eq!(
        decode_power(&[0x44FA, 0x0000], RegisterType::F32).unwrap(),
        Some(2000.0)
    );
}

#[test]
fn decode_power_ignores_extra_words() {
    assert_eq!(
        decode_power(&[0x0000, 0x0064, 0xDEAD], RegisterType::S32).unwrap(),
        Some(100.0)
    );
}

#[tokio::test]
async fn modbus_connect_invalid_address_errors() {
    let cfg = InverterConfig {
        host: "bad host".to_string(),
        ..Default::default()
    };
    let mut client = ModbusClient::new(&cfg);
    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("Invalid socket address"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn modbus_read_without_connect_returns_not_connected() {
    let cfg = InverterConfig::default();
    let mut client = ModbusClient::new(&cfg);
    let err = client.read_holding_registers(30775, 2).await.unwrap_err();
    assert!(err.to_string().contains("Not connected"));
    assert!(err.is_transient());
}
