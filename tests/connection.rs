mod common;

use common::{init_tracing, Faults, MockPlc, AREA_DB, AREA_M};
use s7_link::{
    protocol::frame::{S7Area, S7ReturnCode},
    Connection, DeviceConfig, Error, ErrorClass, PlcFamily, TsapConfig,
};
use std::sync::Arc;

async fn connect(plc: &MockPlc) -> Connection {
    let config = plc.device_config().session_config().unwrap();
    Connection::open(Arc::new(config)).await.unwrap()
}

#[tokio::test]
async fn test_negotiates_pdu_and_limits() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    let conn = connect(&plc).await;
    assert_eq!(conn.negotiated_pdu_len(), 240);
    assert_eq!(conn.max_read_payload(), 222);
    assert_eq!(conn.max_write_payload(), 212);
    // rack 0 slot 2, PG
    assert_eq!(plc.with_state(|s| s.last_dst_tsap), Some(0x0102));
}

#[tokio::test]
async fn test_read_and_write_bytes() {
    init_tracing();
    let plc = MockPlc::start(480).await;
    plc.with_state(|s| s.set_bytes(AREA_DB, 5, 10, &[1, 2, 3, 4]));
    let mut conn = connect(&plc).await;

    let data = conn.read_bytes(S7Area::DB, 5, 10, 4).await.unwrap();
    assert_eq!(&data[..], &[1, 2, 3, 4]);

    conn.write_bytes(S7Area::M, 0, 3, &[0xAA, 0xBB]).await.unwrap();
    assert_eq!(plc.with_state(|s| s.bytes(AREA_M, 0, 3, 2)), vec![0xAA, 0xBB]);

    conn.write_bits(S7Area::M, 0, 8 * 3 + 4, 1, &[1]).await.unwrap();
    assert_eq!(plc.with_state(|s| s.bytes(AREA_M, 0, 3, 1)), vec![0xBA]);
    conn.write_bits(S7Area::M, 0, 8 * 3 + 1, 1, &[0]).await.unwrap();
    assert_eq!(plc.with_state(|s| s.bytes(AREA_M, 0, 3, 1)), vec![0xB8]);

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_large_ranges_are_chunked() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    let image: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
    plc.with_state(|s| s.set_bytes(AREA_DB, 1, 0, &image));
    let mut conn = connect(&plc).await;

    let data = conn.read_bytes(S7Area::DB, 1, 0, 600).await.unwrap();
    assert_eq!(&data[..], &image[..]);
    // 600 bytes at 222 per exchange
    assert_eq!(plc.with_state(|s| s.read_requests), 3);

    let payload = vec![0x5A; 500];
    conn.write_bytes(S7Area::DB, 2, 7, &payload).await.unwrap();
    assert_eq!(plc.with_state(|s| s.write_requests), 3);
    assert_eq!(plc.with_state(|s| s.bytes(AREA_DB, 2, 7, 500)), payload);
}

#[tokio::test]
async fn test_dribbled_frames_are_reassembled() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    plc.set_faults(Faults {
        dribble: true,
        ..Default::default()
    });
    plc.with_state(|s| s.set_bytes(AREA_M, 0, 0, &[9, 8, 7]));
    let mut conn = connect(&plc).await;
    let data = conn.read_bytes(S7Area::M, 0, 0, 3).await.unwrap();
    assert_eq!(&data[..], &[9, 8, 7]);
}

#[tokio::test]
async fn test_item_error_keeps_link_up() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    let mut conn = connect(&plc).await;
    plc.set_faults(Faults {
        item_error: Some(S7ReturnCode::AddressOutOfRange),
        ..Default::default()
    });
    let err = conn.read_bytes(S7Area::DB, 99, 0, 4).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ItemError {
            code: S7ReturnCode::AddressOutOfRange
        }
    ));
    assert_eq!(err.class(), ErrorClass::Plc);
    assert!(!conn.is_broken());

    plc.set_faults(Faults::default());
    assert!(conn.read_bytes(S7Area::DB, 99, 0, 4).await.is_ok());
}

#[tokio::test]
async fn test_unexpected_function_breaks_connection() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    let mut conn = connect(&plc).await;
    plc.set_faults(Faults {
        wrong_function: true,
        ..Default::default()
    });
    let err = conn.read_bytes(S7Area::M, 0, 0, 2).await.unwrap_err();
    assert!(err.is_unexpected_function());
    assert!(err.requires_reconnect());
    assert!(conn.is_broken());
    assert!(matches!(
        conn.read_bytes(S7Area::M, 0, 0, 2).await,
        Err(Error::ErrUseClosedConnection)
    ));
}

#[tokio::test]
async fn test_identity_from_split_szl_answers() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    plc.set_faults(Faults {
        split_szl: Some(20),
        ..Default::default()
    });
    let mut conn = connect(&plc).await;

    let szl = conn.read_szl(0x001C, 0).await.unwrap();
    assert_eq!(szl.record_len, 34);
    assert_eq!(szl.records().count(), 3);

    let identity = conn.read_identity().await.unwrap();
    assert_eq!(identity.order_number.as_deref(), Some("6ES7 315-2EH14-0AB0"));
    assert_eq!(identity.hardware_version.as_deref(), Some("4"));
    assert_eq!(identity.firmware_version.as_deref(), Some("V3.2.6"));
    assert_eq!(identity.module_name.as_deref(), Some("CPU 315-2 PN/DP"));
    assert_eq!(identity.serial_number.as_deref(), Some("S C-X4U421302009"));
    assert_eq!(identity.memory_size, Some(393_216));
}

#[tokio::test]
async fn test_missing_szl_leaves_fields_empty() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    plc.with_state(|s| s.szl.remove(&0x0113));
    let mut conn = connect(&plc).await;
    let identity = conn.read_identity().await.unwrap();
    assert_eq!(identity.memory_size, None);
    assert!(identity.order_number.is_some());
    assert!(!conn.is_broken());
}

#[tokio::test]
async fn test_cp243_and_explicit_tsap() {
    init_tracing();
    let plc = MockPlc::start(240).await;

    let mut cfg: DeviceConfig = plc.device_config();
    cfg.family = PlcFamily::Cp243;
    let conn = Connection::open(Arc::new(cfg.session_config().unwrap())).await.unwrap();
    assert_eq!(plc.with_state(|s| s.last_dst_tsap), Some(0x4D57));
    drop(conn);

    let mut cfg = plc.device_config();
    cfg.tsap = TsapConfig::Tsap {
        src: 0x0100u16.into(),
        dst: "03:01".to_string().into(),
    };
    let _conn = Connection::open(Arc::new(cfg.session_config().unwrap())).await.unwrap();
    assert_eq!(plc.with_state(|s| s.last_dst_tsap), Some(0x0301));
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    init_tracing();
    let plc = MockPlc::start(240).await;
    plc.set_faults(Faults {
        refuse: true,
        ..Default::default()
    });
    let config = plc.device_config().session_config().unwrap();
    let err = Connection::open(Arc::new(config)).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transport);
}
