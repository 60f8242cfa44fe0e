use super::{
    super::error::Result,
    cotp::Cotp,
    cotp_param::{CotpCcParams, CotpCrParams, CotpDataParams},
    pdu::{PduBuilder, S7Pdu},
    types::{
        CpuFunctionGroup, CpuFunctionType, S7Area, S7DataVariableType, S7Function, S7PduType,
        S7ReturnCode, SZL_SUBFUNCTION_READ, USERDATA_METHOD_FOLLOWUP, USERDATA_METHOD_REQUEST,
    },
    S7AppBody, S7Message, Tpkt,
};
use bytes::{BufMut, Bytes, BytesMut};

#[inline]
fn userdata_type_group(function_type: CpuFunctionType) -> u8 {
    ((function_type as u8) << 4) | CpuFunctionGroup::CpuFunctions as u8
}

/// SetupCommunication Job: `F0 00 amq_caller amq_callee pdu_len`.
pub fn build_setup_comm(pdu_ref: u16, amq_caller: u16, amq_callee: u16, pdu_len: u16) -> S7Pdu {
    let mut param = [0u8; 8];
    param[0] = S7Function::SetupCommunication as u8;
    param[2..4].copy_from_slice(&amq_caller.to_be_bytes());
    param[4..6].copy_from_slice(&amq_callee.to_be_bytes());
    param[6..8].copy_from_slice(&pdu_len.to_be_bytes());
    let mut b = PduBuilder::new(S7PduType::Job, pdu_ref);
    b.add_parameter(&param);
    b.finish()
}

/// ReadVar Job for one byte range.
pub fn build_read_request(
    pdu_ref: u16,
    area: S7Area,
    db: u16,
    start: u32,
    length: u16,
) -> Result<S7Pdu> {
    let mut b = PduBuilder::new(S7PduType::Job, pdu_ref);
    b.add_read_item(area, db, start, length)?;
    Ok(b.finish())
}

/// WriteVar Job for one byte range.
pub fn build_write_request(
    pdu_ref: u16,
    area: S7Area,
    db: u16,
    start: u32,
    payload: &[u8],
) -> Result<S7Pdu> {
    let mut b = PduBuilder::new(S7PduType::Job, pdu_ref);
    b.add_write_item(area, db, start, payload)?;
    Ok(b.finish())
}

/// WriteVar Job for `length_bits` bits starting at bit address `start_bit`.
pub fn build_write_bits_request(
    pdu_ref: u16,
    area: S7Area,
    db: u16,
    start_bit: u32,
    length_bits: u16,
    payload: &[u8],
) -> Result<S7Pdu> {
    let mut b = PduBuilder::new(S7PduType::Job, pdu_ref);
    b.add_write_bits_item(area, db, start_bit, length_bits, payload)?;
    Ok(b.finish())
}

/// First Read-SZL request of a chain (UserData, CPU functions).
pub fn build_szl_request(pdu_ref: u16, szl_id: u16, szl_index: u16) -> S7Pdu {
    let param = [
        0x00,
        0x01,
        0x12,
        0x04,
        USERDATA_METHOD_REQUEST,
        userdata_type_group(CpuFunctionType::Request),
        SZL_SUBFUNCTION_READ,
        0x00,
    ];
    let mut data = [0u8; 8];
    data[0] = u8::from(S7ReturnCode::Success);
    data[1] = S7DataVariableType::OctetString as u8;
    data[2..4].copy_from_slice(&4u16.to_be_bytes());
    data[4..6].copy_from_slice(&szl_id.to_be_bytes());
    data[6..8].copy_from_slice(&szl_index.to_be_bytes());
    let mut b = PduBuilder::new(S7PduType::UserData, pdu_ref);
    b.add_parameter(&param).add_data(&data);
    b.finish()
}

/// Follow-up Read-SZL request asking for the next data unit of `sequence`.
pub fn build_szl_followup(pdu_ref: u16, sequence: u8) -> S7Pdu {
    let param = [
        0x00,
        0x01,
        0x12,
        0x08,
        USERDATA_METHOD_FOLLOWUP,
        userdata_type_group(CpuFunctionType::Request),
        SZL_SUBFUNCTION_READ,
        sequence,
        0x00,
        0x00,
        0x00,
        0x00,
    ];
    let mut b = PduBuilder::new(S7PduType::UserData, pdu_ref);
    b.add_parameter(&param).add_data(&[0x0A, 0x00, 0x00, 0x00]);
    b.finish()
}

/// AckData answering SetupCommunication with the granted values.
pub fn build_setup_comm_ack(pdu_ref: u16, amq_caller: u16, amq_callee: u16, pdu_len: u16) -> S7Pdu {
    let job = build_setup_comm(pdu_ref, amq_caller, amq_callee, pdu_len);
    let mut b = PduBuilder::new(S7PduType::AckData, pdu_ref);
    b.add_parameter(&job.param);
    b.finish()
}

/// AckData answering ReadVar. Each item is encoded as byte data (length in
/// bits) unless its return code is an error, in which case it carries no data.
pub fn build_read_ack(pdu_ref: u16, items: &[(S7ReturnCode, &[u8])]) -> S7Pdu {
    let mut data = BytesMut::new();
    let last = items.len().saturating_sub(1);
    for (i, (code, bytes)) in items.iter().enumerate() {
        data.put_u8(u8::from(*code));
        if *code == S7ReturnCode::Success {
            data.put_u8(S7DataVariableType::ByteWordDWord as u8);
            data.put_u16((bytes.len() * 8) as u16);
            data.put_slice(bytes);
            if i < last && bytes.len() % 2 == 1 {
                data.put_u8(0x00);
            }
        } else {
            data.put_u8(S7DataVariableType::Null as u8);
            data.put_u16(0);
        }
    }
    let mut b = PduBuilder::new(S7PduType::AckData, pdu_ref);
    b.add_parameter(&[S7Function::ReadVar as u8, items.len() as u8])
        .add_data(&data);
    b.finish()
}

/// AckData answering WriteVar with one return code per item.
pub fn build_write_ack(pdu_ref: u16, codes: &[S7ReturnCode]) -> S7Pdu {
    let data: Vec<u8> = codes.iter().map(|c| u8::from(*c)).collect();
    let mut b = PduBuilder::new(S7PduType::AckData, pdu_ref);
    b.add_parameter(&[S7Function::WriteVar as u8, codes.len() as u8])
        .add_data(&data);
    b.finish()
}

/// UserData response carrying one data unit of a Read-SZL answer.
/// `last_data_unit` non-zero announces that more units follow.
pub fn build_szl_ack(pdu_ref: u16, sequence: u8, last_data_unit: u8, unit: &[u8]) -> S7Pdu {
    let param = [
        0x00,
        0x01,
        0x12,
        0x08,
        USERDATA_METHOD_FOLLOWUP,
        userdata_type_group(CpuFunctionType::Response),
        SZL_SUBFUNCTION_READ,
        sequence,
        0x00,
        last_data_unit,
        0x00,
        0x00,
    ];
    let mut data = BytesMut::with_capacity(4 + unit.len());
    data.put_u8(u8::from(S7ReturnCode::Success));
    data.put_u8(S7DataVariableType::OctetString as u8);
    data.put_u16(unit.len() as u16);
    data.put_slice(unit);
    let mut b = PduBuilder::new(S7PduType::UserData, pdu_ref);
    b.add_parameter(&param).add_data(&data);
    b.finish()
}

#[inline]
fn message_from_cotp(cotp: Cotp, app: Option<S7AppBody>) -> S7Message {
    S7Message {
        tpkt: Tpkt::with_payload_len(0),
        cotp,
        app,
    }
}

pub fn build_cotp_cr_message(params: CotpCrParams) -> S7Message {
    message_from_cotp(Cotp::Cr(params), None)
}

pub fn build_cotp_cc_message(params: CotpCcParams) -> S7Message {
    message_from_cotp(Cotp::Cc(params), None)
}

/// Single-segment Data TPDU carrying a complete PDU.
pub fn build_cotp_data_message(pdu: S7Pdu) -> S7Message {
    message_from_cotp(
        Cotp::D(CotpDataParams::default()),
        Some(S7AppBody::Parsed(pdu)),
    )
}

/// Data TPDU carrying raw user data; `eot` marks the final segment.
pub fn build_cotp_segment(payload: Bytes, eot: bool) -> S7Message {
    message_from_cotp(
        Cotp::D(CotpDataParams { eot, tpdu_nr: 0 }),
        Some(S7AppBody::Segmented(payload)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::parse_userdata_param;

    #[test]
    fn test_setup_comm_layout() {
        let pdu = build_setup_comm(1, 1, 1, 480);
        assert_eq!(
            &pdu.clone().into_bytes()[..],
            &[
                0x32, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x08, 0x00, 0x00, // header
                0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, 0x01, 0xE0,
            ]
        );
        let ack = build_setup_comm_ack(1, 1, 1, 240);
        assert_eq!(ack.header.pdu_type, S7PduType::AckData);
        assert_eq!(&ack.param[6..8], &240u16.to_be_bytes());
    }

    #[test]
    fn test_szl_request_layout() {
        let pdu = build_szl_request(3, 0x0011, 0x0000);
        assert_eq!(pdu.header.pdu_type, S7PduType::UserData);
        assert_eq!(&pdu.param[..], &[0x00, 0x01, 0x12, 0x04, 0x11, 0x44, 0x01, 0x00]);
        assert_eq!(&pdu.payload[..], &[0xFF, 0x09, 0x00, 0x04, 0x00, 0x11, 0x00, 0x00]);

        let next = build_szl_followup(4, 7);
        let p = parse_userdata_param(&next.param).unwrap();
        assert_eq!(p.method, USERDATA_METHOD_FOLLOWUP);
        assert_eq!(p.sequence_number, 7);
    }

    #[test]
    fn test_read_ack_items() {
        let ack = build_read_ack(
            9,
            &[
                (S7ReturnCode::Success, &[0x01][..]),
                (S7ReturnCode::AddressOutOfRange, &[][..]),
            ],
        );
        let raw = ack.into_bytes();
        let parsed = S7Pdu::parse_received(&raw).unwrap();
        let items: Vec<_> = parsed
            .data_items()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(items[0].data, &[0x01]);
        assert_eq!(items[1].return_code, S7ReturnCode::AddressOutOfRange);
    }
}
