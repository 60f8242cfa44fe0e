pub mod be;
mod builder;
pub mod comm;
pub mod cotp;
pub mod cotp_param;
pub mod item;
mod pdu;
pub mod tpkt;
pub mod tsap;
pub mod types;

pub use super::wire::{WireDecode, WireEncode};

/// Application-layer body carried by a COTP Data TPDU.
///
/// Outgoing messages usually carry an already serialized PDU; incoming ones
/// are parsed by the codec after reassembly. A body that fails to parse as an
/// S7 PDU stays `Segmented` so the session can report it as a desync.
#[derive(Debug, Clone)]
pub enum S7AppBody {
    /// Raw user data bytes
    Segmented(bytes::Bytes),
    /// Complete S7 PDU with zero-copy parameter and payload regions
    Parsed(S7Pdu),
}

/// A wire packet: TPKT, COTP and an optional application body.
#[derive(Debug, Clone)]
pub struct S7Message {
    /// TPKT header of the (last) frame
    pub tpkt: Tpkt,
    /// COTP TPDU
    pub cotp: Cotp,
    /// Application body when the COTP TPDU is Data. None for non-Data TPDUs.
    pub app: Option<S7AppBody>,
}

pub use builder::{
    build_cotp_cc_message, build_cotp_cr_message, build_cotp_data_message, build_cotp_segment,
    build_read_ack, build_read_request, build_setup_comm, build_setup_comm_ack, build_szl_ack,
    build_szl_followup, build_szl_request, build_write_ack, build_write_bits_request,
    build_write_request,
};
pub use comm::S7Header;
pub use cotp::Cotp;
pub use cotp_param::{CotpCcParams, CotpCrParams, CotpDataParams, CotpDrParams};
pub use item::{parse_userdata_param, DataItem, DataItemIter, UserDataParam};
pub use pdu::{PduBuilder, S7Pdu, DATA_ITEM_HEADER_LEN, VAR_SPEC_LEN};
pub use tpkt::Tpkt;
pub use tsap::{rack_slot_tsap_pair, ConnectionType, Tsap, TsapPair};
pub use types::{
    CotpType, S7Area, S7DataVariableType, S7Function, S7PduType, S7ReturnCode, S7SyntaxId,
    S7TransportSize,
};
