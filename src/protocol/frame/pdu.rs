use super::{
    super::error::{Error, ErrorCode, Result},
    be,
    comm::S7Header,
    item::DataItemIter,
    types::{
        S7Area, S7DataVariableType, S7Function, S7PduType, S7ReturnCode, S7SyntaxId,
        S7TransportSize,
    },
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes, BytesMut};

/// Length of one S7-Any variable specification item
pub const VAR_SPEC_LEN: usize = 12;
/// Header of one write data item: reserved(1) + var type(1) + length(2)
pub const DATA_ITEM_HEADER_LEN: usize = 4;

/// Parsed S7 PDU (header + parameter + payload) with zero-copy regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S7Pdu {
    pub header: S7Header,
    pub param: Bytes,
    pub payload: Bytes,
}

impl S7Pdu {
    /// Parse a complete PDU received from the transport. Region boundaries
    /// are taken from the header; bytes beyond them are ignored.
    pub fn parse_received(raw: &Bytes) -> Result<S7Pdu> {
        let (_rest, pdu) = S7Pdu::parse(raw, raw, &())?;
        Ok(pdu)
    }

    /// Header error class/code as a raw value; zero means success.
    #[inline]
    pub fn result_code(&self) -> u16 {
        self.header.error_code.map_or(0, u16::from)
    }

    /// Turn a non-zero header error into `Error::S7Error`.
    pub fn validate_response(&self) -> Result<()> {
        match self.header.error_code {
            Some(code) if code != ErrorCode::Success => Err(Error::S7Error { code }),
            _ => Ok(()),
        }
    }

    /// Function code of the parameter region.
    #[inline]
    pub fn function(&self) -> Result<u8> {
        be::get_u8(&self.param, 0)
    }

    /// Check the response answers `expected` and that the header reports no error.
    pub fn expect_function(&self, expected: S7Function) -> Result<()> {
        if self.header.pdu_type != S7PduType::AckData {
            return Err(Error::ErrUnexpectedPdu);
        }
        let actual = self.function()?;
        if actual != expected as u8 {
            return Err(Error::ErrUnexpectedFunction {
                expected: expected as u8,
                actual,
            });
        }
        self.validate_response()
    }

    /// Validate a ReadVar response and return the outcome of its first item.
    pub fn test_read_result(&self) -> Result<S7ReturnCode> {
        self.expect_function(S7Function::ReadVar)?;
        Ok(S7ReturnCode::from(be::get_u8(&self.payload, 0)?))
    }

    /// Validate a WriteVar response and return the outcome of its first item.
    pub fn test_write_result(&self) -> Result<S7ReturnCode> {
        self.expect_function(S7Function::WriteVar)?;
        Ok(S7ReturnCode::from(be::get_u8(&self.payload, 0)?))
    }

    /// Number of items announced in the parameter region (ReadVar/WriteVar).
    #[inline]
    pub fn item_count(&self) -> Result<u8> {
        be::get_u8(&self.param, 1)
    }

    /// Iterate the data items of a ReadVar response.
    pub fn data_items(&self) -> Result<DataItemIter<'_>> {
        Ok(DataItemIter::new(&self.payload, self.item_count()? as usize))
    }

    /// Serialize header and both regions into a single buffer.
    pub fn into_bytes(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len(&()));
        self.header.encode_to(&mut buf);
        buf.put_slice(&self.param);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl WireEncode for S7Pdu {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        self.header.encoded_len() + self.param.len() + self.payload.len()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        self.header.encode_to(dst);
        dst.put_slice(&self.param);
        dst.put_slice(&self.payload);
        Ok(())
    }
}

impl WireDecode for S7Pdu {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        let (hdr, rest) = S7Header::parse(input)?;
        let param_len = hdr.param_len as usize;
        let need = param_len + hdr.payload_len as usize;
        if rest.len() < need {
            return Err(Error::InsufficientData {
                needed: hdr.encoded_len() + need,
                available: input.len(),
            });
        }
        let (param_bytes, tail) = rest.split_at(param_len);
        let (payload_bytes, remain) = tail.split_at(hdr.payload_len as usize);
        Ok((
            remain,
            S7Pdu {
                header: hdr,
                param: Bytes::slice_ref(parent, param_bytes),
                payload: Bytes::slice_ref(parent, payload_bytes),
            },
        ))
    }
}

/// Owned, growable PDU under construction.
///
/// The header, parameter and data regions live in separate buffers so that
/// appending to one never shifts the others; the header lengths are kept in
/// step with the regions on every append.
#[derive(Debug, Clone)]
pub struct PduBuilder {
    header: S7Header,
    param: BytesMut,
    data: BytesMut,
}

impl PduBuilder {
    pub fn new(kind: S7PduType, pdu_ref: u16) -> Self {
        Self {
            header: S7Header::new(kind, pdu_ref),
            param: BytesMut::new(),
            data: BytesMut::new(),
        }
    }

    /// Reset to an empty PDU of `kind`, keeping the reference number.
    pub fn init_header(&mut self, kind: S7PduType) -> &mut Self {
        self.header = S7Header::new(kind, self.header.pdu_ref);
        self.param.clear();
        self.data.clear();
        self
    }

    pub fn set_error_code(&mut self, code: ErrorCode) -> &mut Self {
        if self.header.pdu_type.is_response() {
            self.header.error_code = Some(code);
        }
        self
    }

    /// Append a parameter block. Any data appended before is discarded since
    /// data always follows the complete parameter region.
    pub fn add_parameter(&mut self, bytes: &[u8]) -> &mut Self {
        self.param.extend_from_slice(bytes);
        self.data.clear();
        self.sync_lengths();
        self
    }

    pub fn add_data(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self.sync_lengths();
        self
    }

    /// Append the first `len` bytes of `bytes`.
    pub fn add_data_len(&mut self, bytes: &[u8], len: usize) -> Result<&mut Self> {
        let head = bytes.get(..len).ok_or(Error::InsufficientData {
            needed: len,
            available: bytes.len(),
        })?;
        Ok(self.add_data(head))
    }

    /// Append one ReadVar item descriptor for `length` bytes at `start`.
    ///
    /// Timer and counter areas are addressed by element number and read
    /// two bytes per element.
    pub fn add_read_item(
        &mut self,
        area: S7Area,
        db: u16,
        start: u32,
        length: u16,
    ) -> Result<&mut Self> {
        self.ensure_items_param(S7Function::ReadVar)?;
        let (transport, count, address) = item_geometry(area, start, length)?;
        self.push_var_spec(transport, count, db, area, address);
        Ok(self)
    }

    /// Append one WriteVar item descriptor and its data item for a byte range.
    pub fn add_write_item(
        &mut self,
        area: S7Area,
        db: u16,
        start: u32,
        payload: &[u8],
    ) -> Result<&mut Self> {
        let byte_count = u16::try_from(payload.len()).map_err(|_| Error::ProtocolViolation {
            context: "write payload exceeds 65535 bytes",
        })?;
        self.ensure_items_param(S7Function::WriteVar)?;
        let (transport, count, address) = item_geometry(area, start, byte_count)?;
        self.push_var_spec(transport, count, db, area, address);
        let (var_type, len_field) = if area.is_timer_or_counter() {
            (S7DataVariableType::OctetString, byte_count)
        } else {
            let bits = byte_count.checked_mul(8).ok_or(Error::ProtocolViolation {
                context: "write payload too long for a bit length field",
            })?;
            (S7DataVariableType::ByteWordDWord, bits)
        };
        self.push_data_item(var_type, len_field, payload);
        Ok(self)
    }

    /// Append one WriteVar item writing `length_bits` bits starting at bit
    /// address `start_bit` (`byte * 8 + bit`).
    pub fn add_write_bits_item(
        &mut self,
        area: S7Area,
        db: u16,
        start_bit: u32,
        length_bits: u16,
        payload: &[u8],
    ) -> Result<&mut Self> {
        if area.is_timer_or_counter() {
            return Err(Error::ProtocolViolation {
                context: "bit writes are not addressable in timer/counter areas",
            });
        }
        let needed = (length_bits as usize).div_ceil(8);
        let data = payload.get(..needed).ok_or(Error::InsufficientData {
            needed,
            available: payload.len(),
        })?;
        check_u24(start_bit)?;
        self.ensure_items_param(S7Function::WriteVar)?;
        self.push_var_spec(S7TransportSize::Bit, length_bits, db, area, start_bit);
        self.push_data_item(S7DataVariableType::Bit, length_bits, data);
        Ok(self)
    }

    #[inline]
    pub fn header(&self) -> &S7Header {
        &self.header
    }

    #[inline]
    pub fn param(&self) -> &[u8] {
        &self.param
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total serialized size.
    #[inline]
    pub fn len(&self) -> usize {
        self.header.encoded_len() + self.param.len() + self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.param.is_empty() && self.data.is_empty()
    }

    pub fn finish(self) -> S7Pdu {
        S7Pdu {
            header: self.header,
            param: self.param.freeze(),
            payload: self.data.freeze(),
        }
    }

    fn sync_lengths(&mut self) {
        self.header.param_len = self.param.len() as u16;
        self.header.payload_len = self.data.len() as u16;
    }

    /// Start a `[function, count]` parameter or verify the existing one, then
    /// bump the item count.
    fn ensure_items_param(&mut self, function: S7Function) -> Result<()> {
        if self.param.is_empty() {
            self.param.put_u8(function as u8);
            self.param.put_u8(0);
        } else if self.param[0] != function as u8 || self.param.len() < 2 {
            return Err(Error::ProtocolViolation {
                context: "item added to a PDU of another function",
            });
        }
        let count = self.param[1];
        if count == u8::MAX {
            return Err(Error::ProtocolViolation {
                context: "too many items in one PDU",
            });
        }
        self.param[1] = count + 1;
        self.sync_lengths();
        Ok(())
    }

    fn push_var_spec(
        &mut self,
        transport: S7TransportSize,
        count: u16,
        db: u16,
        area: S7Area,
        address: u32,
    ) {
        self.param.put_u8(0x12);
        self.param.put_u8(0x0A);
        self.param.put_u8(S7SyntaxId::S7Any as u8);
        self.param.put_u8(transport as u8);
        self.param.put_u16(count);
        self.param.put_u16(if area == S7Area::DB { db } else { 0 });
        self.param.put_u8(area as u8);
        self.param.put_slice(&be::encode_u24(address));
        self.sync_lengths();
    }

    fn push_data_item(&mut self, var_type: S7DataVariableType, len_field: u16, payload: &[u8]) {
        if self.data.len() % 2 == 1 {
            self.data.put_u8(0x00);
        }
        self.data.put_u8(0x00);
        self.data.put_u8(var_type as u8);
        self.data.put_u16(len_field);
        self.data.put_slice(payload);
        self.sync_lengths();
    }
}

/// Transport size, element count and 24-bit address for a byte range.
fn item_geometry(area: S7Area, start: u32, length: u16) -> Result<(S7TransportSize, u16, u32)> {
    let transport = S7TransportSize::for_area(area);
    if area.is_timer_or_counter() {
        let count = length.div_ceil(transport.element_bytes() as u16);
        Ok((transport, count, check_u24(start)?))
    } else {
        let address = start.checked_mul(8).ok_or(Error::ErrInvalidAddress(format!(
            "byte offset {start} out of range"
        )))?;
        Ok((transport, length, check_u24(address)?))
    }
}

#[inline]
fn check_u24(address: u32) -> Result<u32> {
    if address <= 0x00FF_FFFF {
        Ok(address)
    } else {
        Err(Error::ErrInvalidAddress(format!(
            "bit address {address} exceeds 24 bits"
        )))
    }
}
