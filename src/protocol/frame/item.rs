use super::{
    super::error::{Error, Result},
    types::{S7DataVariableType, S7ReturnCode},
};
use nom::{
    bytes::complete::take,
    number::complete::{be_u16, u8 as nom_u8},
    IResult,
};

type NomErr<'a> = nom::error::Error<&'a [u8]>;

#[inline]
fn byte(i: &[u8]) -> IResult<&[u8], u8, NomErr<'_>> {
    nom_u8(i)
}

#[inline]
fn word(i: &[u8]) -> IResult<&[u8], u16, NomErr<'_>> {
    be_u16(i)
}

#[inline]
fn bytes(i: &[u8], n: usize) -> IResult<&[u8], &[u8], NomErr<'_>> {
    take(n)(i)
}

/// One data item of a ReadVar response or UserData payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataItem<'a> {
    pub return_code: S7ReturnCode,
    /// Raw variable type byte; unknown types are passed through
    pub var_type: u8,
    pub data: &'a [u8],
}

impl DataItem<'_> {
    /// Map a non-success return code to `Error::ItemError`.
    pub fn check(&self) -> Result<()> {
        match self.return_code {
            S7ReturnCode::Success => Ok(()),
            code => Err(Error::ItemError { code }),
        }
    }
}

fn data_item(input: &[u8]) -> IResult<&[u8], DataItem<'_>, NomErr<'_>> {
    let (i, return_code) = byte(input)?;
    let (i, var_type) = byte(i)?;
    let (i, len_field) = word(i)?;
    let len = match S7DataVariableType::try_from(var_type) {
        Ok(t) => t.data_len_in_bytes(len_field),
        Err(_) => len_field as usize,
    };
    let (i, data) = bytes(i, len)?;
    Ok((
        i,
        DataItem {
            return_code: S7ReturnCode::from(return_code),
            var_type,
            data,
        },
    ))
}

/// Parse a single data item, returning the rest of the input.
pub fn parse_data_item(input: &[u8]) -> Result<(&[u8], DataItem<'_>)> {
    data_item(input).map_err(|_| Error::InsufficientData {
        needed: 4,
        available: input.len(),
    })
}

/// Iterator over the data items of a ReadVar response. A fill byte follows
/// every odd-length item except the last one.
#[derive(Debug, Clone, Copy)]
pub struct DataItemIter<'a> {
    remaining: &'a [u8],
    left: usize,
}

impl<'a> DataItemIter<'a> {
    pub fn new(raw: &'a [u8], item_count: usize) -> Self {
        Self {
            remaining: raw,
            left: item_count,
        }
    }
}

impl<'a> Iterator for DataItemIter<'a> {
    type Item = Result<DataItem<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 {
            return None;
        }
        match parse_data_item(self.remaining) {
            Ok((mut rest, item)) => {
                self.left -= 1;
                if self.left > 0 && item.data.len() % 2 == 1 && !rest.is_empty() {
                    rest = &rest[1..];
                }
                self.remaining = rest;
                Some(Ok(item))
            }
            Err(e) => {
                self.left = 0;
                Some(Err(e))
            }
        }
    }
}

/// Parameter block of a UserData PDU (CPU functions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserDataParam {
    pub method: u8,
    pub function_type: u8,
    pub function_group: u8,
    pub subfunction: u8,
    pub sequence_number: u8,
    /// Data unit reference; responses only
    pub data_unit_ref: u8,
    /// Non-zero while further data units follow; responses only
    pub last_data_unit: u8,
    /// UserData error code; responses only
    pub error_code: u16,
}

impl UserDataParam {
    #[inline]
    pub fn has_more(&self) -> bool {
        self.last_data_unit != 0
    }
}

fn userdata_param(input: &[u8]) -> IResult<&[u8], UserDataParam, NomErr<'_>> {
    // parameter head 00 01 12
    let (i, _head) = bytes(input, 3)?;
    let (i, len) = byte(i)?;
    let (i, body) = bytes(i, len as usize)?;
    let (b, method) = byte(body)?;
    let (b, type_group) = byte(b)?;
    let (b, subfunction) = byte(b)?;
    let (b, sequence_number) = byte(b)?;
    let (data_unit_ref, last_data_unit, error_code) = if b.len() >= 4 {
        let (b, dur) = byte(b)?;
        let (b, ldu) = byte(b)?;
        let (_b, err) = word(b)?;
        (dur, ldu, err)
    } else {
        (0, 0, 0)
    };
    Ok((
        i,
        UserDataParam {
            method,
            function_type: type_group >> 4,
            function_group: type_group & 0x0F,
            subfunction,
            sequence_number,
            data_unit_ref,
            last_data_unit,
            error_code,
        },
    ))
}

pub fn parse_userdata_param(input: &[u8]) -> Result<UserDataParam> {
    if input.len() < 3 || input[..3] != [0x00, 0x01, 0x12] {
        return Err(Error::ProtocolViolation {
            context: "UserData parameter head",
        });
    }
    userdata_param(input)
        .map(|(_, p)| p)
        .map_err(|_| Error::InsufficientData {
            needed: 8,
            available: input.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterates_items_and_skips_fill_bytes() {
        let raw = [
            0xFF, 0x04, 0x00, 0x08, 0x11, 0x00, // 1 byte + fill
            0xFF, 0x04, 0x00, 0x10, 0x22, 0x33, // 2 bytes
            0x0A, 0x00, 0x00, 0x00, // not available
            0xFF, 0x03, 0x00, 0x01, 0x01, // bit, last item: no fill
        ];
        let items: Vec<_> = DataItemIter::new(&raw, 4).collect::<Result<_>>().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].data, &[0x11]);
        assert_eq!(items[1].data, &[0x22, 0x33]);
        assert_eq!(items[2].return_code, S7ReturnCode::ObjectDoesNotExist);
        assert!(items[2].data.is_empty());
        assert!(matches!(items[2].check(), Err(Error::ItemError { .. })));
        assert_eq!(items[3].data, &[0x01]);
    }

    #[test]
    fn test_octet_string_counts_bytes() {
        let raw = [0xFF, 0x09, 0x00, 0x03, 1, 2, 3];
        let (rest, item) = parse_data_item(&raw).unwrap();
        assert!(rest.is_empty());
        assert_eq!(item.data, &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_item_reports_error_once() {
        let raw = [0xFF, 0x04, 0x00, 0x20, 0x01];
        let mut it = DataItemIter::new(&raw, 2);
        assert!(matches!(it.next(), Some(Err(Error::InsufficientData { .. }))));
        assert!(it.next().is_none());
    }

    #[test]
    fn test_userdata_response_param() {
        let raw = [0x00, 0x01, 0x12, 0x08, 0x12, 0x84, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00];
        let p = parse_userdata_param(&raw).unwrap();
        assert_eq!(p.method, 0x12);
        assert_eq!(p.function_type, 0x08);
        assert_eq!(p.function_group, 0x04);
        assert_eq!(p.sequence_number, 3);
        assert!(p.has_more());

        let request = [0x00, 0x01, 0x12, 0x04, 0x11, 0x44, 0x01, 0x00];
        let p = parse_userdata_param(&request).unwrap();
        assert!(!p.has_more());
        assert!(parse_userdata_param(&[0x01, 0x01, 0x12]).is_err());
    }
}
