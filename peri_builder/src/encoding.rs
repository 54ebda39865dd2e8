use super::{Tag, ZVTError, ZVTResult};
use yore::code_pages::CP1252;

/// Encodes/decodes a single value of type `T` to/from the DATA portion of a
/// BMP/TLV field. `decode` returns the parsed value plus the unconsumed tail.
pub trait Encoding<T> {
    fn decode(bytes: &[u8]) -> ZVTResult<(T, &[u8])>;
    fn encode(input: &T) -> Vec<u8>;
}

/// Byte-for-byte passthrough. Structs tagged with `#[derive(Zvt)]` get their
/// own `Encoding<Self>` impl generated by the macro; this module only needs to
/// provide the leaf-type impls the generated code bottoms out on.
pub struct Default;

impl Encoding<u8> for Default {
    fn decode(bytes: &[u8]) -> ZVTResult<(u8, &[u8])> {
        let Some(b) = bytes.first() else {
            return Err(ZVTError::IncompleteData);
        };
        Ok((*b, &bytes[1..]))
    }

    fn encode(input: &u8) -> Vec<u8> {
        vec![*input]
    }
}

impl Encoding<u16> for Default {
    fn decode(bytes: &[u8]) -> ZVTResult<(u16, &[u8])> {
        if bytes.len() < 2 {
            return Err(ZVTError::IncompleteData);
        }
        let v = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        Ok((v, &bytes[2..]))
    }

    fn encode(input: &u16) -> Vec<u8> {
        input.to_be_bytes().to_vec()
    }
}

impl Encoding<u32> for Default {
    fn decode(bytes: &[u8]) -> ZVTResult<(u32, &[u8])> {
        if bytes.len() < 4 {
            return Err(ZVTError::IncompleteData);
        }
        let v = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        Ok((v, &bytes[4..]))
    }

    fn encode(input: &u32) -> Vec<u8> {
        input.to_be_bytes().to_vec()
    }
}

/// BMP tags are a single byte; the top-level class/instruction tag uses
/// [BigEndian] instead (see [crate::ZvtSerializer]'s blanket impl).
impl Encoding<Tag> for Default {
    fn decode(bytes: &[u8]) -> ZVTResult<(Tag, &[u8])> {
        let Some(b) = bytes.first() else {
            return Err(ZVTError::IncompleteData);
        };
        Ok((Tag(*b as u16), &bytes[1..]))
    }

    fn encode(input: &Tag) -> Vec<u8> {
        vec![input.0 as u8]
    }
}

/// Free-form text, Latin-1 encoded on the wire (ZVT strings are CP1252/Latin-1,
/// never UTF-8).
impl Encoding<String> for Default {
    fn decode(bytes: &[u8]) -> ZVTResult<(String, &[u8])> {
        Ok((CP1252.decode(bytes).into_owned(), &[]))
    }

    fn encode(input: &String) -> Vec<u8> {
        CP1252.encode(input).unwrap_or_else(|_| input.clone().into_bytes())
    }
}

/// Plain UTF-8 text, used where a field is documented as already being ASCII
/// (e.g. software-version strings).
pub struct Utf8;

impl Encoding<String> for Utf8 {
    fn decode(bytes: &[u8]) -> ZVTResult<(String, &[u8])> {
        Ok((String::from_utf8_lossy(bytes).into_owned(), &[]))
    }

    fn encode(input: &String) -> Vec<u8> {
        input.clone().into_bytes()
    }
}

/// Big-endian multi-byte encoding, used for the top-level class/instruction
/// tag and any BMP field that is documented as big-endian rather than BCD.
pub struct BigEndian;

impl Encoding<Tag> for BigEndian {
    fn decode(bytes: &[u8]) -> ZVTResult<(Tag, &[u8])> {
        if bytes.len() < 2 {
            return Err(ZVTError::IncompleteData);
        }
        let v = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        Ok((Tag(v), &bytes[2..]))
    }

    fn encode(input: &Tag) -> Vec<u8> {
        input.0.to_be_bytes().to_vec()
    }
}

impl Encoding<u16> for BigEndian {
    fn decode(bytes: &[u8]) -> ZVTResult<(u16, &[u8])> {
        <Default as Encoding<u16>>::decode(bytes)
    }

    fn encode(input: &u16) -> Vec<u8> {
        <Default as Encoding<u16>>::encode(input)
    }
}

/// Packed BCD (binary-coded decimal), high nibble first. Used for ZVT
/// amounts, currencies, trace numbers and passwords. Accepts byte slices of
/// any length produced by a [crate::length::Length] impl (`Fixed<N>`, `Llv`,
/// `Lllv`); the value packs two decimal digits per byte.
pub struct Bcd;

impl Encoding<usize> for Bcd {
    fn decode(bytes: &[u8]) -> ZVTResult<(usize, &[u8])> {
        let mut value: usize = 0;
        for byte in bytes {
            value = value * 100 + (byte >> 4) as usize * 10 + (byte & 0x0f) as usize;
        }
        Ok((value, &[]))
    }

    fn encode(input: &usize) -> Vec<u8> {
        crate::framing::amount_to_bcd(*input)
    }
}

/// Hex-encoded bytes represented as a lowercase hex [String] (used for
/// opaque binary identifiers such as UUIDs or track data that aren't decimal
/// amounts but also aren't text).
pub struct Hex;

impl Encoding<String> for Hex {
    fn decode(bytes: &[u8]) -> ZVTResult<(String, &[u8])> {
        Ok((hex::encode(bytes), &[]))
    }

    fn encode(input: &String) -> Vec<u8> {
        hex::decode(input).unwrap_or_default()
    }
}
