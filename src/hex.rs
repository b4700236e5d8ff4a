//! ASCII hex <-> binary conversion
//!
//! LoRaWAN keys and EUIs are handed to the driver as hex strings (the way they are printed on
//! network server consoles) but travel to the module as raw bytes inside an AT command
//! parameter. Nothing here allocates; every function validates against the caller's buffer
//! before touching it.

#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Error {
    /// hex input has an odd number of characters
    OddLength,
    /// hex input is not the length the caller asked for
    InvalidLength { expected: usize, actual: usize },
    /// output buffer cannot hold the result
    BufferTooSmall { required: usize, available: usize },
    MalformedHex(base16::DecodeError),
}

impl From<base16::DecodeError> for Error {
    fn from(e: base16::DecodeError) -> Error {
        Error::MalformedHex(e)
    }
}

/// Decodes `ascii` into `out`, returning the number of bytes written.
///
/// Fails on odd length, on any non-hex character and when `out` is shorter than
/// `ascii.len() / 2`. On failure `out` may hold a partially decoded prefix but nothing past
/// `ascii.len() / 2` is ever written.
pub fn decode(ascii: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    if ascii.len() % 2 != 0 {
        return Err(Error::OddLength);
    }
    let required = ascii.len() / 2;
    if required > out.len() {
        return Err(Error::BufferTooSmall {
            required,
            available: out.len(),
        });
    }
    Ok(base16::decode_slice(ascii, &mut out[..required])?)
}

/// Decodes a hex string that must encode exactly `N` bytes.
pub fn decode_exact<const N: usize>(ascii: &str) -> Result<[u8; N], Error> {
    if ascii.len() != 2 * N {
        return Err(Error::InvalidLength {
            expected: 2 * N,
            actual: ascii.len(),
        });
    }
    let mut out = [0u8; N];
    decode(ascii.as_bytes(), &mut out)?;
    Ok(out)
}

/// Renders `bytes` as uppercase hex into `out` and returns the rendered part as `&str`.
pub fn encode_upper<'a>(bytes: &[u8], out: &'a mut [u8]) -> Result<&'a str, Error> {
    let required = bytes.len() * 2;
    if required > out.len() {
        return Err(Error::BufferTooSmall {
            required,
            available: out.len(),
        });
    }
    let written = base16::encode_config_slice(bytes, base16::EncodeUpper, &mut out[..required]);
    // base16 only ever emits [0-9A-F]
    core::str::from_utf8(&out[..written]).map_err(|_| Error::BufferTooSmall {
        required,
        available: written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_input() {
        let mut out = [0u8; 4];
        let len = decode(b"1A2B3C4D", &mut out).unwrap();
        assert_eq!(len, 4);
        assert_eq!(out, [0x1a, 0x2b, 0x3c, 0x4d]);
    }

    #[test]
    fn test_decode_lowercase() {
        let mut out = [0u8; 2];
        decode(b"beef", &mut out).unwrap();
        assert_eq!(out, [0xbe, 0xef]);
    }

    #[test]
    fn test_decode_odd_length() {
        let mut out = [0u8; 2];
        assert_eq!(decode(b"123", &mut out), Err(Error::OddLength));
    }

    #[test]
    fn test_decode_invalid_char() {
        let mut out = [0u8; 16];
        let res = decode(b"0000000000000000000000000000000G", &mut out);
        assert!(matches!(res, Err(Error::MalformedHex(_))));
    }

    #[test]
    fn test_decode_never_writes_past_capacity() {
        let mut out = [0x55u8; 4];
        let res = decode(b"0102030405", &mut out[..2]);
        assert_eq!(
            res,
            Err(Error::BufferTooSmall {
                required: 5,
                available: 2
            })
        );
        // untouched, including the tail outside the slice we handed in
        assert_eq!(out, [0x55; 4]);
    }

    #[test]
    fn test_decode_exact_wrong_length() {
        let res = decode_exact::<8>("BADLENGTH");
        assert_eq!(
            res,
            Err(Error::InvalidLength {
                expected: 16,
                actual: 9
            })
        );
    }

    #[test]
    fn test_decode_exact_app_eui() {
        let eui = decode_exact::<8>("A1B2C3D4E5F60708").unwrap();
        assert_eq!(eui, [0xa1, 0xb2, 0xc3, 0xd4, 0xe5, 0xf6, 0x07, 0x08]);
    }

    #[test]
    fn test_encode_upper() {
        let mut out = [0u8; 16];
        let s = encode_upper(&[0, 1, 2, 3, 4, 5, 6, 7], &mut out).unwrap();
        assert_eq!(s, "0001020304050607");

        let s = encode_upper(&[0xde, 0xad], &mut out).unwrap();
        assert_eq!(s, "DEAD");
    }

    #[test]
    fn test_encode_upper_buffer_too_small() {
        let mut out = [0u8; 15];
        assert_eq!(
            encode_upper(&[0u8; 8], &mut out),
            Err(Error::BufferTooSmall {
                required: 16,
                available: 15
            })
        );
    }
}
