use thiserror::Error;

/// Upper bound, inclusive, for both header fields. Shared by the chat
/// sessions and the peer RPC links.
pub const MAX_PAYLOAD: usize = 2048;

/// header = <2bytes msg id><2bytes payload len>, both big-endian
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("msg id {0} exceeds the frame bound")]
    IdOutOfRange(u16),
    #[error("payload length {0} exceeds the frame bound")]
    LenOutOfRange(u16),
}

pub fn encode(msg_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::<u8>::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&msg_id.to_be_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn decode_header(head: [u8; HEADER_LEN]) -> Result<(u16, u16), FrameError> {
    let msg_id = u16::from_be_bytes([head[0], head[1]]);
    let len = u16::from_be_bytes([head[2], head[3]]);
    if msg_id as usize > MAX_PAYLOAD {
        return Err(FrameError::IdOutOfRange(msg_id));
    }
    if len as usize > MAX_PAYLOAD {
        return Err(FrameError::LenOutOfRange(len));
    }
    Ok((msg_id, len))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn test_roundtrip() {
        let payload = br#"{"uid":42,"token":"T"}"#;
        let frame = encode(1005, payload);
        assert_eq!(frame.len(), HEADER_LEN + payload.len());
        let (id, len) = decode_header([frame[0], frame[1], frame[2], frame[3]]).unwrap();
        assert_eq!(id, 1005);
        assert_eq!(len as usize, payload.len());
        assert_eq!(&frame[HEADER_LEN..], payload);
    }

    #[test]
    pub fn test_empty_payload() {
        let frame = encode(1017, b"");
        assert_eq!(frame.len(), HEADER_LEN);
        let (id, len) = decode_header([frame[0], frame[1], frame[2], frame[3]]).unwrap();
        assert_eq!((id, len), (1017, 0));
    }

    #[test]
    pub fn test_bounds() {
        // 0xFF 0xFF 0x00 0x10 closes the session
        assert_eq!(
            decode_header([0xff, 0xff, 0x00, 0x10]),
            Err(FrameError::IdOutOfRange(0xffff))
        );
        assert_eq!(
            decode_header([0x03, 0xed, 0xff, 0xff]),
            Err(FrameError::LenOutOfRange(0xffff))
        );
        // both bounds are inclusive
        assert!(decode_header([0x08, 0x00, 0x08, 0x00]).is_ok());
        assert!(decode_header([0x08, 0x01, 0x00, 0x00]).is_err());
        assert!(decode_header([0x00, 0x00, 0x08, 0x01]).is_err());
    }
}
