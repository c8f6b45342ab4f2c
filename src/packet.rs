use crate::error::SourceQueryError;
use crate::reader::BufferReader;

/// Header of every single-packet request and reply.
pub const SINGLE_PACKET_HEADER: i32 = -1;

/// Replies are read into a buffer of this size; anything longer is truncated.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Placeholder challenge sent with the first A2S_PLAYER request.
pub const NO_CHALLENGE: i32 = -1;

/// Reply format tags, the byte following the header.
pub mod tag {
    /// A2S_INFO reply, Source and GoldSrc on Steam
    pub const INFO_STEAM: u8 = b'I';
    /// A2S_INFO reply, pre-Steam GoldSrc
    pub const INFO_LEGACY: u8 = b'm';
    /// S2C_CHALLENGE
    pub const CHALLENGE: u8 = b'A';
    /// A2S_PLAYER reply
    pub const PLAYERS: u8 = b'D';
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPacket {
    /// A2S_INFO -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_INFO
    Info,
    /// A2S_PLAYER -- https://developer.valvesoftware.com/wiki/Server_queries#A2S_PLAYER
    ///
    /// Sent first with [NO_CHALLENGE], then again with the token the
    /// server handed back in its S2C_CHALLENGE reply.
    Players { challenge: i32 },
}

impl RequestPacket {
    const INFO_BODY: &'static [u8] = b"TSource Engine Query";
    const PLAYERS_TYPE: u8 = b'U';

    /// Serializes a request packet into an array of bytes.
    pub fn pack(&self) -> Vec<u8> {
        // header, body, terminator
        let mut payload: Vec<u8> = Vec::with_capacity(32);
        payload.extend_from_slice(&SINGLE_PACKET_HEADER.to_le_bytes());
        match self {
            RequestPacket::Info => payload.extend_from_slice(Self::INFO_BODY),
            RequestPacket::Players { challenge } => {
                payload.push(Self::PLAYERS_TYPE);
                payload.extend_from_slice(&challenge.to_le_bytes());
            }
        }
        payload.push(0);

        payload
    }
}

/// Check the `-1` header at the front of `reader` and return the format tag.
pub(crate) fn read_header(reader: &mut BufferReader) -> Result<u8, SourceQueryError> {
    let header = reader.read_i32();
    if header != SINGLE_PACKET_HEADER {
        return Err(SourceQueryError::BadHeader(header));
    }
    Ok(reader.read_u8())
}
