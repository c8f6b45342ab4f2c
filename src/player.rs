use std::net::SocketAddr;
use std::time::Duration;

use log::debug;

use crate::error::SourceQueryError;
use crate::packet::{read_header, tag};
use crate::reader::BufferReader;

/// One entry of an A2S_PLAYER reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Slot index
    pub index: u8,
    pub name: String,
    /// Kills, or whatever the game counts as score
    pub score: i32,
    /// Seconds connected
    pub duration: f32,
}

impl Player {
    /// Time connected. Negative or non-finite durations read as zero.
    pub fn connected_for(&self) -> Duration {
        Duration::try_from_secs_f32(self.duration).unwrap_or_default()
    }
}

/// A complete A2S_PLAYER reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Players {
    /// Where the reply came from, as seen by the socket
    pub sender: SocketAddr,
    /// Count the server claims to have sent; not always accurate
    pub advertised: u8,
    pub players: Vec<Player>,
}

/// Decoded reply to an A2S_PLAYER request.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerList {
    /// S2C_CHALLENGE: resend the request with this token.
    Challenge(i32),
    Players(Players),
}

impl PlayerList {
    /// Decode an A2S_PLAYER (or S2C_CHALLENGE) reply received from `sender`.
    ///
    /// The advertised player count is not trusted: records are read until
    /// the datagram runs out. A record cut short by the end of the datagram
    /// is dropped, but a challenge without its token or a list without its
    /// count is [SourceQueryError::Truncated].
    pub fn parse(data: &[u8], sender: SocketAddr) -> Result<PlayerList, SourceQueryError> {
        let mut reader = BufferReader::new(data);
        match read_header(&mut reader)? {
            tag::CHALLENGE => {
                let token = reader.read_i32();
                if reader.is_bad() {
                    return Err(SourceQueryError::Truncated(data.len()));
                }
                Ok(PlayerList::Challenge(token))
            }
            tag::PLAYERS => {
                let advertised = reader.read_u8();
                if reader.is_bad() {
                    return Err(SourceQueryError::Truncated(data.len()));
                }
                let mut players = Vec::with_capacity(advertised as usize);
                while !reader.is_eof() {
                    // field order matters, the name decides where score starts
                    let index = reader.read_u8();
                    let name = reader.read_string();
                    let score = reader.read_i32();
                    let duration = reader.read_f32();
                    if reader.is_bad() {
                        debug!("dropping truncated player record from {sender}");
                        break;
                    }
                    players.push(Player {
                        index,
                        name,
                        score,
                        duration,
                    });
                }
                if players.len() != advertised as usize {
                    debug!(
                        "{sender} advertised {advertised} players but sent {}",
                        players.len()
                    );
                }
                Ok(PlayerList::Players(Players {
                    sender,
                    advertised,
                    players,
                }))
            }
            n => Err(SourceQueryError::UnsupportedFormat(n)),
        }
    }

    pub fn challenge(&self) -> Option<i32> {
        match self {
            PlayerList::Challenge(token) => Some(*token),
            PlayerList::Players(_) => None,
        }
    }

    pub fn players(&self) -> Option<&[Player]> {
        match self {
            PlayerList::Challenge(_) => None,
            PlayerList::Players(list) => Some(&list.players),
        }
    }
}
