use std::net::SocketAddr;

use log::debug;

use crate::error::SourceQueryError;
use crate::packet::{read_header, tag};
use crate::reader::BufferReader;

/// Server type byte.
///
/// Upper-case variants are what pre-Source GoldSrc servers send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// `d`
    Dedicated,
    /// `D`
    GoldSrcDedicated,
    /// `l`: non-dedicated
    Listen,
    /// `L`
    GoldSrcListen,
    /// `p`: SourceTV relay
    Proxy,
    /// `P`
    GoldSrcProxy,
    Unknown(u8),
}

impl From<u8> for ServerType {
    fn from(value: u8) -> Self {
        match value {
            b'd' => ServerType::Dedicated,
            b'D' => ServerType::GoldSrcDedicated,
            b'l' => ServerType::Listen,
            b'L' => ServerType::GoldSrcListen,
            b'p' => ServerType::Proxy,
            b'P' => ServerType::GoldSrcProxy,
            n => ServerType::Unknown(n),
        }
    }
}

impl ServerType {
    pub fn is_dedicated(&self) -> bool {
        matches!(self, ServerType::Dedicated | ServerType::GoldSrcDedicated)
    }
}

/// Server environment byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// `l`
    Linux,
    /// `L`, GoldSrc
    GoldSrcLinux,
    /// `w`
    Windows,
    /// `W`, GoldSrc
    GoldSrcWindows,
    /// `m`
    Mac,
    /// `o`, sent by Mac servers since L4D1
    MacOsX,
    Unknown(u8),
}

impl From<u8> for Environment {
    fn from(value: u8) -> Self {
        match value {
            b'l' => Environment::Linux,
            b'L' => Environment::GoldSrcLinux,
            b'w' => Environment::Windows,
            b'W' => Environment::GoldSrcWindows,
            b'm' => Environment::Mac,
            b'o' => Environment::MacOsX,
            n => Environment::Unknown(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    /// Password protected
    Private,
}

impl From<u8> for Visibility {
    fn from(value: u8) -> Self {
        if value == 0 {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// SourceTV relay advertised by a Steam server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTv {
    pub port: u16,
    pub name: String,
}

/// Fields only present in the Steam (`I`) reply.
///
/// Everything after `version` is gated by a bit of `edf` and stays `None`
/// when the bit is clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamDetails {
    /// Steam application ID of the game
    pub app_id: u16,
    /// Version of the game installed on the server
    pub version: String,
    /// Extra Data Flags
    pub edf: u8,
    /// Game port, EDF `0x80`
    pub port: Option<u16>,
    /// Server SteamID as two little-endian halves, EDF `0x10`
    pub steam_id_parts: Option<[i32; 2]>,
    /// EDF `0x40`
    pub source_tv: Option<SourceTv>,
    /// Tags, EDF `0x20`
    pub keywords: Option<String>,
    /// 64-bit game ID as two little-endian halves, EDF `0x01`
    pub game_id_parts: Option<[i32; 2]>,
}

impl SteamDetails {
    pub const EDF_PORT: u8 = 0x80;
    pub const EDF_STEAM_ID: u8 = 0x10;
    pub const EDF_SOURCE_TV: u8 = 0x40;
    pub const EDF_KEYWORDS: u8 = 0x20;
    pub const EDF_GAME_ID: u8 = 0x01;

    /// The server's 64-bit SteamID, if advertised.
    pub fn steam_id(&self) -> Option<u64> {
        self.steam_id_parts.map(join_halves)
    }

    /// The full 64-bit game ID, if advertised.
    pub fn game_id(&self) -> Option<u64> {
        self.game_id_parts.map(join_halves)
    }
}

fn join_halves([low, high]: [i32; 2]) -> u64 {
    ((high as u32 as u64) << 32) | (low as u32 as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModType {
    SingleAndMultiplayer,
    MultiplayerOnly,
    Unknown(u8),
}

impl From<u8> for ModType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModType::SingleAndMultiplayer,
            1 => ModType::MultiplayerOnly,
            n => ModType::Unknown(n),
        }
    }
}

/// Half-Life mod description carried by legacy replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInfo {
    /// URL to mod website
    pub link: String,
    /// URL to download the mod
    pub download_link: String,
    /// Always 0 on the wire
    pub reserved: u8,
    pub version: i32,
    /// Space in bytes the mod takes up
    pub size: i32,
    pub mod_type: ModType,
    /// Does the mod use its own DLL?
    pub dll_required: bool,
}

/// Fields only present in the legacy (`m`) reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDetails {
    /// Address the server reports for itself
    pub local_address: String,
    pub mod_info: Option<ModInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoDetails {
    Steam(SteamDetails),
    Legacy(LegacyDetails),
}

/// Server information as obtained by an A2S_INFO query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Where the reply came from, as seen by the socket
    pub sender: SocketAddr,
    /// A2S_INFO protocol version
    pub protocol: u8,
    /// Server hostname
    pub hostname: String,
    /// Current map
    pub map: String,
    /// Location of server files
    pub folder: String,
    /// Name of game
    pub game: String,
    /// Current players
    pub players: u8,
    /// Max players
    pub maxplayers: u8,
    /// Current bots
    pub bots: u8,
    pub server_type: ServerType,
    pub server_env: Environment,
    pub visibility: Visibility,
    /// Is the server VAC enabled?
    pub vac_enabled: bool,
    pub details: InfoDetails,
}

impl ServerInfo {
    /// Decode an A2S_INFO reply datagram received from `sender`.
    pub fn parse(data: &[u8], sender: SocketAddr) -> Result<ServerInfo, SourceQueryError> {
        let mut reader = BufferReader::new(data);
        let info = match read_header(&mut reader)? {
            tag::INFO_STEAM => Self::parse_steam(&mut reader, sender),
            tag::INFO_LEGACY => Self::parse_legacy(&mut reader, sender),
            n => return Err(SourceQueryError::UnsupportedFormat(n)),
        };

        // a reply ending right before the EDF is complete, anything shorter is not
        if reader.is_bad() {
            debug!("info reply from {sender} is truncated");
            return Err(SourceQueryError::Truncated(data.len()));
        }
        Ok(info)
    }

    fn parse_steam(reader: &mut BufferReader, sender: SocketAddr) -> ServerInfo {
        let protocol = reader.read_u8();
        let hostname = reader.read_string();
        let map = reader.read_string();
        let folder = reader.read_string();
        let game = reader.read_string();
        let app_id = reader.read_u16();
        let players = reader.read_u8();
        let maxplayers = reader.read_u8();
        let bots = reader.read_u8();
        let server_type = ServerType::from(reader.read_u8());
        let server_env = Environment::from(reader.read_u8());
        let visibility = Visibility::from(reader.read_u8());
        let vac_enabled = reader.read_bool();
        let version = reader.read_string();

        // older servers stop right before the EDF
        let edf = if reader.is_eof() { 0 } else { reader.read_u8() };
        let has = |bit: u8| edf & bit != 0;

        // the order here is the wire order, not the bit order
        let port = has(SteamDetails::EDF_PORT).then(|| reader.read_u16());
        let steam_id_parts =
            has(SteamDetails::EDF_STEAM_ID).then(|| [reader.read_i32(), reader.read_i32()]);
        let source_tv = has(SteamDetails::EDF_SOURCE_TV).then(|| SourceTv {
            port: reader.read_u16(),
            name: reader.read_string(),
        });
        let keywords = has(SteamDetails::EDF_KEYWORDS).then(|| reader.read_string());
        let game_id_parts =
            has(SteamDetails::EDF_GAME_ID).then(|| [reader.read_i32(), reader.read_i32()]);

        ServerInfo {
            sender,
            protocol,
            hostname,
            map,
            folder,
            game,
            players,
            maxplayers,
            bots,
            server_type,
            server_env,
            visibility,
            vac_enabled,
            details: InfoDetails::Steam(SteamDetails {
                app_id,
                version,
                edf,
                port,
                steam_id_parts,
                source_tv,
                keywords,
                game_id_parts,
            }),
        }
    }

    fn parse_legacy(reader: &mut BufferReader, sender: SocketAddr) -> ServerInfo {
        let local_address = reader.read_string();
        let hostname = reader.read_string();
        let map = reader.read_string();
        let folder = reader.read_string();
        let game = reader.read_string();
        let players = reader.read_u8();
        let maxplayers = reader.read_u8();
        let protocol = reader.read_u8();
        let server_type = ServerType::from(reader.read_u8());
        let server_env = Environment::from(reader.read_u8());
        let visibility = Visibility::from(reader.read_u8());

        let mod_info = reader.read_bool().then(|| ModInfo {
            link: reader.read_string(),
            download_link: reader.read_string(),
            reserved: reader.read_u8(),
            version: reader.read_i32(),
            size: reader.read_i32(),
            mod_type: ModType::from(reader.read_u8()),
            dll_required: reader.read_bool(),
        });

        let vac_enabled = reader.read_bool();
        let bots = reader.read_u8();

        ServerInfo {
            sender,
            protocol,
            hostname,
            map,
            folder,
            game,
            players,
            maxplayers,
            bots,
            server_type,
            server_env,
            visibility,
            vac_enabled,
            details: InfoDetails::Legacy(LegacyDetails {
                local_address,
                mod_info,
            }),
        }
    }

    /// Game port the server listens on, falling back to the port the reply came from.
    pub fn game_port(&self) -> u16 {
        match &self.details {
            InfoDetails::Steam(steam) => steam.port.unwrap_or(self.sender.port()),
            InfoDetails::Legacy(_) => self.sender.port(),
        }
    }
}
