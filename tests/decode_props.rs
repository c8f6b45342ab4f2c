//! Property tests for the reader and the reply decoders.

use std::net::SocketAddr;

use byteorder::{ByteOrder, LittleEndian};
use proptest::prelude::*;

use sourcequery::error::SourceQueryError;
use sourcequery::info::{InfoDetails, ServerInfo, SteamDetails};
use sourcequery::player::PlayerList;
use sourcequery::reader::BufferReader;

fn sender() -> SocketAddr {
    "203.0.113.9:27015".parse().unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Op {
    U8,
    I16,
    I32,
    F32,
    Str,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::U8),
        Just(Op::I16),
        Just(Op::I32),
        Just(Op::F32),
        Just(Op::Str),
    ]
}

fn steam_prefix() -> Vec<u8> {
    let mut data = b"\xff\xff\xff\xffI\x11name\0map\0folder\0game\0".to_vec();
    data.extend_from_slice(&[0xb8, 0x01, 1, 2, 3, b'd', b'l', 0, 0]);
    data.extend_from_slice(b"1.0\0");
    data
}

fn player_reply() -> Vec<u8> {
    let mut data = b"\xff\xff\xff\xffD\x03".to_vec();
    for (i, name) in ["one", "two", "three"].iter().enumerate() {
        data.push(i as u8);
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        data.extend_from_slice(&(i as i32).to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());
    }
    data
}

proptest! {
    // Reads match the bytes while they last, then yield sentinels forever.
    #[test]
    fn prop_reader_never_overruns(
        data in prop::collection::vec(any::<u8>(), 0..48),
        ops in prop::collection::vec(op(), 0..24),
    ) {
        let mut reader = BufferReader::new(&data);
        let mut pos = 0usize;
        let mut bad = false;

        for op in ops {
            let width = match op {
                Op::U8 => 1,
                Op::I16 => 2,
                Op::I32 | Op::F32 => 4,
                Op::Str => 0,
            };
            let fits = !bad && pos + width <= data.len();

            match op {
                Op::U8 => {
                    let expected = if fits { data[pos] } else { u8::MAX };
                    prop_assert_eq!(reader.read_u8(), expected);
                }
                Op::I16 => {
                    let expected = if fits { LittleEndian::read_i16(&data[pos..]) } else { -1 };
                    prop_assert_eq!(reader.read_i16(), expected);
                }
                Op::I32 => {
                    let expected = if fits { LittleEndian::read_i32(&data[pos..]) } else { -1 };
                    prop_assert_eq!(reader.read_i32(), expected);
                }
                Op::F32 => {
                    let value = reader.read_f32();
                    if fits {
                        let expected = LittleEndian::read_f32(&data[pos..]);
                        prop_assert_eq!(value.to_bits(), expected.to_bits());
                    } else {
                        prop_assert_eq!(value, -1.0);
                    }
                }
                Op::Str => {
                    let value = reader.read_string();
                    if bad {
                        prop_assert_eq!(value, "");
                    } else {
                        match data[pos..].iter().position(|&c| c == 0) {
                            Some(nul) => pos += nul + 1,
                            None => {
                                pos = data.len();
                                bad = true;
                            }
                        }
                    }
                    prop_assert_eq!(reader.position(), pos);
                    prop_assert_eq!(reader.is_bad(), bad);
                    continue;
                }
            }

            if fits {
                pos += width;
            } else {
                bad = true;
            }
            prop_assert_eq!(reader.position(), pos);
            prop_assert_eq!(reader.is_bad(), bad);
            prop_assert!(reader.position() <= data.len());
        }
    }

    // A header other than -1 is rejected no matter what follows it.
    #[test]
    fn prop_bad_header_always_rejected(
        header in any::<i32>().prop_filter("not the single header", |h| *h != -1),
        tag in any::<u8>(),
        tail in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut data = header.to_le_bytes().to_vec();
        data.push(tag);
        data.extend_from_slice(&tail);

        prop_assert!(matches!(
            ServerInfo::parse(&data, sender()),
            Err(SourceQueryError::BadHeader(h)) if h == header
        ));
        prop_assert!(matches!(
            PlayerList::parse(&data, sender()),
            Err(SourceQueryError::BadHeader(h)) if h == header
        ));
    }

    // Decoding garbage after a valid header never panics.
    #[test]
    fn prop_decoders_tolerate_garbage(
        tag in prop_oneof![Just(b'I'), Just(b'm'), Just(b'A'), Just(b'D'), any::<u8>()],
        tail in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut data = b"\xff\xff\xff\xff".to_vec();
        data.push(tag);
        data.extend_from_slice(&tail);

        let _ = ServerInfo::parse(&data, sender());
        let _ = PlayerList::parse(&data, sender());
    }

    // Only a reply cut right before the EDF survives truncation.
    #[test]
    fn prop_truncated_info_reply(cut in 0usize..64) {
        let complete = steam_prefix().len();
        let mut full = steam_prefix();
        full.push(SteamDetails::EDF_PORT);
        full.extend_from_slice(&27015u16.to_le_bytes());
        let cut = cut.min(full.len() - 1);

        match ServerInfo::parse(&full[..cut], sender()) {
            Ok(info) => {
                prop_assert_eq!(cut, complete);
                prop_assert_eq!(info.hostname, "name");
            }
            Err(e) => {
                prop_assert_ne!(cut, complete);
                prop_assert!(e.is_decode_error());
            }
        }
    }

    // Every prefix of a player reply yields a prefix of its records.
    #[test]
    fn prop_truncated_player_reply(cut in 0usize..64) {
        let full = player_reply();
        let cut = cut.min(full.len());
        let expected = PlayerList::parse(&full, sender()).unwrap();
        let expected = expected.players().unwrap();

        match PlayerList::parse(&full[..cut], sender()) {
            Ok(list) => {
                let got = list.players().unwrap();
                prop_assert!(got.len() <= expected.len());
                prop_assert_eq!(got, &expected[..got.len()]);
            }
            Err(e) => prop_assert!(e.is_decode_error()),
        }
    }
}

#[test]
fn player_reply_consumes_every_record() {
    let list = PlayerList::parse(&player_reply(), sender()).unwrap();
    let names: Vec<&str> = list.players().unwrap().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["one", "two", "three"]);
}

#[test]
fn every_edf_subset_populates_only_its_fields() {
    let bits = [
        SteamDetails::EDF_PORT,
        SteamDetails::EDF_STEAM_ID,
        SteamDetails::EDF_SOURCE_TV,
        SteamDetails::EDF_KEYWORDS,
        SteamDetails::EDF_GAME_ID,
    ];

    for subset in 0u8..32 {
        let edf = bits
            .iter()
            .enumerate()
            .filter(|(i, _)| subset & (1 << i) != 0)
            .fold(0u8, |acc, (_, bit)| acc | bit);

        let mut data = steam_prefix();
        data.push(edf);
        if edf & SteamDetails::EDF_PORT != 0 {
            data.extend_from_slice(&27015u16.to_le_bytes());
        }
        if edf & SteamDetails::EDF_STEAM_ID != 0 {
            data.extend_from_slice(&7i32.to_le_bytes());
            data.extend_from_slice(&8i32.to_le_bytes());
        }
        if edf & SteamDetails::EDF_SOURCE_TV != 0 {
            data.extend_from_slice(&27020u16.to_le_bytes());
            data.extend_from_slice(b"tv\0");
        }
        if edf & SteamDetails::EDF_KEYWORDS != 0 {
            data.extend_from_slice(b"tags\0");
        }
        if edf & SteamDetails::EDF_GAME_ID != 0 {
            data.extend_from_slice(&440i32.to_le_bytes());
            data.extend_from_slice(&0i32.to_le_bytes());
        }

        let info = ServerInfo::parse(&data, sender()).unwrap();
        let InfoDetails::Steam(steam) = info.details else {
            panic!("expected a steam reply");
        };

        assert_eq!(steam.edf, edf);
        assert_eq!(steam.port.is_some(), edf & SteamDetails::EDF_PORT != 0, "edf {edf:#04x}");
        assert_eq!(steam.steam_id_parts.is_some(), edf & SteamDetails::EDF_STEAM_ID != 0);
        assert_eq!(steam.source_tv.is_some(), edf & SteamDetails::EDF_SOURCE_TV != 0);
        assert_eq!(steam.keywords.is_some(), edf & SteamDetails::EDF_KEYWORDS != 0);
        assert_eq!(steam.game_id_parts.is_some(), edf & SteamDetails::EDF_GAME_ID != 0);

        // present fields decode correctly whatever precedes them
        if let Some(port) = steam.port {
            assert_eq!(port, 27015);
        }
        if let Some(parts) = steam.steam_id_parts {
            assert_eq!(parts, [7, 8]);
        }
        if let Some(tv) = &steam.source_tv {
            assert_eq!((tv.port, tv.name.as_str()), (27020, "tv"));
        }
        if let Some(keywords) = &steam.keywords {
            assert_eq!(keywords, "tags");
        }
        if let Some(parts) = steam.game_id_parts {
            assert_eq!(parts, [440, 0]);
        }
    }
}
