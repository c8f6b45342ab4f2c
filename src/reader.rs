use byteorder::{ByteOrder, LittleEndian};

/// Longest string [BufferReader::read_string] will copy out, terminator included.
pub const MAX_STRING_LEN: usize = 2048;

/// Bounds-checked little-endian cursor over a reply datagram.
///
/// Reads never panic. The first read that would run past the end of the
/// buffer marks the reader as bad, and from then on every read returns a
/// sentinel (`-1`, `u*::MAX`, `-1.0` or an empty string) without moving
/// the cursor. Callers decide whether a partial parse is acceptable by
/// checking [BufferReader::is_bad].
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    data: &'a [u8],
    offset: usize,
    bad: bool,
}

impl<'a> BufferReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BufferReader {
            data,
            offset: 0,
            bad: false,
        }
    }

    /// Has any read run past the end of the buffer?
    pub fn is_bad(&self) -> bool {
        self.bad
    }

    /// True once every byte has been consumed, or once the reader went bad.
    pub fn is_eof(&self) -> bool {
        self.bad || self.offset >= self.data.len()
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    /// Take the next `width` bytes, or flag the reader bad.
    fn take(&mut self, width: usize) -> Option<&'a [u8]> {
        if self.bad {
            return None;
        }
        match self.offset.checked_add(width) {
            Some(end) if end <= self.data.len() => {
                let bytes = &self.data[self.offset..end];
                self.offset = end;
                Some(bytes)
            }
            _ => {
                self.bad = true;
                None
            }
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        self.take(1).map_or(u8::MAX, |b| b[0])
    }

    pub fn read_u16(&mut self) -> u16 {
        self.take(2).map_or(u16::MAX, LittleEndian::read_u16)
    }

    pub fn read_i16(&mut self) -> i16 {
        self.take(2).map_or(-1, LittleEndian::read_i16)
    }

    pub fn read_i32(&mut self) -> i32 {
        self.take(4).map_or(-1, LittleEndian::read_i32)
    }

    pub fn read_f32(&mut self) -> f32 {
        self.take(4).map_or(-1.0, LittleEndian::read_f32)
    }

    /// Read a byte and treat anything non-zero as true.
    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Read a null-terminated string, copying at most `MAX_STRING_LEN - 1` bytes.
    ///
    /// Stops at the terminator (which is consumed) or at the end of the
    /// buffer. Running off the end without a terminator marks the reader
    /// bad, but the bytes collected so far are still returned. Invalid
    /// UTF-8 is replaced rather than rejected.
    pub fn read_string(&mut self) -> String {
        if self.bad {
            return String::new();
        }

        let rest = &self.data[self.offset..];
        let window = &rest[..rest.len().min(MAX_STRING_LEN - 1)];
        let (len, consumed) = match window.iter().position(|&c| c == 0) {
            Some(nul) => (nul, nul + 1),
            None => {
                if window.len() == rest.len() {
                    // unterminated, and nothing left to find a terminator in
                    self.bad = true;
                }
                (window.len(), window.len())
            }
        };

        let value = String::from_utf8_lossy(&window[..len]).into_owned();
        self.offset += consumed;
        value
    }
}
