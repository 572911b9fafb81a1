pub mod hasher;
pub mod range;
mod defs;

use fallible_iterator::FallibleIterator;
use log::debug;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::str::from_utf8;

pub use hasher::CpioArchiveHasher;
pub use range::{DataRange, ReadSeek};

/// Error type for parsing cpio archives
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid data range: offset {offset} with size {size} out of bounds")]
    InvalidRange { offset: u64, size: u64 },

    #[error("unsupported cpio format signature")]
    UnsupportedFormat,

    #[error("unsupported file type at offset: 0x{offset:08x}")]
    UnsupportedSegment { offset: u64 },

    #[error("short read at offset 0x{offset:08x}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("malformed '{field}' field in file entry at offset 0x{offset:08x}")]
    MalformedHeader { field: &'static str, offset: u64 },

    #[error("invalid or unsupported posix file mode: {0}")]
    FileMode(String),
}

/// The four on-disk cpio header encodings (newc and crc share a layout).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpioFormat {
    BinBigEndian,
    BinLittleEndian,
    Odc,
    Newc,
    Crc,
}

impl CpioFormat {
    pub(crate) fn from_signature(signature: &[u8]) -> Option<Self> {
        // Two bytes are enough for the binary variants, the ASCII variants
        // need the full six byte magic.
        if signature.len() <= 2 {
            return None;
        }

        if signature.starts_with(defs::BIN_BIG_ENDIAN_MAGIC) {
            Some(CpioFormat::BinBigEndian)
        } else if signature.starts_with(defs::BIN_LITTLE_ENDIAN_MAGIC) {
            Some(CpioFormat::BinLittleEndian)
        } else if signature.starts_with(defs::ODC_MAGIC) {
            Some(CpioFormat::Odc)
        } else if signature.starts_with(defs::NEWC_MAGIC) {
            Some(CpioFormat::Newc)
        } else if signature.starts_with(defs::CRC_MAGIC) {
            Some(CpioFormat::Crc)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CpioFormat::BinBigEndian => "bin-big-endian",
            CpioFormat::BinLittleEndian => "bin-little-endian",
            CpioFormat::Odc => "odc",
            CpioFormat::Newc => "newc",
            CpioFormat::Crc => "crc",
        }
    }

    fn header_len(&self) -> usize {
        match self {
            CpioFormat::BinBigEndian | CpioFormat::BinLittleEndian => defs::BIN_HEADER_LEN,
            CpioFormat::Odc => defs::ODC_HEADER_LEN,
            CpioFormat::Newc | CpioFormat::Crc => defs::NEWC_HEADER_LEN,
        }
    }

    /// Alignment of the start of file data after the path string.
    fn name_alignment(&self) -> u64 {
        match self {
            CpioFormat::BinBigEndian | CpioFormat::BinLittleEndian => 2,
            CpioFormat::Odc => 1,
            CpioFormat::Newc | CpioFormat::Crc => 4,
        }
    }

    /// Alignment of the end of file data. Only the new ASCII variants pad
    /// after the file contents.
    fn data_alignment(&self) -> u64 {
        match self {
            CpioFormat::Newc | CpioFormat::Crc => 4,
            _ => 1,
        }
    }
}

impl std::fmt::Display for CpioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Convert the file permissions portion of a file mode to a representative string
fn mode_perm_to_str(mode: u64, shift: usize) -> String {
    let mode = (mode >> shift) & 0o7;
    let mut perm_string = String::new();

    if mode & defs::MODE_R != 0 {
        perm_string.push('r');
    } else {
        perm_string.push('-');
    }

    if mode & defs::MODE_W != 0 {
        perm_string.push('w');
    } else {
        perm_string.push('-');
    }

    if mode & defs::MODE_X != 0 {
        perm_string.push('x');
    } else {
        perm_string.push('-');
    }

    perm_string
}

/// Convert the octal representation of a file mode to a representative string
fn mode_to_str(mode: u64) -> Result<String, Error> {
    let mut mode_str = String::new();

    match mode & defs::S_IFMT {
        defs::S_IFSOCK => mode_str.push('s'),
        defs::S_IFLNK  => mode_str.push('l'),
        defs::S_IFREG  => mode_str.push('-'),
        defs::S_IFBLK  => mode_str.push('b'),
        defs::S_IFDIR  => mode_str.push('d'),
        defs::S_IFCHR  => mode_str.push('c'),
        defs::S_IFIFO  => mode_str.push('p'),
        _ => {
            return Err(Error::FileMode(format!("{mode:o}")))
        }
    }

    mode_str.push_str(&mode_perm_to_str(mode, 6));
    mode_str.push_str(&mode_perm_to_str(mode, 3));
    mode_str.push_str(&mode_perm_to_str(mode, 0));

    Ok(mode_str)
}

/// One file record inside a cpio archive.
///
/// Offsets are absolute positions in the parent stream; `size` is the total
/// on-disk record size (header + path + padding + data + trailing padding).
#[derive(Clone, Debug)]
pub struct CpioEntry {
    pub path: String,
    pub data_offset: u64,
    pub data_size: u64,
    pub size: u64,
    pub inode_number: u64,
    pub mode: u64,
    pub user_identifier: u64,
    pub group_identifier: u64,
    pub modification_time: u64,
}

impl CpioEntry {
    pub fn mode_str(&self) -> Result<String, Error> {
        mode_to_str(self.mode)
    }
}

/// Normalized header fields shared by all four encodings.
struct RawHeader {
    inode_number: u64,
    mode: u64,
    user_identifier: u64,
    group_identifier: u64,
    modification_time: u64,
    path_string_size: u64,
    file_size: u64,
}

fn parse_binary_header(data: &[u8], big_endian: bool) -> RawHeader {
    let field = |index: usize| -> u64 {
        let bytes = [data[2 * index], data[2 * index + 1]];
        let value = if big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        };
        value as u64
    };

    // Field order: signature, device_number, inode_number, mode,
    // user_identifier, group_identifier, number_of_links,
    // special_device_number, modification_time (upper, lower),
    // path_string_size, file_size (upper, lower).
    RawHeader {
        inode_number: field(2),
        mode: field(3),
        user_identifier: field(4),
        group_identifier: field(5),
        modification_time: (field(8) << 16) | field(9),
        path_string_size: field(10),
        file_size: (field(11) << 16) | field(12),
    }
}

fn parse_ascii_field(
    data: &[u8],
    radix: u32,
    field: &'static str,
    offset: u64,
) -> Result<u64, Error> {
    let text = from_utf8(data).map_err(|_| Error::MalformedHeader { field, offset })?;
    u64::from_str_radix(text, radix).map_err(|_| Error::MalformedHeader { field, offset })
}

fn parse_odc_header(data: &[u8], offset: u64) -> Result<RawHeader, Error> {
    // Fixed-width octal digit strings: magic(6), device_number(6),
    // inode_number(6), mode(6), user_identifier(6), group_identifier(6),
    // number_of_links(6), special_device_number(6), modification_time(11),
    // path_string_size(6), file_size(11).
    Ok(RawHeader {
        inode_number: parse_ascii_field(&data[12..18], 8, "inode_number", offset)?,
        mode: parse_ascii_field(&data[18..24], 8, "mode", offset)?,
        user_identifier: parse_ascii_field(&data[24..30], 8, "user_identifier", offset)?,
        group_identifier: parse_ascii_field(&data[30..36], 8, "group_identifier", offset)?,
        modification_time: parse_ascii_field(&data[48..59], 8, "modification_time", offset)?,
        path_string_size: parse_ascii_field(&data[59..65], 8, "path_string_size", offset)?,
        file_size: parse_ascii_field(&data[65..76], 8, "file_size", offset)?,
    })
}

fn parse_newc_header(data: &[u8], offset: u64) -> Result<RawHeader, Error> {
    // Fixed-width hexadecimal digit strings: magic(6) followed by thirteen
    // eight character fields: inode_number, mode, user_identifier,
    // group_identifier, number_of_links, modification_time, file_size,
    // device major/minor, special device major/minor, path_string_size,
    // checksum.
    Ok(RawHeader {
        inode_number: parse_ascii_field(&data[6..14], 16, "inode_number", offset)?,
        mode: parse_ascii_field(&data[14..22], 16, "mode", offset)?,
        user_identifier: parse_ascii_field(&data[22..30], 16, "user_identifier", offset)?,
        group_identifier: parse_ascii_field(&data[30..38], 16, "group_identifier", offset)?,
        modification_time: parse_ascii_field(&data[46..54], 16, "modification_time", offset)?,
        file_size: parse_ascii_field(&data[54..62], 16, "file_size", offset)?,
        path_string_size: parse_ascii_field(&data[94..102], 16, "path_string_size", offset)?,
    })
}

/// Number of padding bytes needed to round `offset` up to `alignment`.
pub(crate) fn align_padding(offset: u64, alignment: u64) -> u64 {
    let remainder = offset % alignment;
    if remainder == 0 {
        0
    } else {
        alignment - remainder
    }
}

/// Reads until the buffer is full or the stream ends, returning the number
/// of bytes read.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

fn read_exact_or_short<R: Read>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<(), Error> {
    let filled = read_up_to(reader, buf)?;
    if filled < buf.len() {
        return Err(Error::ShortRead {
            offset,
            expected: buf.len() as u64,
            actual: filled as u64,
        });
    }
    Ok(())
}

/// Decodes one file entry record starting at `file_offset` (relative to the
/// archive origin at `stream_start`).
fn read_file_entry<R: Read + Seek>(
    file: &mut R,
    format: CpioFormat,
    stream_start: u64,
    stream_size: u64,
    file_offset: u64,
) -> Result<CpioEntry, Error> {
    debug!("reading file entry at offset: 0x{file_offset:08x}");

    file.seek(SeekFrom::Start(stream_start + file_offset))?;

    let header_len = format.header_len();
    let mut header_data = vec![0u8; header_len];
    read_exact_or_short(file, &mut header_data, file_offset)?;

    let header = match format {
        CpioFormat::BinBigEndian => parse_binary_header(&header_data, true),
        CpioFormat::BinLittleEndian => parse_binary_header(&header_data, false),
        CpioFormat::Odc => parse_odc_header(&header_data, file_offset)?,
        CpioFormat::Newc | CpioFormat::Crc => parse_newc_header(&header_data, file_offset)?,
    };

    let mut offset = file_offset + header_len as u64;

    if stream_size != 0 && offset + header.path_string_size > stream_size {
        return Err(Error::ShortRead {
            offset,
            expected: header.path_string_size,
            actual: stream_size.saturating_sub(offset),
        });
    }

    let mut path_data = vec![0u8; header.path_string_size as usize];
    read_exact_or_short(file, &mut path_data, offset)?;
    offset += header.path_string_size;

    // The path field is null padded to alignment, not necessarily null
    // terminated exactly at the logical path end.
    let path_text = from_utf8(&path_data).map_err(|_| Error::MalformedHeader {
        field: "path",
        offset: file_offset,
    })?;
    let path = match path_text.find('\0') {
        Some(index) => &path_text[..index],
        None => path_text,
    }
    .to_string();

    let padding = align_padding(offset, format.name_alignment());
    offset += padding;

    let data_offset = stream_start + offset;
    let data_end = offset + header.file_size;

    if stream_size != 0 && data_end > stream_size {
        return Err(Error::ShortRead {
            offset,
            expected: header.file_size,
            actual: stream_size.saturating_sub(offset),
        });
    }

    let mut size =
        header_len as u64 + header.path_string_size + padding + header.file_size;
    size += align_padding(data_end, format.data_alignment());

    Ok(CpioEntry {
        path,
        data_offset,
        data_size: header.file_size,
        size,
        inode_number: header.inode_number,
        mode: header.mode,
        user_identifier: header.user_identifier,
        group_identifier: header.group_identifier,
        modification_time: header.modification_time,
    })
}

/// Sequential scanner over an archive stream, one decoded entry at a time.
///
/// Terminates on the `TRAILER!!!` sentinel (its record size is still added
/// to `offset`) or, when the stream length is known, at end of stream.
struct EntryScanner<'a, R> {
    file: &'a mut R,
    format: CpioFormat,
    stream_start: u64,
    stream_size: u64,
    offset: u64,
    done: bool,
}

impl<'a, R: Read + Seek> FallibleIterator for EntryScanner<'a, R> {
    type Item = CpioEntry;
    type Error = Error;

    fn next(&mut self) -> Result<Option<CpioEntry>, Error> {
        if self.done {
            return Ok(None);
        }

        if self.stream_size != 0 && self.offset >= self.stream_size {
            self.done = true;
            return Ok(None);
        }

        let entry = read_file_entry(
            self.file,
            self.format,
            self.stream_start,
            self.stream_size,
            self.offset,
        )?;
        self.offset += entry.size;

        if entry.path == defs::TRAILER_PATH {
            self.done = true;
            return Ok(None);
        }

        Ok(Some(entry))
    }
}

/// An open cpio archive with its entry catalog.
///
/// Entries are discovered by one full sequential scan at open time; cpio
/// has no central directory, so this is the only way to find them.
pub struct CpioArchive<R> {
    file: R,
    stream_start: u64,
    stream_size: u64,
    format: CpioFormat,
    size: u64,
    entries: Vec<CpioEntry>,
    index: HashMap<String, usize>,
}

impl CpioArchive<File> {
    /// Opens a cpio archive file, taking ownership of the underlying file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> CpioArchive<R> {
    /// Opens a cpio archive from an already positioned stream. The stream
    /// position at call time becomes the archive origin, and the caller is
    /// responsible for the stream's lifetime.
    pub fn from_reader(mut file: R) -> Result<Self, Error> {
        let stream_start = file.stream_position()?;
        let stream_end = file.seek(SeekFrom::End(0))?;
        let stream_size = stream_end.saturating_sub(stream_start);

        file.seek(SeekFrom::Start(stream_start))?;
        let mut signature = [0u8; defs::SIGNATURE_LEN];
        let read = read_up_to(&mut file, &mut signature)?;

        let format =
            CpioFormat::from_signature(&signature[..read]).ok_or(Error::UnsupportedFormat)?;
        debug!("detected {format} archive at offset: 0x{stream_start:08x}");

        let mut archive = CpioArchive {
            file,
            stream_start,
            stream_size,
            format,
            size: 0,
            entries: Vec::new(),
            index: HashMap::new(),
        };
        archive.read_file_entries()?;
        Ok(archive)
    }

    fn read_file_entries(&mut self) -> Result<(), Error> {
        let mut scanner = EntryScanner {
            file: &mut self.file,
            format: self.format,
            stream_start: self.stream_start,
            stream_size: self.stream_size,
            offset: 0,
            done: false,
        };

        while let Some(entry) = scanner.next()? {
            // First occurrence wins; some archives carry intentionally
            // duplicated padding entries.
            if self.index.contains_key(&entry.path) {
                continue;
            }
            self.index.insert(entry.path.clone(), self.entries.len());
            self.entries.push(entry);
        }

        self.size = scanner.offset;
        Ok(())
    }

    /// The detected header encoding.
    pub fn format(&self) -> CpioFormat {
        self.format
    }

    /// Total archive size in bytes, up to and including the sentinel record.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file_entry_exists_by_path(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn file_entry_by_path(&self, path: &str) -> Option<&CpioEntry> {
        self.index.get(path).map(|&index| &self.entries[index])
    }

    /// Iterates the entries whose path starts with `path_prefix`, in
    /// first-seen order.
    pub fn file_entries<'s>(
        &'s self,
        path_prefix: &'s str,
    ) -> impl Iterator<Item = &'s CpioEntry> + 's {
        self.entries
            .iter()
            .filter(move |entry| entry.path.starts_with(path_prefix))
    }

    /// A bounded reader over one entry's content region.
    pub fn entry_reader(&mut self, entry: &CpioEntry) -> CpioEntryReader<'_, R> {
        CpioEntryReader {
            file: &mut self.file,
            data_offset: entry.data_offset,
            data_size: entry.data_size,
            current_offset: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.file
    }
}

/// Read/seek access scoped to one entry's content, with the same absolute
/// seek before read discipline as [`DataRange`].
pub struct CpioEntryReader<'a, R> {
    file: &'a mut R,
    data_offset: u64,
    data_size: u64,
    current_offset: u64,
}

impl<'a, R: Read + Seek> Read for CpioEntryReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current_offset >= self.data_size {
            return Ok(0);
        }

        let remaining = self.data_size - self.current_offset;
        let len = (buf.len() as u64).min(remaining) as usize;

        self.file
            .seek(SeekFrom::Start(self.data_offset + self.current_offset))?;

        let read = self.file.read(&mut buf[..len])?;
        self.current_offset += read as u64;
        Ok(read)
    }
}

impl<'a, R: Read + Seek> Seek for CpioEntryReader<'a, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let offset = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(rel) => self.current_offset as i128 + rel as i128,
            SeekFrom::End(rel) => self.data_size as i128 + rel as i128,
        };

        if offset < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            ));
        }

        self.current_offset = offset as u64;
        Ok(self.current_offset)
    }
}
