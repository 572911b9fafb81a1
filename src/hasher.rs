use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use xz2::read::XzDecoder;

use crate::range::{DataRange, ReadSeek};
use crate::{align_padding, defs, read_up_to, CpioArchive, CpioEntry, CpioFormat, Error};

/// Container type of one segment within a concatenated archive file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SegmentType {
    Cpio,
    Gzip,
    Bzip2,
    Xz,
}

impl SegmentType {
    fn from_signature(signature: &[u8]) -> Option<Self> {
        if signature.len() <= 2 {
            return None;
        }

        if CpioFormat::from_signature(signature).is_some() {
            Some(SegmentType::Cpio)
        } else if signature.starts_with(defs::GZIP_MAGIC) {
            Some(SegmentType::Gzip)
        } else if signature.starts_with(defs::BZIP2_MAGIC) {
            Some(SegmentType::Bzip2)
        } else if signature.starts_with(defs::XZ_MAGIC) {
            Some(SegmentType::Xz)
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SegmentType::Cpio => "cpio",
            SegmentType::Gzip => "gzip",
            SegmentType::Bzip2 => "bzip2",
            SegmentType::Xz => "xz",
        }
    }
}

/// Hashes the file entries of a cpio archive file.
///
/// The file may be a bare cpio stream or a sequence of independently
/// compressed cpio segments concatenated with 16 byte alignment, the
/// layout used by initrd images. Each segment is treated as its own
/// archive with its own size accounting.
pub struct CpioArchiveHasher {
    path: PathBuf,
}

impl CpioArchiveHasher {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        CpioArchiveHasher {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Walks every segment in file order and writes one line per entry
    /// with non-empty content: the lowercase hex SHA-256 digest, a tab,
    /// and the entry path. Entries are hashed in ascending path order
    /// within a segment.
    ///
    /// Lines already written remain emitted when a later segment fails.
    pub fn hash_file_entries<W: Write>(&self, output: &mut W) -> Result<(), Error> {
        let mut file = File::open(&self.path)?;
        let file_size = file.metadata()?.len();

        let mut file_offset = 0u64;
        while file_offset < file_size {
            file.seek(SeekFrom::Start(file_offset))?;
            let mut signature = [0u8; defs::SIGNATURE_LEN];
            let read = read_up_to(&mut file, &mut signature)?;

            let segment_type = SegmentType::from_signature(&signature[..read])
                .ok_or(Error::UnsupportedSegment {
                    offset: file_offset,
                })?;
            debug!("{} segment at offset: 0x{file_offset:08x}", segment_type.name());

            let stream: Box<dyn ReadSeek + '_> = match segment_type {
                SegmentType::Cpio => {
                    file.seek(SeekFrom::Start(file_offset))?;
                    Box::new(&mut file)
                }
                SegmentType::Gzip | SegmentType::Bzip2 | SegmentType::Xz => {
                    let range =
                        DataRange::new(&mut file, file_offset, file_size - file_offset)?;

                    // The stream decoders are not seekable, so the segment
                    // is decompressed up front. Each decoder stops at its
                    // own stream end and never consumes the next segment.
                    let mut data = Vec::new();
                    match segment_type {
                        SegmentType::Gzip => GzDecoder::new(range).read_to_end(&mut data)?,
                        SegmentType::Bzip2 => BzDecoder::new(range).read_to_end(&mut data)?,
                        _ => XzDecoder::new(range).read_to_end(&mut data)?,
                    };
                    Box::new(Cursor::new(data))
                }
            };

            let mut archive = CpioArchive::from_reader(stream)?;
            let archive_size = archive.size();

            let mut entries: Vec<CpioEntry> = archive.file_entries("").cloned().collect();
            entries.sort_by(|a, b| a.path.cmp(&b.path));

            for entry in &entries {
                if entry.data_size == 0 {
                    continue;
                }

                let mut context = Sha256::new();
                let mut reader = archive.entry_reader(entry);
                let mut chunk = [0u8; defs::HASH_CHUNK_LEN];
                loop {
                    let read = reader.read(&mut chunk)?;
                    if read == 0 {
                        break;
                    }
                    context.update(&chunk[..read]);
                }

                writeln!(output, "{}\t{}", hex::encode(context.finalize()), entry.path)?;
            }

            file_offset += archive_size;
            file_offset += align_padding(file_offset, defs::SEGMENT_ALIGNMENT);
        }

        Ok(())
    }
}
