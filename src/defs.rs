pub(crate) const BIN_BIG_ENDIAN_MAGIC: &[u8]    = b"\x71\xc7";
pub(crate) const BIN_LITTLE_ENDIAN_MAGIC: &[u8] = b"\xc7\x71";
pub(crate) const ODC_MAGIC: &[u8]  = b"070707";
pub(crate) const NEWC_MAGIC: &[u8] = b"070701";
pub(crate) const CRC_MAGIC: &[u8]  = b"070702";

pub(crate) const GZIP_MAGIC: &[u8]  = b"\x1f\x8b";
pub(crate) const BZIP2_MAGIC: &[u8] = b"BZ";
pub(crate) const XZ_MAGIC: &[u8]    = b"\xfd7zXZ\x00";

pub(crate) const SIGNATURE_LEN: usize = 6;

/// Fixed header sizes per format
pub(crate) const BIN_HEADER_LEN: usize  = 26;
pub(crate) const ODC_HEADER_LEN: usize  = 76;
pub(crate) const NEWC_HEADER_LEN: usize = 110;

/// Path of the end-of-archive sentinel entry
pub(crate) const TRAILER_PATH: &str = "TRAILER!!!";

/// Alignment between concatenated initrd segments
pub(crate) const SEGMENT_ALIGNMENT: u64 = 16;

/// Chunk size used when hashing entry contents
pub(crate) const HASH_CHUNK_LEN: usize = 4096;

/// POSIX file mode constants
pub(crate) const S_IFMT   : u64 = 0o170000; // bit mask file type bit field
pub(crate) const S_IFSOCK : u64 = 0o140000; // socket
pub(crate) const S_IFLNK  : u64 = 0o120000; // symbolic link
pub(crate) const S_IFREG  : u64 = 0o100000; // regular file
pub(crate) const S_IFBLK  : u64 = 0o060000; // block device
pub(crate) const S_IFDIR  : u64 = 0o040000; // directory
pub(crate) const S_IFCHR  : u64 = 0o020000; // character device
pub(crate) const S_IFIFO  : u64 = 0o010000; // FIFO
pub(crate) const MODE_R: u64 = 0o04;
pub(crate) const MODE_W: u64 = 0o02;
pub(crate) const MODE_X: u64 = 0o01;
