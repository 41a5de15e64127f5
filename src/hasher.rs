use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read buffer for streamed hashing (64KB)
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Produces a fixed-length hex digest from file content.
///
/// Two call shapes are required: one for an open stream, so large files are
/// never held in memory, and one for a buffer the caller already has.
/// Both must return the same digest for the same bytes.
pub trait ContentHasher: Send + Sync {
    /// Hash everything the reader yields. A read error yields `Err`, never a
    /// digest of the bytes seen so far.
    fn hash_reader(&self, reader: &mut dyn Read) -> io::Result<String>;

    /// Hash an in-memory buffer.
    fn hash_bytes(&self, bytes: &[u8]) -> String;
}

/// Blake3, hex encoded (64 characters)
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn hash_reader(&self, reader: &mut dyn Read) -> io::Result<String> {
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
        let mut hasher = blake3::Hasher::new();

        // Read in chunks
        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    fn hash_bytes(&self, bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }
}

/// How a file was hashed, decided by its size against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Read fully into memory, then hash the buffer
    Buffered,
    /// Hash straight from disk
    Streamed,
}

impl Strategy {
    pub fn for_size(size: u64, small_file_threshold: u64) -> Self {
        if size < small_file_threshold {
            Strategy::Buffered
        } else {
            Strategy::Streamed
        }
    }
}

/// Hash a file's full contents, choosing buffered or streamed reading by size.
///
/// `size` is the size observed when the file was discovered. Files below
/// `small_file_threshold` are read into memory; everything else is streamed.
/// The in-memory read never holds more than `small_file_threshold` bytes, even
/// if the file grew after discovery.
pub fn hash_file<H: ContentHasher + ?Sized>(
    hasher: &H,
    path: &Path,
    size: u64,
    small_file_threshold: u64,
) -> io::Result<String> {
    match Strategy::for_size(size, small_file_threshold) {
        Strategy::Buffered => {
            let mut limited = File::open(path)?.take(small_file_threshold);
            let mut content = Vec::with_capacity(size as usize);
            limited.read_to_end(&mut content)?;
            if (content.len() as u64) < small_file_threshold {
                return Ok(hasher.hash_bytes(&content));
            }

            // Grew past the threshold since discovery: stream the rest
            let rest = BufReader::with_capacity(STREAM_BUFFER_SIZE, limited.into_inner());
            hasher.hash_reader(&mut io::Cursor::new(content).chain(rest))
        }
        Strategy::Streamed => {
            let file = File::open(path)?;
            let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file);
            hasher.hash_reader(&mut reader)
        }
    }
}
