//! Legacy multi-bundle container format.
//!
//! Older releases shipped several bundles in one file:
//!
//! ```text
//! 0x00        4      entry count N (i32 LE)
//! 0x04        4*N    entry lengths (i32 LE each, in order)
//! 0x04+4*N    ...    payloads, concatenated in the same order
//! ```
//!
//! The file must end exactly after the last payload.

use crate::error::{Error, Result};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of the count field in bytes.
pub const COUNT_SIZE: u64 = 4;

/// Size of one length field in bytes.
pub const LENGTH_SIZE: u64 = 4;

/// Parsed header of a legacy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Declared entry lengths, in order.
    pub lengths: Vec<u64>,
}

impl ContainerHeader {
    /// Size of the header in bytes.
    pub fn size(&self) -> u64 {
        COUNT_SIZE + LENGTH_SIZE * self.lengths.len() as u64
    }

    /// Byte offset of entry `index` from the start of the container.
    pub fn offset(&self, index: usize) -> u64 {
        self.size() + self.lengths[..index].iter().sum::<u64>()
    }

    /// Total container size implied by the header.
    pub fn total_size(&self) -> u64 {
        self.size() + self.lengths.iter().sum::<u64>()
    }

    /// Read and validate a header against the stream's total length.
    pub fn read<R: Read>(reader: &mut R, stream_len: u64) -> Result<Self> {
        if stream_len < COUNT_SIZE {
            return Err(Error::invalid_container(format!(
                "Container too short: {} bytes",
                stream_len
            )));
        }

        let count = read_i32(reader)?;
        if count < 0 {
            return Err(Error::invalid_container(format!(
                "Negative entry count: {}",
                count
            )));
        }
        let count = count as u64;

        // Reject counts the stream cannot hold before reading any lengths
        let header_size = COUNT_SIZE + LENGTH_SIZE * count;
        if header_size > stream_len {
            return Err(Error::invalid_container(format!(
                "Header for {} entries needs {} bytes, container has {}",
                count, header_size, stream_len
            )));
        }

        let mut lengths = Vec::with_capacity(count as usize);
        for index in 0..count {
            let len = read_i32(reader)?;
            if len < 0 {
                return Err(Error::invalid_container(format!(
                    "Negative length {} for entry {}",
                    len, index
                )));
            }
            lengths.push(len as u64);
        }

        let header = Self { lengths };
        if header.total_size() != stream_len {
            return Err(Error::invalid_container(format!(
                "Declared size {} does not match container size {}",
                header.total_size(),
                stream_len
            )));
        }
        Ok(header)
    }

    /// Encode the header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size() as usize);
        buf.extend_from_slice(&to_i32(self.lengths.len() as u64, "entry count")?.to_le_bytes());
        for &len in &self.lengths {
            buf.extend_from_slice(&to_i32(len, "entry length")?.to_le_bytes());
        }
        Ok(buf)
    }
}

/// Read every entry of a container.
pub fn unpack<R: Read + Seek>(mut reader: R) -> Result<Vec<Vec<u8>>> {
    let stream_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let header = ContainerHeader::read(&mut reader, stream_len)?;

    let mut entries = Vec::with_capacity(header.lengths.len());
    for (index, &len) in header.lengths.iter().enumerate() {
        reader.seek(SeekFrom::Start(header.offset(index)))?;
        let mut entry = vec![0u8; len as usize];
        reader.read_exact(&mut entry)?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Write `blobs` in container layout.
pub fn pack_into<W: Write, B: AsRef<[u8]>>(mut writer: W, blobs: &[B]) -> Result<()> {
    let header = ContainerHeader {
        lengths: blobs.iter().map(|b| b.as_ref().len() as u64).collect(),
    };
    writer.write_all(&header.encode()?)?;
    for blob in blobs {
        writer.write_all(blob.as_ref())?;
    }
    writer.flush()?;
    Ok(())
}

/// Encode `blobs` as a container in memory.
pub fn pack<B: AsRef<[u8]>>(blobs: &[B]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    pack_into(&mut buf, blobs)?;
    Ok(buf)
}

/// Extract a container file's entries into `out_dir` as `0`, `1`, ...
///
/// The container is fully validated before any entry is written.
pub fn unpack_file(source: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    if !source.is_file() {
        return Err(Error::file_not_found(source));
    }
    let mut file = fs::File::open(source)?;
    let stream_len = file.metadata()?.len();
    let header = ContainerHeader::read(&mut file, stream_len)?;

    fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(header.lengths.len());
    for (index, &len) in header.lengths.iter().enumerate() {
        file.seek(SeekFrom::Start(header.offset(index)))?;
        let path = out_dir.join(index.to_string());

        let mut temp_file = tempfile::NamedTempFile::new_in(out_dir)?;
        let copied = std::io::copy(&mut (&mut file).take(len), &mut temp_file)?;
        if copied != len {
            return Err(Error::invalid_container(format!(
                "Entry {} truncated: expected {} bytes, read {}",
                index, len, copied
            )));
        }
        temp_file.flush()?;
        temp_file.persist(&path)?;

        tracing::debug!(entry = index, len, path = %path.display(), "extracted entry");
        written.push(path);
    }

    tracing::info!(source = %source.display(), entries = written.len(), "container unpacked");
    Ok(written)
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn to_i32(value: u64, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::invalid_container(format!("{} {} exceeds i32::MAX", what, value)))
}
