//! Portable executable container: headers, sections, and the CLI metadata
//! root with its stream directory.

use thiserror::Error;

/// Reasons an image cannot be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("unexpected end of image at offset {0:#x}")]
    Truncated(usize),

    #[error("bad {0} signature")]
    BadSignature(&'static str),

    #[error("unknown optional header magic {0:#x}")]
    BadMagic(u16),

    #[error("not a managed module (no CLI header)")]
    NotManaged,

    #[error("RVA {0:#x} is not mapped by any section")]
    UnmappedRva(u32),

    #[error("missing metadata stream {0}")]
    MissingStream(&'static str),

    #[error("no assembly manifest")]
    MissingManifest,

    #[error("invalid {0} heap entry")]
    BadHeapEntry(&'static str),
}

pub(crate) type ImageResult<T> = Result<T, ImageError>;

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const METADATA_SIGNATURE: u32 = 0x424A_5342;
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const CLI_HEADER_DIRECTORY: usize = 14;
const SECTION_HEADER_SIZE: usize = 40;

pub(crate) fn u8_at(data: &[u8], offset: usize) -> ImageResult<u8> {
    data.get(offset).copied().ok_or(ImageError::Truncated(offset))
}

pub(crate) fn u16_at(data: &[u8], offset: usize) -> ImageResult<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(ImageError::Truncated(offset))
}

pub(crate) fn u32_at(data: &[u8], offset: usize) -> ImageResult<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ImageError::Truncated(offset))
}

pub(crate) fn u64_at(data: &[u8], offset: usize) -> ImageResult<u64> {
    let lo = u32_at(data, offset)? as u64;
    let hi = u32_at(data, offset + 4)? as u64;
    Ok(lo | (hi << 32))
}

pub(crate) fn slice_at(data: &[u8], offset: usize, len: usize) -> ImageResult<&[u8]> {
    data.get(offset..offset + len).ok_or(ImageError::Truncated(offset))
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_pointer: u32,
    raw_size: u32,
}

/// A named stream of the metadata root, as a slice of the image.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stream<'a> {
    pub name: &'a [u8],
    pub data: &'a [u8],
}

/// The metadata streams of a managed image.
#[derive(Debug)]
pub(crate) struct MetadataStreams<'a> {
    pub tables: &'a [u8],
    pub strings: &'a [u8],
    pub blobs: &'a [u8],
}

pub(crate) struct PeImage<'a> {
    data: &'a [u8],
    sections: Vec<Section>,
    cli_header_rva: u32,
}

impl<'a> PeImage<'a> {
    pub fn parse(data: &'a [u8]) -> ImageResult<Self> {
        if slice_at(data, 0, 2)? != DOS_MAGIC {
            return Err(ImageError::BadSignature("DOS"));
        }
        let pe_offset = u32_at(data, 0x3c)? as usize;
        if slice_at(data, pe_offset, 4)? != PE_SIGNATURE {
            return Err(ImageError::BadSignature("PE"));
        }

        let coff = pe_offset + 4;
        let section_count = u16_at(data, coff + 2)? as usize;
        let optional_size = u16_at(data, coff + 16)? as usize;
        let optional = coff + 20;

        let (count_offset, directories) = match u16_at(data, optional)? {
            PE32_MAGIC => (optional + 92, optional + 96),
            PE32_PLUS_MAGIC => (optional + 108, optional + 112),
            other => return Err(ImageError::BadMagic(other)),
        };
        let directory_count = u32_at(data, count_offset)? as usize;
        if directory_count <= CLI_HEADER_DIRECTORY {
            return Err(ImageError::NotManaged);
        }
        let cli_header_rva = u32_at(data, directories + CLI_HEADER_DIRECTORY * 8)?;
        if cli_header_rva == 0 {
            return Err(ImageError::NotManaged);
        }

        let table = optional + optional_size;
        let sections = (0..section_count)
            .map(|i| {
                let header = table + i * SECTION_HEADER_SIZE;
                Ok(Section {
                    virtual_size: u32_at(data, header + 8)?,
                    virtual_address: u32_at(data, header + 12)?,
                    raw_size: u32_at(data, header + 16)?,
                    raw_pointer: u32_at(data, header + 20)?,
                })
            })
            .collect::<ImageResult<Vec<_>>>()?;

        Ok(Self {
            data,
            sections,
            cli_header_rva,
        })
    }

    fn rva_to_offset(&self, rva: u32) -> ImageResult<usize> {
        self.sections
            .iter()
            .find(|s| {
                let extent = s.virtual_size.max(s.raw_size);
                rva >= s.virtual_address && rva - s.virtual_address < extent
            })
            .map(|s| (s.raw_pointer + (rva - s.virtual_address)) as usize)
            .ok_or(ImageError::UnmappedRva(rva))
    }

    /// Locate the metadata root through the CLI header and split it into
    /// its streams.
    pub fn metadata(&self) -> ImageResult<MetadataStreams<'a>> {
        let cli = self.rva_to_offset(self.cli_header_rva)?;
        let root_rva = u32_at(self.data, cli + 8)?;
        let root_size = u32_at(self.data, cli + 12)? as usize;
        let root_offset = self.rva_to_offset(root_rva)?;
        let root = slice_at(self.data, root_offset, root_size)?;

        let streams = read_stream_headers(root)?;
        let find = |name: &'static str| {
            streams
                .iter()
                .find(|s| s.name == name.as_bytes())
                .map(|s| s.data)
        };

        Ok(MetadataStreams {
            tables: find("#~")
                .or_else(|| find("#-"))
                .ok_or(ImageError::MissingStream("#~"))?,
            strings: find("#Strings").ok_or(ImageError::MissingStream("#Strings"))?,
            blobs: find("#Blob").unwrap_or(&[]),
        })
    }
}

fn read_stream_headers(root: &[u8]) -> ImageResult<Vec<Stream<'_>>> {
    if u32_at(root, 0)? != METADATA_SIGNATURE {
        return Err(ImageError::BadSignature("metadata"));
    }
    let version_len = u32_at(root, 12)? as usize;
    let mut cursor = 16 + version_len;
    let count = u16_at(root, cursor + 2)? as usize;
    cursor += 4;

    let mut streams = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = u32_at(root, cursor)? as usize;
        let size = u32_at(root, cursor + 4)? as usize;
        cursor += 8;

        let name_start = cursor;
        while u8_at(root, cursor)? != 0 {
            cursor += 1;
        }
        let name = &root[name_start..cursor];
        // name plus terminator, padded to four bytes
        cursor = name_start + ((cursor - name_start + 4) & !3);

        streams.push(Stream {
            name,
            data: slice_at(root, offset, size)?,
        });
    }
    Ok(streams)
}

/// Null-terminated UTF-8 string at `index` of the `#Strings` heap.
pub(crate) fn heap_string(strings: &[u8], index: usize) -> ImageResult<String> {
    let tail = strings
        .get(index..)
        .ok_or(ImageError::BadHeapEntry("#Strings"))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(ImageError::BadHeapEntry("#Strings"))?;
    String::from_utf8(tail[..end].to_vec()).map_err(|_| ImageError::BadHeapEntry("#Strings"))
}

/// Length-prefixed entry at `index` of the `#Blob` heap.
pub(crate) fn heap_blob(blobs: &[u8], index: usize) -> ImageResult<&[u8]> {
    if index == 0 {
        return Ok(&[]);
    }
    let bad = || ImageError::BadHeapEntry("#Blob");
    let first = *blobs.get(index).ok_or_else(bad)?;
    let (len, header) = if first & 0x80 == 0 {
        (first as usize, 1)
    } else if first & 0xc0 == 0x80 {
        let second = *blobs.get(index + 1).ok_or_else(bad)?;
        ((((first & 0x3f) as usize) << 8) | second as usize, 2)
    } else if first & 0xe0 == 0xc0 {
        let rest = blobs.get(index + 1..index + 4).ok_or_else(bad)?;
        (
            (((first & 0x1f) as usize) << 24)
                | ((rest[0] as usize) << 16)
                | ((rest[1] as usize) << 8)
                | rest[2] as usize,
            4,
        )
    } else {
        return Err(bad());
    };
    blobs.get(index + header..index + header + len).ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_length_encodings() {
        let mut heap = vec![0u8, 3, 1, 2, 3];
        assert_eq!(heap_blob(&heap, 1).unwrap(), &[1, 2, 3]);

        let start = heap.len();
        heap.extend([0x80, 0x81]);
        heap.extend(std::iter::repeat(7).take(0x81));
        assert_eq!(heap_blob(&heap, start).unwrap().len(), 0x81);

        assert_eq!(heap_blob(&heap, 0).unwrap(), &[] as &[u8]);
        assert!(heap_blob(&[0, 9, 1], 1).is_err());
    }

    #[test]
    fn strings_are_null_terminated() {
        let heap = b"\0Newtonsoft.Json\0neutral\0";
        assert_eq!(heap_string(heap, 1).unwrap(), "Newtonsoft.Json");
        assert_eq!(heap_string(heap, 17).unwrap(), "neutral");
        assert_eq!(heap_string(heap, 0).unwrap(), "");
        assert!(heap_string(b"\0abc", 1).is_err());
    }

    #[test]
    fn rejects_non_images() {
        assert_eq!(
            PeImage::parse(b"not an image").err(),
            Some(ImageError::BadSignature("DOS"))
        );
        assert!(matches!(
            PeImage::parse(b"MZ"),
            Err(ImageError::Truncated(_))
        ));
    }
}
