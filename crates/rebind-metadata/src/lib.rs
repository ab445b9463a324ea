//! Module introspection for rebind.
//!
//! The resolver needs two facts about every binary it touches: the identity
//! the module declares for itself, and the identities of the modules it was
//! compiled against. [`ModuleReader`] is the seam; [`PeModuleReader`] reads
//! both from the CLI metadata of a portable executable image.

mod pe;
mod tables;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::fmt::Write as _;
use std::path::Path;

use rebind_core::binary::ModuleIdentity;
use rebind_core::version::ModuleVersion;
use rebind_util::errors::{RebindError, RebindResult};
use sha1::{Digest, Sha1};

pub use pe::ImageError;

use pe::{heap_blob, heap_string, MetadataStreams, PeImage};
use tables::{AssemblyRow, TablesStream, ASSEMBLY_REF};

/// The reference row carries the full public key rather than its token.
const REF_HAS_PUBLIC_KEY: u32 = 0x0001;

/// Reads module identities from files on disk.
pub trait ModuleReader {
    /// The identity a module declares for itself.
    fn read_identity(&self, path: &Path) -> RebindResult<ModuleIdentity>;

    /// The modules a module was compiled against, in table order.
    fn read_references(&self, path: &Path) -> RebindResult<Vec<ModuleIdentity>>;
}

/// [`ModuleReader`] over portable executable images.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeModuleReader;

impl PeModuleReader {
    pub fn new() -> Self {
        Self
    }

    pub fn identity_from_bytes(data: &[u8]) -> Result<ModuleIdentity, ImageError> {
        let image = PeImage::parse(data)?;
        let streams = image.metadata()?;
        let tables = TablesStream::parse(streams.tables)?;
        let row = tables.manifest()?;
        let key = heap_blob(streams.blobs, row.key_blob)?;
        let token = (!key.is_empty()).then(|| public_key_token(key));
        identity(&streams, &row, token)
    }

    pub fn references_from_bytes(data: &[u8]) -> Result<Vec<ModuleIdentity>, ImageError> {
        let image = PeImage::parse(data)?;
        let streams = image.metadata()?;
        let tables = TablesStream::parse(streams.tables)?;
        tables
            .assembly_rows(ASSEMBLY_REF)?
            .iter()
            .map(|row| {
                let blob = heap_blob(streams.blobs, row.key_blob)?;
                let token = match (blob.is_empty(), row.flags & REF_HAS_PUBLIC_KEY != 0) {
                    (true, _) => None,
                    (false, true) => Some(public_key_token(blob)),
                    (false, false) => Some(to_hex(blob)),
                };
                identity(&streams, row, token)
            })
            .collect()
    }
}

impl ModuleReader for PeModuleReader {
    fn read_identity(&self, path: &Path) -> RebindResult<ModuleIdentity> {
        let data = load(path)?;
        Self::identity_from_bytes(&data).map_err(|e| invalid(path, e))
    }

    fn read_references(&self, path: &Path) -> RebindResult<Vec<ModuleIdentity>> {
        let data = load(path)?;
        let refs = Self::references_from_bytes(&data).map_err(|e| invalid(path, e))?;
        tracing::trace!("{} references {} modules", path.display(), refs.len());
        Ok(refs)
    }
}

fn identity(
    streams: &MetadataStreams<'_>,
    row: &AssemblyRow,
    public_key_token: Option<String>,
) -> Result<ModuleIdentity, ImageError> {
    let [major, minor, build, revision] = row.version;
    let culture = heap_string(streams.strings, row.culture)?;
    Ok(ModuleIdentity {
        name: heap_string(streams.strings, row.name)?,
        version: ModuleVersion::new(major, minor, build, revision),
        culture: (!culture.is_empty()).then_some(culture),
        public_key_token,
    })
}

fn load(path: &Path) -> RebindResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        RebindError::Metadata {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn invalid(path: &Path, e: ImageError) -> miette::Report {
    RebindError::Metadata {
        path: path.display().to_string(),
        message: e.to_string(),
    }
    .into()
}

/// The eight-byte token of a public key: the last eight bytes of its SHA-1
/// hash in reverse order, as lower-case hex.
pub fn public_key_token(public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(public_key);
    let hash = hasher.finalize();
    let token: Vec<u8> = hash.iter().rev().take(8).copied().collect();
    to_hex(&token)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
