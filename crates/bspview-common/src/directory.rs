// directory.rs — BSP header and lump descriptor table

use crate::bspfile::{
    LumpType, BSPVERSION_MAX, BSPVERSION_MIN, HEADER_LUMPS, HEADER_SIZE, IDBSPHEADER,
    LUMP_DESCRIPTOR_SIZE,
};
use crate::crc::crc_block;
use crate::error::{BspError, BspResult};
use crate::lumps::{read_i32_le, read_u32_le};

/// One entry of the header's lump table. The lump type is the entry's
/// position in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LumpDescriptor {
    pub index: usize,
    pub offset: usize,
    pub length: usize,
    pub version: i32,
    pub four_cc: [u8; 4],
}

impl LumpDescriptor {
    pub fn lump_type(&self) -> Option<LumpType> {
        LumpType::from_index(self.index)
    }

    /// A non-zero fourCC holds the uncompressed size of an LZMA lump.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.four_cc != [0; 4]
    }

    #[inline]
    pub fn uncompressed_size(&self) -> u32 {
        u32::from_le_bytes(self.four_cc)
    }
}

/// Validated header of a BSP file, borrowing the file bytes.
#[derive(Debug, Clone)]
pub struct LumpDirectory<'a> {
    data: &'a [u8],
    version: i32,
    revision: i32,
    lumps: Vec<LumpDescriptor>,
}

impl<'a> LumpDirectory<'a> {
    /// Parse and validate the header. Every failure here is a corrupt file.
    pub fn open(data: &'a [u8]) -> BspResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(BspError::TooShort {
                size: data.len(),
                needed: HEADER_SIZE,
            });
        }

        let ident = read_i32_le(data, 0);
        if ident != IDBSPHEADER {
            let mut found = [0u8; 4];
            found.copy_from_slice(&data[0..4]);
            return Err(BspError::BadMagic { found });
        }

        let version = read_i32_le(data, 4);
        if !(BSPVERSION_MIN..=BSPVERSION_MAX).contains(&version) {
            return Err(BspError::UnsupportedVersion {
                found: version,
                min: BSPVERSION_MIN,
                max: BSPVERSION_MAX,
            });
        }

        let mut lumps = Vec::with_capacity(HEADER_LUMPS);
        for index in 0..HEADER_LUMPS {
            let base = 8 + index * LUMP_DESCRIPTOR_SIZE;
            let fileofs = read_i32_le(data, base);
            let filelen = read_i32_le(data, base + 4);
            let lump_version = read_i32_le(data, base + 8);
            let four_cc = read_u32_le(data, base + 12).to_le_bytes();

            let end = fileofs as i64 + filelen as i64;
            if fileofs < 0 || filelen < 0 || end > data.len() as i64 {
                return Err(BspError::LumpOutOfBounds {
                    index,
                    offset: fileofs as i64,
                    length: filelen as i64,
                    file_size: data.len(),
                });
            }

            lumps.push(LumpDescriptor {
                index,
                offset: fileofs as usize,
                length: filelen as usize,
                version: lump_version,
                four_cc,
            });
        }

        let revision = read_i32_le(data, 8 + HEADER_LUMPS * LUMP_DESCRIPTOR_SIZE);

        Ok(Self {
            data,
            version,
            revision,
            lumps,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn revision(&self) -> i32 {
        self.revision
    }

    pub fn file_size(&self) -> usize {
        self.data.len()
    }

    pub fn descriptors(&self) -> &[LumpDescriptor] {
        &self.lumps
    }

    pub fn descriptor(&self, lump: LumpType) -> &LumpDescriptor {
        &self.lumps[lump.index()]
    }

    /// The lump's byte range. Bounds were validated in `open`.
    pub fn raw_bytes(&self, lump: LumpType) -> &'a [u8] {
        let d = &self.lumps[lump.index()];
        &self.data[d.offset..d.offset + d.length]
    }

    /// CRC-32 of the whole file.
    pub fn checksum(&self) -> u32 {
        crc_block(self.data)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bspwrite::BspWriter;

    #[test]
    fn open_minimal_file() {
        let data = BspWriter::new().finish();
        let dir = LumpDirectory::open(&data).expect("valid header");
        assert_eq!(dir.version(), 20);
        assert_eq!(dir.file_size(), data.len());
        assert_eq!(dir.descriptors().len(), HEADER_LUMPS);
        assert!(dir.raw_bytes(LumpType::Vertices).is_empty());
    }

    #[test]
    fn raw_bytes_returns_lump_range() {
        let mut w = BspWriter::new();
        w.set_lump(LumpType::Entities, 0, b"{ \"classname\" \"worldspawn\" }".to_vec());
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        assert_eq!(dir.raw_bytes(LumpType::Entities), b"{ \"classname\" \"worldspawn\" }");
        let d = dir.descriptor(LumpType::Entities);
        assert!(d.offset + d.length <= dir.file_size());
        assert_eq!(d.lump_type(), Some(LumpType::Entities));
    }

    #[test]
    fn every_descriptor_within_file() {
        let mut w = BspWriter::new();
        w.set_lump(LumpType::Vertices, 0, vec![0u8; 36]);
        w.set_lump(LumpType::Edges, 0, vec![0u8; 8]);
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        for d in dir.descriptors() {
            assert!(d.offset + d.length <= dir.file_size());
        }
    }

    #[test]
    fn too_short() {
        let err = LumpDirectory::open(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, BspError::TooShort { size: 16, .. }));
    }

    #[test]
    fn bad_magic() {
        let mut data = BspWriter::new().finish();
        data[0..4].copy_from_slice(b"IBSP");
        let err = LumpDirectory::open(&data).unwrap_err();
        assert_eq!(err, BspError::BadMagic { found: *b"IBSP" });
    }

    #[test]
    fn unsupported_version() {
        let mut w = BspWriter::new();
        w.version = 38;
        let data = w.finish();
        let err = LumpDirectory::open(&data).unwrap_err();
        assert!(matches!(err, BspError::UnsupportedVersion { found: 38, .. }));
    }

    #[test]
    fn lump_past_end_of_file() {
        let mut data = BspWriter::new().finish();
        let base = 8 + LumpType::Faces.index() * LUMP_DESCRIPTOR_SIZE;
        let len = data.len() as i32;
        data[base..base + 4].copy_from_slice(&(len - 4).to_le_bytes());
        data[base + 4..base + 8].copy_from_slice(&8i32.to_le_bytes());
        let err = LumpDirectory::open(&data).unwrap_err();
        assert!(matches!(err, BspError::LumpOutOfBounds { index: 7, .. }));
    }

    #[test]
    fn negative_offset_rejected() {
        let mut data = BspWriter::new().finish();
        let base = 8 + LumpType::Planes.index() * LUMP_DESCRIPTOR_SIZE;
        data[base..base + 4].copy_from_slice(&(-4i32).to_le_bytes());
        let err = LumpDirectory::open(&data).unwrap_err();
        assert!(matches!(err, BspError::LumpOutOfBounds { index: 1, .. }));
    }

    #[test]
    fn compressed_flag_from_four_cc() {
        let d = LumpDescriptor {
            four_cc: 1024u32.to_le_bytes(),
            ..Default::default()
        };
        assert!(d.is_compressed());
        assert_eq!(d.uncompressed_size(), 1024);
        assert!(!LumpDescriptor::default().is_compressed());
    }
}
