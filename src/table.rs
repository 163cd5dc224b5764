//! ACPI table header parsing (`SPEC_FULL.md` §6 "ACPI table layout"),
//! grounded on the fixed-width System Description Table Header every ACPI
//! table (DSDT, SSDT, FADT, ...) begins with. The core owns table
//! acquisition via [`crate::Handler::scan_table`] rather than receiving
//! pre-sliced AML bytes, so it needs to be able to read this header itself
//! to find where the AML byte stream actually starts and how long it runs.

use crate::AmlError;
use alloc::string::String;

/// The 36-byte header common to every ACPI table. `aml_len`/`aml_offset`
/// give the caller the slice to hand to [`crate::AmlContext::parse_table`]
/// (everything after the header, up to `length`).
#[derive(Clone, Copy, Debug)]
pub struct AcpiTableHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: [u8; 4],
    pub creator_revision: u32,
}

pub const HEADER_LEN: usize = 36;

impl AcpiTableHeader {
    /// Parses the header from the first 36 bytes of `table`, which must
    /// include the header itself (i.e. the raw bytes `Handler::scan_table`
    /// points at, not the post-header AML body).
    pub fn parse(table: &[u8]) -> Result<AcpiTableHeader, AmlError> {
        if table.len() < HEADER_LEN {
            return Err(AmlError::UnexpectedEndOfStream);
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&table[0..4]);
        let length = u32::from_le_bytes(table[4..8].try_into().unwrap());
        let revision = table[8];
        let checksum = table[9];
        let mut oem_id = [0u8; 6];
        oem_id.copy_from_slice(&table[10..16]);
        let mut oem_table_id = [0u8; 8];
        oem_table_id.copy_from_slice(&table[16..24]);
        let oem_revision = u32::from_le_bytes(table[24..28].try_into().unwrap());
        let mut creator_id = [0u8; 4];
        creator_id.copy_from_slice(&table[28..32]);
        let creator_revision = u32::from_le_bytes(table[32..36].try_into().unwrap());

        Ok(AcpiTableHeader {
            signature,
            length,
            revision,
            checksum,
            oem_id,
            oem_table_id,
            oem_revision,
            creator_id,
            creator_revision,
        })
    }

    /// Verifies the whole-table byte checksum (every byte of the table,
    /// header included, must sum to zero mod 256).
    pub fn validate_checksum(&self, table: &[u8]) -> bool {
        table.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
    }

    pub fn signature_str(&self) -> String {
        String::from_utf8_lossy(&self.signature).into_owned()
    }

    /// The AML byte stream: everything in `table` after this header, up to
    /// the table's declared `length`.
    pub fn aml_body<'a>(&self, table: &'a [u8]) -> Result<&'a [u8], AmlError> {
        let length = self.length as usize;
        if length < HEADER_LEN || length > table.len() {
            return Err(AmlError::UnexpectedEndOfStream);
        }
        Ok(&table[HEADER_LEN..length])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dsdt(body: &[u8]) -> alloc::vec::Vec<u8> {
        let mut table = alloc::vec::Vec::new();
        table.extend_from_slice(b"DSDT");
        let length = (HEADER_LEN + body.len()) as u32;
        table.extend_from_slice(&length.to_le_bytes());
        table.push(2); // revision
        table.push(0); // checksum, fixed up below
        table.extend_from_slice(b"RUSTOS");
        table.extend_from_slice(b"AMLCORE0");
        table.extend_from_slice(&1u32.to_le_bytes());
        table.extend_from_slice(b"RSTC");
        table.extend_from_slice(&1u32.to_le_bytes());
        table.extend_from_slice(body);

        let sum = table.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        table[9] = table[9].wrapping_sub(sum);
        table
    }

    #[test]
    fn parses_header_fields() {
        let table = sample_dsdt(&[0x10, 0x20, 0x30]);
        let header = AcpiTableHeader::parse(&table).unwrap();
        assert_eq!(&header.signature, b"DSDT");
        assert_eq!(header.length as usize, table.len());
        assert_eq!(header.revision, 2);
        assert_eq!(header.signature_str(), "DSDT");
    }

    #[test]
    fn validates_checksum() {
        let table = sample_dsdt(&[0xAA, 0xBB]);
        let header = AcpiTableHeader::parse(&table).unwrap();
        assert!(header.validate_checksum(&table));

        let mut corrupted = table.clone();
        corrupted[20] ^= 0xFF;
        let header = AcpiTableHeader::parse(&corrupted).unwrap();
        assert!(!header.validate_checksum(&corrupted));
    }

    #[test]
    fn splits_aml_body() {
        let body = [0x10, 0x20, 0x30, 0x40];
        let table = sample_dsdt(&body);
        let header = AcpiTableHeader::parse(&table).unwrap();
        assert_eq!(header.aml_body(&table).unwrap(), &body);
    }

    #[test]
    fn rejects_short_header() {
        assert!(matches!(AcpiTableHeader::parse(&[0u8; 10]), Err(AmlError::UnexpectedEndOfStream)));
    }
}
