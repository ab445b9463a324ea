//! The compressed metadata table stream (`#~`).
//!
//! Only the assembly manifest (`0x20`) and assembly reference (`0x23`) rows
//! are decoded, but every table laid out before them has to be sized to find
//! them, so the column schemas cover tables `0x00` through `0x22`.

use crate::pe::{u16_at, u32_at, u64_at, u8_at, ImageError, ImageResult};

pub(crate) const ASSEMBLY: usize = 0x20;
pub(crate) const ASSEMBLY_REF: usize = 0x23;

const MODULE: usize = 0x00;
const TYPE_REF: usize = 0x01;
const TYPE_DEF: usize = 0x02;
const FIELD: usize = 0x04;
const METHOD_DEF: usize = 0x06;
const PARAM: usize = 0x08;
const INTERFACE_IMPL: usize = 0x09;
const MEMBER_REF: usize = 0x0a;
const DECL_SECURITY: usize = 0x0e;
const STAND_ALONE_SIG: usize = 0x11;
const EVENT: usize = 0x14;
const PROPERTY: usize = 0x17;
const MODULE_REF: usize = 0x1a;
const TYPE_SPEC: usize = 0x1b;
const FILE: usize = 0x26;
const EXPORTED_TYPE: usize = 0x27;
const MANIFEST_RESOURCE: usize = 0x28;
const GENERIC_PARAM: usize = 0x2a;
const METHOD_SPEC: usize = 0x2b;
const GENERIC_PARAM_CONSTRAINT: usize = 0x2c;

const TYPE_DEF_OR_REF: &[Option<usize>] = &[Some(TYPE_DEF), Some(TYPE_REF), Some(TYPE_SPEC)];
const HAS_CONSTANT: &[Option<usize>] = &[Some(FIELD), Some(PARAM), Some(PROPERTY)];
const HAS_CUSTOM_ATTRIBUTE: &[Option<usize>] = &[
    Some(METHOD_DEF),
    Some(FIELD),
    Some(TYPE_REF),
    Some(TYPE_DEF),
    Some(PARAM),
    Some(INTERFACE_IMPL),
    Some(MEMBER_REF),
    Some(MODULE),
    Some(DECL_SECURITY),
    Some(PROPERTY),
    Some(EVENT),
    Some(STAND_ALONE_SIG),
    Some(MODULE_REF),
    Some(TYPE_SPEC),
    Some(ASSEMBLY),
    Some(ASSEMBLY_REF),
    Some(FILE),
    Some(EXPORTED_TYPE),
    Some(MANIFEST_RESOURCE),
    Some(GENERIC_PARAM),
    Some(GENERIC_PARAM_CONSTRAINT),
    Some(METHOD_SPEC),
];
const HAS_FIELD_MARSHAL: &[Option<usize>] = &[Some(FIELD), Some(PARAM)];
const HAS_DECL_SECURITY: &[Option<usize>] = &[Some(TYPE_DEF), Some(METHOD_DEF), Some(ASSEMBLY)];
const MEMBER_REF_PARENT: &[Option<usize>] = &[
    Some(TYPE_DEF),
    Some(TYPE_REF),
    Some(MODULE_REF),
    Some(METHOD_DEF),
    Some(TYPE_SPEC),
];
const HAS_SEMANTICS: &[Option<usize>] = &[Some(EVENT), Some(PROPERTY)];
const METHOD_DEF_OR_REF: &[Option<usize>] = &[Some(METHOD_DEF), Some(MEMBER_REF)];
const MEMBER_FORWARDED: &[Option<usize>] = &[Some(FIELD), Some(METHOD_DEF)];
const RESOLUTION_SCOPE: &[Option<usize>] = &[
    Some(MODULE),
    Some(MODULE_REF),
    Some(ASSEMBLY_REF),
    Some(TYPE_REF),
];
const CUSTOM_ATTRIBUTE_TYPE: &[Option<usize>] = &[None, None, Some(METHOD_DEF), Some(MEMBER_REF), None];

#[derive(Debug, Clone, Copy)]
enum Col {
    Fixed(usize),
    Str,
    Guid,
    Blob,
    Index(usize),
    Coded(&'static [Option<usize>]),
}

use Col::*;

fn schema(table: usize) -> &'static [Col] {
    match table {
        0x00 => &[Fixed(2), Str, Guid, Guid, Guid],
        0x01 => &[Coded(RESOLUTION_SCOPE), Str, Str],
        0x02 => &[Fixed(4), Str, Str, Coded(TYPE_DEF_OR_REF), Index(FIELD), Index(METHOD_DEF)],
        0x03 => &[Index(FIELD)],
        0x04 => &[Fixed(2), Str, Blob],
        0x05 => &[Index(METHOD_DEF)],
        0x06 => &[Fixed(4), Fixed(2), Fixed(2), Str, Blob, Index(PARAM)],
        0x07 => &[Index(PARAM)],
        0x08 => &[Fixed(2), Fixed(2), Str],
        0x09 => &[Index(TYPE_DEF), Coded(TYPE_DEF_OR_REF)],
        0x0a => &[Coded(MEMBER_REF_PARENT), Str, Blob],
        0x0b => &[Fixed(2), Coded(HAS_CONSTANT), Blob],
        0x0c => &[Coded(HAS_CUSTOM_ATTRIBUTE), Coded(CUSTOM_ATTRIBUTE_TYPE), Blob],
        0x0d => &[Coded(HAS_FIELD_MARSHAL), Blob],
        0x0e => &[Fixed(2), Coded(HAS_DECL_SECURITY), Blob],
        0x0f => &[Fixed(2), Fixed(4), Index(TYPE_DEF)],
        0x10 => &[Fixed(4), Index(FIELD)],
        0x11 => &[Blob],
        0x12 => &[Index(TYPE_DEF), Index(EVENT)],
        0x13 => &[Index(EVENT)],
        0x14 => &[Fixed(2), Str, Coded(TYPE_DEF_OR_REF)],
        0x15 => &[Index(TYPE_DEF), Index(PROPERTY)],
        0x16 => &[Index(PROPERTY)],
        0x17 => &[Fixed(2), Str, Blob],
        0x18 => &[Fixed(2), Index(METHOD_DEF), Coded(HAS_SEMANTICS)],
        0x19 => &[Index(TYPE_DEF), Coded(METHOD_DEF_OR_REF), Coded(METHOD_DEF_OR_REF)],
        0x1a => &[Str],
        0x1b => &[Blob],
        0x1c => &[Fixed(2), Coded(MEMBER_FORWARDED), Str, Index(MODULE_REF)],
        0x1d => &[Fixed(4), Index(FIELD)],
        0x1e => &[Fixed(4), Fixed(4)],
        0x1f => &[Fixed(4)],
        0x20 => &[Fixed(4), Fixed(8), Fixed(4), Blob, Str, Str],
        0x21 => &[Fixed(4)],
        0x22 => &[Fixed(4), Fixed(4), Fixed(4)],
        0x23 => &[Fixed(8), Fixed(4), Blob, Str, Str, Blob],
        _ => &[],
    }
}

/// A raw manifest or reference row: version, flags, key blob, name, culture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AssemblyRow {
    pub version: [u16; 4],
    pub flags: u32,
    pub key_blob: usize,
    pub name: usize,
    pub culture: usize,
}

pub(crate) struct TablesStream<'a> {
    data: &'a [u8],
    heap_sizes: u8,
    rows: [u32; 64],
    tables_start: usize,
}

impl<'a> TablesStream<'a> {
    pub fn parse(data: &'a [u8]) -> ImageResult<Self> {
        let heap_sizes = u8_at(data, 6)?;
        let valid = u64_at(data, 8)?;

        let mut rows = [0u32; 64];
        let mut cursor = 24;
        for (table, count) in rows.iter_mut().enumerate() {
            if valid & (1u64 << table) != 0 {
                *count = u32_at(data, cursor)?;
                cursor += 4;
            }
        }
        // extra data flag
        if heap_sizes & 0x40 != 0 {
            cursor += 4;
        }

        Ok(Self {
            data,
            heap_sizes,
            rows,
            tables_start: cursor,
        })
    }

    pub fn row_count(&self, table: usize) -> usize {
        self.rows[table] as usize
    }

    fn width(&self, col: Col) -> usize {
        let wide_if = |bit: u8| if self.heap_sizes & bit != 0 { 4 } else { 2 };
        match col {
            Fixed(n) => n,
            Str => wide_if(0x01),
            Guid => wide_if(0x02),
            Blob => wide_if(0x04),
            Index(table) => {
                if self.rows[table] < 0x1_0000 {
                    2
                } else {
                    4
                }
            }
            Coded(tags) => {
                let bits = usize::BITS - (tags.len() - 1).leading_zeros();
                let max = tags
                    .iter()
                    .flatten()
                    .map(|&t| self.rows[t])
                    .max()
                    .unwrap_or(0);
                if (max as u64) < (1u64 << (16 - bits)) {
                    2
                } else {
                    4
                }
            }
        }
    }

    fn row_size(&self, table: usize) -> usize {
        schema(table).iter().map(|&c| self.width(c)).sum()
    }

    fn table_offset(&self, table: usize) -> usize {
        self.tables_start
            + (0..table)
                .map(|t| self.row_count(t) * self.row_size(t))
                .sum::<usize>()
    }

    fn heap_index(&self, offset: usize, col: Col) -> ImageResult<usize> {
        match self.width(col) {
            2 => u16_at(self.data, offset).map(usize::from),
            _ => u32_at(self.data, offset).map(|v| v as usize),
        }
    }

    /// Rows of the assembly manifest (`0x20`) or reference (`0x23`) table.
    pub fn assembly_rows(&self, table: usize) -> ImageResult<Vec<AssemblyRow>> {
        let start = self.table_offset(table);
        let size = self.row_size(table);
        (0..self.row_count(table))
            .map(|i| self.assembly_row(table, start + i * size))
            .collect()
    }

    fn assembly_row(&self, table: usize, offset: usize) -> ImageResult<AssemblyRow> {
        // the manifest row leads with the hash algorithm id
        let mut cursor = if table == ASSEMBLY { offset + 4 } else { offset };
        let version = [
            u16_at(self.data, cursor)?,
            u16_at(self.data, cursor + 2)?,
            u16_at(self.data, cursor + 4)?,
            u16_at(self.data, cursor + 6)?,
        ];
        let flags = u32_at(self.data, cursor + 8)?;
        cursor += 12;

        let key_blob = self.heap_index(cursor, Blob)?;
        cursor += self.width(Blob);
        let name = self.heap_index(cursor, Str)?;
        cursor += self.width(Str);
        let culture = self.heap_index(cursor, Str)?;

        Ok(AssemblyRow {
            version,
            flags,
            key_blob,
            name,
            culture,
        })
    }

    /// The single manifest row of an assembly module.
    pub fn manifest(&self) -> ImageResult<AssemblyRow> {
        self.assembly_rows(ASSEMBLY)?
            .into_iter()
            .next()
            .ok_or(ImageError::MissingManifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(heap_sizes: u8, rows: &[(usize, u32)]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0, 2, 0, heap_sizes, 1];
        let valid = rows.iter().fold(0u64, |acc, (t, _)| acc | (1u64 << t));
        data.extend(valid.to_le_bytes());
        data.extend(0u64.to_le_bytes());
        for (_, count) in rows {
            data.extend(count.to_le_bytes());
        }
        data
    }

    #[test]
    fn narrow_row_sizes() {
        let data = stream(0, &[(MODULE, 1), (TYPE_DEF, 3)]);
        let tables = TablesStream::parse(&data).unwrap();
        assert_eq!(tables.row_size(MODULE), 10);
        assert_eq!(tables.row_size(ASSEMBLY), 22);
        assert_eq!(tables.row_size(ASSEMBLY_REF), 20);
        assert_eq!(tables.table_offset(TYPE_DEF), 24 + 8 + 10);
    }

    #[test]
    fn wide_heaps_widen_heap_columns() {
        let data = stream(0x07, &[(MODULE, 1)]);
        let tables = TablesStream::parse(&data).unwrap();
        assert_eq!(tables.row_size(MODULE), 2 + 4 * 4);
        assert_eq!(tables.row_size(ASSEMBLY_REF), 12 + 4 * 4);
    }

    #[test]
    fn coded_index_widens_with_row_counts() {
        // HasCustomAttribute has five tag bits, so 2^11 rows overflow two bytes
        let narrow = stream(0, &[(METHOD_DEF, 0x7ff)]);
        let wide = stream(0, &[(METHOD_DEF, 0x800)]);
        let narrow = TablesStream::parse(&narrow).unwrap();
        let wide = TablesStream::parse(&wide).unwrap();
        assert_eq!(narrow.width(Coded(HAS_CUSTOM_ATTRIBUTE)), 2);
        assert_eq!(wide.width(Coded(HAS_CUSTOM_ATTRIBUTE)), 4);
        assert_eq!(wide.width(Coded(METHOD_DEF_OR_REF)), 2);
    }

    #[test]
    fn missing_manifest() {
        let data = stream(0, &[(MODULE, 1)]);
        let tables = TablesStream::parse(&data).unwrap();
        assert_eq!(tables.manifest(), Err(ImageError::MissingManifest));
    }
}
