//! Builds minimal managed images for tests.
//!
//! Available to other crates with the `test-support` feature.

const SECTION_RVA: u32 = 0x2000;
const SECTION_OFFSET: usize = 0x200;
const CLI_HEADER_SIZE: usize = 72;
const PE_OFFSET: usize = 0x80;

pub struct ModuleRef {
    name: String,
    version: [u16; 4],
    flags: u32,
    blob: Vec<u8>,
}

impl ModuleRef {
    pub fn with_token(name: &str, version: [u16; 4], token: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            version,
            flags: 0,
            blob: token.to_vec(),
        }
    }

    pub fn with_key(name: &str, version: [u16; 4], key: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            version,
            flags: 1,
            blob: key.to_vec(),
        }
    }

    pub fn unsigned(name: &str, version: [u16; 4]) -> Self {
        Self::with_token(name, version, &[])
    }
}

pub struct ImageBuilder {
    name: String,
    version: [u16; 4],
    culture: String,
    public_key: Vec<u8>,
    references: Vec<ModuleRef>,
    wide_heaps: bool,
    pe32_plus: bool,
    managed: bool,
}

#[derive(Default)]
struct Heaps {
    strings: Vec<u8>,
    blobs: Vec<u8>,
}

impl Heaps {
    fn string(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        let index = self.strings.len() as u32;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        index
    }

    fn blob(&mut self, b: &[u8]) -> u32 {
        if b.is_empty() {
            return 0;
        }
        let index = self.blobs.len() as u32;
        if b.len() < 0x80 {
            self.blobs.push(b.len() as u8);
        } else {
            self.blobs.push(0x80 | (b.len() >> 8) as u8);
            self.blobs.push(b.len() as u8);
        }
        self.blobs.extend_from_slice(b);
        index
    }
}

fn index(out: &mut Vec<u8>, value: u32, wide: bool) {
    if wide {
        out.extend(value.to_le_bytes());
    } else {
        out.extend((value as u16).to_le_bytes());
    }
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn put_u16(out: &mut [u8], offset: usize, value: u16) {
    out[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

impl ImageBuilder {
    pub fn new(name: &str, version: [u16; 4]) -> Self {
        Self {
            name: name.to_string(),
            version,
            culture: String::new(),
            public_key: Vec::new(),
            references: Vec::new(),
            wide_heaps: false,
            pe32_plus: false,
            managed: true,
        }
    }

    pub fn culture(mut self, culture: &str) -> Self {
        self.culture = culture.to_string();
        self
    }

    pub fn public_key(mut self, key: &[u8]) -> Self {
        self.public_key = key.to_vec();
        self
    }

    pub fn reference(mut self, reference: ModuleRef) -> Self {
        self.references.push(reference);
        self
    }

    pub fn wide_heaps(mut self) -> Self {
        self.wide_heaps = true;
        self
    }

    pub fn pe32_plus(mut self) -> Self {
        self.pe32_plus = true;
        self
    }

    pub fn native(mut self) -> Self {
        self.managed = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let metadata = self.metadata();
        let mut section = vec![0u8; CLI_HEADER_SIZE];
        put_u32(&mut section, 0, CLI_HEADER_SIZE as u32);
        put_u16(&mut section, 4, 2);
        put_u16(&mut section, 6, 5);
        put_u32(&mut section, 8, SECTION_RVA + CLI_HEADER_SIZE as u32);
        put_u32(&mut section, 12, metadata.len() as u32);
        put_u32(&mut section, 16, 1);
        section.extend_from_slice(&metadata);

        let mut image = vec![0u8; SECTION_OFFSET];
        image[0..2].copy_from_slice(b"MZ");
        put_u32(&mut image, 0x3c, PE_OFFSET as u32);
        image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

        let coff = PE_OFFSET + 4;
        let optional_size: u16 = if self.pe32_plus { 240 } else { 224 };
        put_u16(&mut image, coff, if self.pe32_plus { 0x8664 } else { 0x14c });
        put_u16(&mut image, coff + 2, 1);
        put_u16(&mut image, coff + 16, optional_size);
        put_u16(&mut image, coff + 18, 0x2022);

        let optional = coff + 20;
        let (magic, count_offset, directories) = if self.pe32_plus {
            (0x20b, optional + 108, optional + 112)
        } else {
            (0x10b, optional + 92, optional + 96)
        };
        put_u16(&mut image, optional, magic);
        put_u32(&mut image, count_offset, 16);
        if self.managed {
            put_u32(&mut image, directories + 14 * 8, SECTION_RVA);
            put_u32(&mut image, directories + 14 * 8 + 4, CLI_HEADER_SIZE as u32);
        }

        let header = optional + optional_size as usize;
        image[header..header + 5].copy_from_slice(b".text");
        put_u32(&mut image, header + 8, section.len() as u32);
        put_u32(&mut image, header + 12, SECTION_RVA);
        let raw_size = (section.len() + 0x1ff) & !0x1ff;
        put_u32(&mut image, header + 16, raw_size as u32);
        put_u32(&mut image, header + 20, SECTION_OFFSET as u32);

        image.extend_from_slice(&section);
        image.resize(SECTION_OFFSET + raw_size, 0);
        image
    }

    fn metadata(&self) -> Vec<u8> {
        let mut heaps = Heaps {
            strings: vec![0],
            blobs: vec![0],
        };
        let wide = self.wide_heaps;

        let mut tables: Vec<u8> = Vec::new();
        tables.extend(0u32.to_le_bytes());
        tables.extend([2u8, 0, if wide { 0x07 } else { 0 }, 1]);
        let mut valid: u64 = (1 << 0x00) | (1 << 0x20);
        if !self.references.is_empty() {
            valid |= 1 << 0x23;
        }
        tables.extend(valid.to_le_bytes());
        tables.extend(0u64.to_le_bytes());
        tables.extend(1u32.to_le_bytes());
        tables.extend(1u32.to_le_bytes());
        if !self.references.is_empty() {
            tables.extend((self.references.len() as u32).to_le_bytes());
        }

        // Module
        tables.extend(0u16.to_le_bytes());
        index(&mut tables, heaps.string(&self.name), wide);
        index(&mut tables, 1, wide);
        index(&mut tables, 0, wide);
        index(&mut tables, 0, wide);

        // Assembly
        tables.extend(0x8004u32.to_le_bytes());
        for part in self.version {
            tables.extend(part.to_le_bytes());
        }
        let flags: u32 = if self.public_key.is_empty() { 0 } else { 1 };
        tables.extend(flags.to_le_bytes());
        index(&mut tables, heaps.blob(&self.public_key), wide);
        index(&mut tables, heaps.string(&self.name), wide);
        index(&mut tables, heaps.string(&self.culture), wide);

        // AssemblyRef
        for reference in &self.references {
            for part in reference.version {
                tables.extend(part.to_le_bytes());
            }
            tables.extend(reference.flags.to_le_bytes());
            index(&mut tables, heaps.blob(&reference.blob), wide);
            index(&mut tables, heaps.string(&reference.name), wide);
            index(&mut tables, 0, wide);
            index(&mut tables, 0, wide);
        }

        let mut streams: Vec<(&str, Vec<u8>)> = vec![
            ("#~", tables),
            ("#Strings", heaps.strings),
            ("#GUID", vec![0x11; 16]),
            ("#Blob", heaps.blobs),
        ];
        for (_, data) in &mut streams {
            pad4(data);
        }

        let version = b"v4.0.30319\0\0";
        let header_len = 16
            + version.len()
            + 4
            + streams
                .iter()
                .map(|(name, _)| 8 + ((name.len() + 4) & !3))
                .sum::<usize>();

        let mut root: Vec<u8> = Vec::new();
        root.extend(0x424A_5342u32.to_le_bytes());
        root.extend(1u16.to_le_bytes());
        root.extend(1u16.to_le_bytes());
        root.extend(0u32.to_le_bytes());
        root.extend((version.len() as u32).to_le_bytes());
        root.extend_from_slice(version);
        root.extend(0u16.to_le_bytes());
        root.extend((streams.len() as u16).to_le_bytes());

        let mut offset = header_len;
        for (name, data) in &streams {
            root.extend((offset as u32).to_le_bytes());
            root.extend((data.len() as u32).to_le_bytes());
            root.extend_from_slice(name.as_bytes());
            root.push(0);
            pad4(&mut root);
            offset += data.len();
        }
        for (_, data) in &streams {
            root.extend_from_slice(data);
        }
        root
    }
}
