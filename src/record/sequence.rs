use std::fmt;

const BASES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

/// Read bases packed two per byte, high nibble first.
#[derive(Clone, Copy)]
pub struct Sequence<'a> {
    data: &'a [u8],
    len: usize,
}

impl<'a> Sequence<'a> {
    /// `data` must hold at least `(len + 1) / 2` bytes.
    pub(crate) fn new(data: &'a [u8], len: usize) -> Self {
        Self { data, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_packed(&self) -> &'a [u8] {
        self.data
    }

    /// 4-bit code of base `i`.
    pub fn code(&self, i: usize) -> Option<u8> {
        if i >= self.len {
            return None;
        }
        let byte = *self.data.get(i / 2)?;
        Some(if i % 2 == 0 { byte >> 4 } else { byte & 0xf })
    }

    pub fn get(&self, i: usize) -> Option<u8> {
        self.code(i).map(|c| BASES[usize::from(c)])
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + use<'a> {
        let seq = *self;
        (0..seq.len).filter_map(move |i| seq.get(i))
    }
}

impl fmt::Display for Sequence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("*");
        }
        for base in self.iter() {
            write!(f, "{}", base as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sequence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&self.to_string()).finish()
    }
}

/// Pack bases two per byte, as stored in a record. Unknown letters become `N`.
pub fn pack_bases(bases: &[u8]) -> Vec<u8> {
    let code = |b: &u8| {
        BASES
            .iter()
            .position(|x| x == &b.to_ascii_uppercase())
            .unwrap_or(15) as u8
    };
    bases
        .chunks(2)
        .map(|pair| {
            let hi = code(&pair[0]) << 4;
            let lo = pair.get(1).map_or(0, code);
            hi | lo
        })
        .collect()
}
