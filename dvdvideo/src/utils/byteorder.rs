//! Field-by-field serialization for fixed binary headers.

pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait WriteBytesBe {
    fn write_be(&self, dst: &mut Vec<u8>);
}

/// A RIFF chunk body, implemented through `#[riff_chunk(b"....")]`.
pub trait RiffChunk {
    fn chunk_id(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    /// Chunk id, little-endian size and body.
    fn to_chunk(&self) -> Vec<u8> {
        let data = self.chunk_data();
        let mut out = Vec::with_capacity(8 + data.len());
        out.extend_from_slice(self.chunk_id());
        (data.len() as u32).write_le(&mut out);
        out.extend_from_slice(&data);
        out
    }
}

macro_rules! impl_num_le_be {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
        impl WriteBytesBe for $t { #[inline] fn write_be(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_be_bytes()); }}
    )+ }
}

impl_num_le_be!(u8, u16, u32, u64);

macro_rules! impl_collection {
    ($trait:ident, $method:ident) => {
        impl<T: $trait, const N: usize> $trait for [T; N] {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
    };
}

impl_collection!(WriteBytesLe, write_le);
impl_collection!(WriteBytesBe, write_be);

#[cfg(test)]
mod tests {
    use super::{RiffChunk, WriteBytesBe, WriteBytesLe};
    use dvdmx_macros::{ToBytes, riff_chunk};

    #[derive(ToBytes)]
    struct Mini {
        a: u16,
        b: u32,
        tag: [u8; 4],
    }

    #[riff_chunk(b"test")]
    #[derive(ToBytes)]
    struct Body {
        value: u16,
    }

    #[test]
    fn fields_follow_declaration_order() {
        let s = Mini {
            a: 0x1234,
            b: 0xABCDEF01,
            tag: *b"TEST",
        };

        let vec_le = &mut Vec::new();
        let vec_be = &mut Vec::new();

        s.write_le(vec_le);
        s.write_be(vec_be);

        let expected_le = [0x34, 0x12, 0x01, 0xEF, 0xCD, 0xAB, b'T', b'E', b'S', b'T'];
        let expected_be = [0x12, 0x34, 0xAB, 0xCD, 0xEF, 0x01, b'T', b'E', b'S', b'T'];

        assert_eq!(&vec_le[..], &expected_le);
        assert_eq!(&vec_be[..], &expected_be);
    }

    #[test]
    fn riff_chunk_prefixes_id_and_size() {
        let chunk = Body { value: 0x0102 }.to_chunk();
        assert_eq!(chunk, [b't', b'e', b's', b't', 2, 0, 0, 0, 0x02, 0x01]);
    }
}
