//! Page constants and the fixed-width binary codec.
//!
//! Every record that lives inside a page is serialized through
//! [`FixedCodec`]: a little-endian, fixed-width layout with explicit
//! offsets. Fixed widths keep the B+ tree node math trivial (the entry
//! count per node is a constant per key/value type).

/// Page size in bytes (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Identifier of a page within a store file.
///
/// Page 0 is reserved for the store header, so 0 doubles as the
/// "no page" sentinel in node sibling links.
pub type PageId = u32;

/// Sentinel page id meaning "no page".
pub const INVALID_PAGE_ID: PageId = 0;

/// Fixed-width binary layout for values stored inside pages.
///
/// Implementations must write exactly [`ENCODED_LEN`](Self::ENCODED_LEN)
/// bytes and must round-trip: `decode_from(encode_into(x)) == x`.
pub trait FixedCodec: Sized {
    /// Number of bytes this type occupies on disk.
    const ENCODED_LEN: usize;

    /// Writes the value into `buf[..Self::ENCODED_LEN]`.
    fn encode_into(&self, buf: &mut [u8]);

    /// Reads a value from `buf[..Self::ENCODED_LEN]`.
    fn decode_from(buf: &[u8]) -> Self;
}

macro_rules! impl_fixed_codec_int {
    ($($ty:ty),*) => {
        $(
            impl FixedCodec for $ty {
                const ENCODED_LEN: usize = std::mem::size_of::<$ty>();

                fn encode_into(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_LEN].copy_from_slice(&self.to_le_bytes());
                }

                fn decode_from(buf: &[u8]) -> Self {
                    let mut raw = [0u8; Self::ENCODED_LEN];
                    raw.copy_from_slice(&buf[..Self::ENCODED_LEN]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_fixed_codec_int!(u8, u16, u32, u64, i16, i32, i64);

impl FixedCodec for () {
    const ENCODED_LEN: usize = 0;

    fn encode_into(&self, _buf: &mut [u8]) {}

    fn decode_from(_buf: &[u8]) -> Self {}
}

impl<A: FixedCodec, B: FixedCodec> FixedCodec for (A, B) {
    const ENCODED_LEN: usize = A::ENCODED_LEN + B::ENCODED_LEN;

    fn encode_into(&self, buf: &mut [u8]) {
        self.0.encode_into(&mut buf[..A::ENCODED_LEN]);
        self.1.encode_into(&mut buf[A::ENCODED_LEN..Self::ENCODED_LEN]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        (
            A::decode_from(&buf[..A::ENCODED_LEN]),
            B::decode_from(&buf[A::ENCODED_LEN..Self::ENCODED_LEN]),
        )
    }
}

impl<A: FixedCodec, B: FixedCodec, C: FixedCodec> FixedCodec for (A, B, C) {
    const ENCODED_LEN: usize = A::ENCODED_LEN + B::ENCODED_LEN + C::ENCODED_LEN;

    fn encode_into(&self, buf: &mut [u8]) {
        let (a, rest) = buf.split_at_mut(A::ENCODED_LEN);
        let (b, c) = rest.split_at_mut(B::ENCODED_LEN);
        self.0.encode_into(a);
        self.1.encode_into(b);
        self.2.encode_into(&mut c[..C::ENCODED_LEN]);
    }

    fn decode_from(buf: &[u8]) -> Self {
        let b_at = A::ENCODED_LEN;
        let c_at = A::ENCODED_LEN + B::ENCODED_LEN;
        (
            A::decode_from(&buf[..b_at]),
            B::decode_from(&buf[b_at..c_at]),
            C::decode_from(&buf[c_at..Self::ENCODED_LEN]),
        )
    }
}
