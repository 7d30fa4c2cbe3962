use crate::storage::index::storable::Storable;

/// A fixed-width opaque key. Longer source keys are truncated, shorter ones
/// zero-padded, so keys of the same family always compare over `N` bytes.
///
/// The index instantiates the same families as the engine's generic key
/// support: `GenericKey<4>` through `GenericKey<64>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    /// Builds a key from raw bytes, truncating or zero-padding to `N`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// Builds a key from an integer, little-endian into the low bytes.
    pub fn from_integer(value: i64) -> Self {
        Self::from_bytes(&value.to_le_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0; N] }
    }
}

impl<const N: usize> Storable for GenericKey<N> {
    const ENCODED_LEN: usize = N;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self::from_bytes(&buf[..N])
    }
}
