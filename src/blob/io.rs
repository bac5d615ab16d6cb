//! Endian-aware primitive reads over borrowed byte slices.
//!
//! Metadata blobs, constant values and custom attribute payloads store fixed-width integers
//! in little-endian order. The [`BlobIO`] trait abstracts over the primitive types so the cursor in
//! [`crate::blob::parser`] can offer a single generic `read_le::<T>()` entry point.
//!
//! All functions are bounds checked and report [`crate::Error::OutOfBounds`] instead of
//! panicking.

use crate::Result;

/// Primitive types that can be decoded from a fixed number of bytes.
pub trait BlobIO: Sized {
    /// Fixed-size byte array matching the in-memory width of the type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_blob_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl BlobIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_blob_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Reads a little-endian `T` at `offset` and advances the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: BlobIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let bytes = take::<T>(data, offset)?;
    Ok(T::from_le_bytes(bytes))
}

/// Reads a little-endian `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: BlobIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_le_at(data, &mut offset)
}

fn take<T: BlobIO>(data: &[u8], offset: &mut usize) -> Result<T::Bytes> {
    let type_len = std::mem::size_of::<T>();
    let end = offset
        .checked_add(type_len)
        .ok_or_else(|| out_of_bounds_error!())?;
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(bytes) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF];
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x0201);
        assert_eq!(offset, 2);
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x0403);
        assert_eq!(read_le_at::<i8>(&data, &mut offset).unwrap(), -1);
    }

    #[test]
    fn short_buffer_is_out_of_bounds() {
        let data = [0x01, 0x02, 0x03];
        let mut offset = 0;
        assert!(matches!(
            read_le_at::<u32>(&data, &mut offset),
            Err(crate::Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, 0);
    }

    #[test]
    fn reads_floats() {
        let data = 1.5f64.to_le_bytes();
        assert_eq!(read_le::<f64>(&data).unwrap(), 1.5);
    }
}
