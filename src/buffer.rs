//! Buffer helpers
//!
//! String and raw-memory helpers over byte buffers, provided as an extension
//! trait instead of being patched onto a shared buffer type.

/// Extra operations on byte buffers.
pub trait BufferExt {
    /// Write `s` as UTF-8 at `offset`. Returns the number of bytes written,
    /// which is less than `s.len()` when the buffer is too short.
    fn write_string(&mut self, s: &str, offset: usize) -> usize;

    /// Decode `len` bytes starting at `offset`, replacing invalid UTF-8.
    /// Out-of-range requests are clamped to the buffer.
    fn read_string(&self, len: usize, offset: usize) -> String;

    /// Address of the first byte.
    fn address(&self) -> usize;

    /// Copy `len` bytes from `src[src_offset..]` to `self[offset..]`.
    /// Returns the number of bytes actually copied.
    fn copy_from(&mut self, src: &[u8], offset: usize, len: usize, src_offset: usize) -> usize;
}

impl BufferExt for [u8] {
    fn write_string(&mut self, s: &str, offset: usize) -> usize {
        if offset >= self.len() {
            return 0;
        }
        let n = s.len().min(self.len() - offset);
        self[offset..offset + n].copy_from_slice(&s.as_bytes()[..n]);
        n
    }

    fn read_string(&self, len: usize, offset: usize) -> String {
        if offset >= self.len() {
            return String::new();
        }
        let end = offset.saturating_add(len).min(self.len());
        String::from_utf8_lossy(&self[offset..end]).into_owned()
    }

    fn address(&self) -> usize {
        self.as_ptr() as usize
    }

    fn copy_from(&mut self, src: &[u8], offset: usize, len: usize, src_offset: usize) -> usize {
        if offset >= self.len() || src_offset >= src.len() {
            return 0;
        }
        let n = len
            .min(self.len() - offset)
            .min(src.len() - src_offset);
        self[offset..offset + n].copy_from_slice(&src[src_offset..src_offset + n]);
        n
    }
}

/// Allocate a buffer holding the UTF-8 bytes of `s`.
pub fn buffer_from_string(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// UTF-8 encoded length of `s`.
pub fn byte_length(s: &str) -> usize {
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut buf = vec![0u8; 8];
        assert_eq!(buf.write_string("héllo", 1), 6);
        assert_eq!(buf.read_string(6, 1), "héllo");
    }

    #[test]
    fn test_write_truncates() {
        let mut buf = vec![0u8; 4];
        assert_eq!(buf.write_string("abcdef", 2), 2);
        assert_eq!(&buf[..], b"\0\0ab");
        assert_eq!(buf.write_string("x", 10), 0);
    }

    #[test]
    fn test_read_clamps() {
        let buf = buffer_from_string("abc");
        assert_eq!(buf.read_string(100, 1), "bc");
        assert_eq!(buf.read_string(1, 5), "");
    }

    #[test]
    fn test_copy_from() {
        let mut dst = vec![0u8; 5];
        let src = b"12345";
        assert_eq!(dst.copy_from(src, 1, 10, 2), 3);
        assert_eq!(&dst[..], b"\0345\0");
    }

    #[test]
    fn test_address_and_length() {
        let buf = vec![1u8, 2, 3];
        assert_eq!(buf.address(), buf.as_ptr() as usize);
        assert_eq!(byte_length("é"), 2);
    }
}
