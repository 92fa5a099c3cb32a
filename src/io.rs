//! Various traits to help parsing of DNS messages.

use crate::bail;
use crate::types::Class;
use byteorder::{ReadBytesExt, BE};
use num_traits::FromPrimitive;
use std::io;
use std::io::Cursor;
use std::io::SeekFrom;

/// Longest domain name allowed on the wire, including length octets. [RFC1035]
pub const MAX_NAME_LEN: usize = 255;

/// Longest single label. [RFC1035]
pub const MAX_LABEL_LEN: usize = 63;

pub trait SeekExt {
    /// Returns the number of bytes remaining to be consumed.
    /// This is used as a way to check for malformed input.
    fn remaining(&self) -> usize;
}

impl<'a> SeekExt for Cursor<&'a [u8]> {
    fn remaining(&self) -> usize {
        let pos = self.position() as usize;
        self.get_ref().len().saturating_sub(pos)
    }
}

/// All types that implement `Read` and `Seek` get methods defined
/// in `DNSReadExt` for free.
impl<R: io::Read + ?Sized + io::Seek> DNSReadExt for R {}

/// Extensions to io::Read to add some DNS specific types.
pub trait DNSReadExt: io::Read + io::Seek {
    /// Reads a domain name from the message, following compression pointers.
    ///
    /// The name is returned in ASCII with a trailing dot, the root being ".".
    ///
    /// # Errors
    ///
    /// Will return a io::Error(InvalidData) if the read domain name is invalid, or
    /// a more general io::Error on any other read failure.
    fn read_qname(&mut self) -> io::Result<String> {
        let mut qname = String::new();
        let start = self.stream_position()?;
        let mut wire_len = 1;

        // Read each label one at a time, to build up the full domain name.
        loop {
            let len = self.read_u8()?;
            if len == 0 {
                break;
            }

            match len & 0xC0 {
                // No compression
                0x00 => {
                    let mut label = vec![0; len.into()];
                    self.read_exact(&mut label)?;

                    if !label.is_ascii() {
                        bail!(InvalidData, "invalid label {:?}: not valid ascii", label);
                    }

                    wire_len += label.len() + 1;
                    if wire_len > MAX_NAME_LEN {
                        bail!(InvalidData, "domain name longer than {} bytes", MAX_NAME_LEN);
                    }

                    // is_ascii was checked above.
                    qname.push_str(&String::from_utf8_lossy(&label));
                    qname.push('.');
                }

                // Compression
                0xC0 => {
                    // Read the 14 bit pointer.
                    let b2 = self.read_u8()? as u16;
                    let ptr = ((len as u16 & !0xC0) << 8 | b2) as u64;

                    // Only allow pointers backwards, so we can't get into a loop.
                    if ptr >= start {
                        bail!(
                            InvalidData,
                            "invalid compressed pointer pointing to future bytes"
                        );
                    }

                    let current = self.stream_position()?;

                    self.seek(SeekFrom::Start(ptr))?;
                    let suffix = self.read_qname()?;
                    self.seek(SeekFrom::Start(current))?;

                    if suffix != "." {
                        wire_len += suffix.len();
                        if wire_len > MAX_NAME_LEN {
                            bail!(InvalidData, "domain name longer than {} bytes", MAX_NAME_LEN);
                        }
                        qname.push_str(&suffix);
                    }

                    break;
                }

                // Unknown
                _ => bail!(
                    InvalidData,
                    "unsupported compression type {0:b}",
                    len & 0xC0
                ),
            }
        }

        if qname.is_empty() {
            qname.push('.') // Root domain
        }

        Ok(qname)
    }

    /// Reads a DNS Class.
    fn read_class(&mut self) -> io::Result<Class> {
        let class = self.read_u16::<BE>()?;
        let class = match FromPrimitive::from_u16(class) {
            Some(t) => t,
            None => bail!(InvalidData, "invalid Class({})", class),
        };

        Ok(class)
    }

    /// Reads exactly `len` bytes.
    fn read_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_qname() {
        // "a.bc." followed by a pointer back to "bc."
        let buf = [1, b'a', 2, b'b', b'c', 0, 1, b'x', 0xC0, 2];
        let mut cur = Cursor::new(&buf[..]);

        assert_eq!(cur.read_qname().unwrap(), "a.bc.");
        assert_eq!(cur.read_qname().unwrap(), "x.bc.");
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn test_read_root() {
        let buf = [0];
        let mut cur = Cursor::new(&buf[..]);
        assert_eq!(cur.read_qname().unwrap(), ".");
    }

    #[test]
    fn test_forward_pointer() {
        // Points at itself.
        let buf = [0xC0, 0];
        let mut cur = Cursor::new(&buf[..]);
        let err = cur.read_qname().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_label() {
        let buf = [5, b'a', b'b'];
        let mut cur = Cursor::new(&buf[..]);
        assert!(cur.read_qname().is_err());
    }
}
