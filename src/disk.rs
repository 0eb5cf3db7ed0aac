use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};

/// Positioned reads against a backing file or device.
pub trait ReadOffset {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    fn read_exact_at(&mut self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof)),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset = offset
                        .checked_add(n as u64)
                        .ok_or_else(|| io::Error::from(ErrorKind::UnexpectedEof))?;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Positioned writes against a backing file or device.
pub trait WriteOffset {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize>;

    fn write_all_at(&mut self, mut offset: u64, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write_at(offset, buf) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => {
                    buf = &buf[n..];
                    offset = offset
                        .checked_add(n as u64)
                        .ok_or_else(|| io::Error::from(ErrorKind::WriteZero))?;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Writes zeroes from the given absolute offset (in bytes), up to the given size.
pub fn write_zeroes<D: WriteOffset + ?Sized>(dev: &mut D, offset: u64, size: u64) -> io::Result<()> {
    let buffer = [0u8; 4 * crate::KB as usize];

    let mut position = offset;
    let mut remaining = size;
    while remaining > 0 {
        let iter_size = remaining.min(buffer.len() as u64);
        // `iter_size` is at most 4KB so this cast is fine
        dev.write_all_at(position, &buffer[..iter_size as usize])?;
        position += iter_size;
        remaining -= iter_size;
    }
    Ok(())
}

impl<T: ReadOffset + ?Sized> ReadOffset for &mut T {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }
}

impl<T: WriteOffset + ?Sized> WriteOffset for &mut T {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        (**self).write_at(offset, buf)
    }
}

impl ReadOffset for std::fs::File {
    #[cfg(unix)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&*self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(&*self, buf, offset)
    }
}

impl WriteOffset for std::fs::File {
    #[cfg(unix)]
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(&*self, buf, offset)
    }

    #[cfg(windows)]
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(&*self, buf, offset)
    }
}

// In-memory backing store, mostly useful for tests and image assembly.
impl ReadOffset for Cursor<Vec<u8>> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(buf)
    }
}

impl WriteOffset for Cursor<Vec<u8>> {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.write(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_exact_at_fails_on_short_data() {
        let mut disk = Cursor::new(vec![1u8; 16]);
        let mut buf = [0u8; 8];
        disk.read_exact_at(4, &mut buf).unwrap();
        assert_eq!(buf, [1u8; 8]);

        let mut buf = [0u8; 32];
        let err = disk.read_exact_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn write_zeroes_extends_and_clears() {
        let mut disk = Cursor::new(vec![0xffu8; 8]);
        write_zeroes(&mut disk, 4, 8192).unwrap();
        let data = disk.into_inner();
        assert_eq!(data.len(), 8196);
        assert_eq!(&data[..4], &[0xff; 4]);
        assert!(data[4..].iter().all(|&b| b == 0));
    }
}
