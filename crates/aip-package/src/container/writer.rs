use crate::error::{PackageError, PackageResult};
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::collections::HashSet;
use std::io::{self, Read, Write};
use tar::{Builder, Header, HeaderMode};

/// Deterministic tar.gz writer.
///
/// Same entries in the same order produce the same bytes: gzip mtime 0 and
/// OS byte 255, tar mtime 0, mode 0644, uid/gid 0.
pub struct ContainerWriter<W: Write> {
    tar: Builder<GzEncoder<W>>,
    seen: HashSet<String>,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(out: W) -> Self {
        let encoder = GzBuilder::new()
            .mtime(0)
            .operating_system(255)
            .write(out, Compression::best());
        let mut tar = Builder::new(encoder);
        tar.mode(HeaderMode::Deterministic);
        Self {
            tar,
            seen: HashSet::new(),
        }
    }

    pub fn append_bytes(&mut self, path: &str, data: &[u8]) -> PackageResult<()> {
        let mut data = data;
        self.append_reader(path, data.len() as u64, &mut data)
    }

    /// Append `size` bytes from `reader`. Fails if the reader yields more or fewer bytes.
    pub fn append_reader(&mut self, path: &str, size: u64, reader: &mut dyn Read) -> PackageResult<()> {
        if !self.seen.insert(path.to_string()) {
            return Err(PackageError::archive(format!("duplicate container entry '{}'", path)));
        }
        let mut header = Header::new_gnu();
        header.set_path(path)?;
        header.set_size(size);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        header.set_cksum();

        let exact = ExactReader {
            inner: reader,
            remaining: size,
        };
        self.tar.append(&header, exact).map_err(|e| {
            PackageError::archive(e.to_string())
                .with_context(format!("entry '{}'", path))
                .with_source(e)
        })?;
        tracing::trace!(path, size, "container entry written");
        Ok(())
    }

    /// Write the tar trailer, finish the gzip stream and return the sink.
    pub fn finish(self) -> PackageResult<W> {
        let encoder = self.tar.into_inner()?;
        Ok(encoder.finish()?)
    }
}

/// Yields exactly `remaining` bytes or fails.
struct ExactReader<'a> {
    inner: &'a mut dyn Read,
    remaining: u64,
}

impl Read for ExactReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "source longer than declared size",
                )),
            };
        }
        let max = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended {} bytes short of declared size", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use flate2::read::GzDecoder;

    fn entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().into_owned();
                let mut data = Vec::new();
                e.read_to_end(&mut data).unwrap();
                (path, data)
            })
            .collect()
    }

    fn build() -> Vec<u8> {
        let mut writer = ContainerWriter::new(Vec::new());
        writer.append_bytes("manifest.json", b"{}").unwrap();
        writer.append_bytes("payloads/file_1", b"hello").unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(build(), build());
        let got = entries(&build());
        assert_eq!(got[0], ("manifest.json".to_string(), b"{}".to_vec()));
        assert_eq!(got[1], ("payloads/file_1".to_string(), b"hello".to_vec()));
    }

    #[test]
    fn short_source_is_rejected() {
        let mut writer = ContainerWriter::new(Vec::new());
        let mut data: &[u8] = b"abc";
        let err = writer.append_reader("payloads/x", 10, &mut data).unwrap_err();
        assert_eq!(err.code, ErrorCode::InfraArchive);
    }

    #[test]
    fn long_source_is_rejected() {
        let mut writer = ContainerWriter::new(Vec::new());
        let mut data: &[u8] = b"abcdef";
        assert!(writer.append_reader("payloads/x", 3, &mut data).is_err());
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let mut writer = ContainerWriter::new(Vec::new());
        writer.append_bytes("a", b"1").unwrap();
        assert!(writer.append_bytes("a", b"2").is_err());
    }
}
