//! 손상 내성 파일 버퍼
//!
//! - 읽기: 청크 단위 다수결 해시. 같은 청크를 여러 번 다시 읽어 해시
//!   히스토그램을 만들고, 최빈 해시와 일치하는 읽기 결과를 채택한다
//! - 쓰기: 단순 전체 쓰기. 쓰기 경로 손상은 수신자가 임시 파일을 다시
//!   읽어 해시를 돌려주는 종단간 검증으로 잡는다

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::hash::Hash;
use crate::nastyfile::{FileMode, NastyFile};
use crate::{Error, Result, MAX_WRITE_LEN};

/// 전송 한 건 동안 파일 내용을 소유하는 버퍼
pub struct FileBuffer {
    fname: PathBuf,
    nastiness: u8,
    buf: Vec<u8>,
}

impl FileBuffer {
    /// 파일 전체를 다수결 읽기로 버퍼에 적재
    ///
    /// 경로가 없거나 일반 파일이 아니면 InvalidFile
    pub fn read(path: &Path, nastiness: u8, rw_tries: u32) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|_| Error::InvalidFile {
            path: path.to_path_buf(),
        })?;
        if !meta.is_file() {
            return Err(Error::InvalidFile {
                path: path.to_path_buf(),
            });
        }

        let fsize = meta.len() as usize;
        let mut fp = NastyFile::open(path, FileMode::Read, nastiness)?;
        let mut buf = vec![0u8; fsize];

        let mut offset = 0;
        while offset < fsize {
            let nbytes = MAX_WRITE_LEN.min(fsize - offset);
            read_stable_part(
                &mut fp,
                &mut buf[offset..offset + nbytes],
                offset as u64,
                rw_tries,
                path,
            )?;
            offset += nbytes;
        }

        debug!(path = %path.display(), len = fsize, "파일 적재 완료");
        Ok(Self {
            fname: path.to_path_buf(),
            nastiness,
            buf,
        })
    }

    /// 메모리에 있는 내용으로 쓰기용 버퍼 생성
    pub fn from_bytes(path: &Path, data: Vec<u8>, nastiness: u8) -> Self {
        Self {
            fname: path.to_path_buf(),
            nastiness,
            buf: data,
        }
    }

    /// 버퍼 내용을 파일로 쓰기
    /// 길이가 모자라면 ShortWrite. 내용 검증은 하지 않는다
    pub fn write(&self) -> Result<()> {
        let mut fp = NastyFile::open(&self.fname, FileMode::Write, self.nastiness)?;
        let written = fp.write(&self.buf)?;
        if written != self.buf.len() {
            return Err(Error::ShortWrite {
                expected: self.buf.len(),
                written,
            });
        }
        fp.sync()?;
        Ok(())
    }

    /// 버퍼 내용의 SHA-1 해시
    pub fn hash(&self) -> Hash {
        Hash::of(&self.buf)
    }

    /// 파일 길이
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// 빈 파일 여부
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 파일 내용
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// 파일 경로
    pub fn name(&self) -> &Path {
        &self.fname
    }
}

// 청크 하나를 안정적으로 읽는다
//
// 1. rw_tries회 재읽기하며 해시 히스토그램 작성
// 2. 최빈 해시 선택
// 3. 최빈 해시를 재현하는 읽기 결과가 나올 때까지 다시 읽어 채택
//
// i.i.d. 손상 모델에서는 올바른 내용이 최빈값이 된다. 확인 루프는
// 64 * rw_tries회를 넘으면 ReadUnstable로 포기한다
fn read_stable_part(
    fp: &mut NastyFile,
    out: &mut [u8],
    offset: u64,
    rw_tries: u32,
    path: &Path,
) -> Result<()> {
    let mut ctr: HashMap<Hash, u32> = HashMap::new();

    for _ in 0..rw_tries.max(1) {
        fp.seek(offset)?;
        let n = fp.read(out)?;
        if n != out.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "짧은 읽기",
            )));
        }
        *ctr.entry(Hash::of(out)).or_insert(0) += 1;
    }

    let modal = ctr
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(hash, _)| hash)
        .ok_or_else(|| Error::ReadUnstable {
            path: path.to_path_buf(),
        })?;

    let mut confirms = 0u32;
    loop {
        fp.seek(offset)?;
        let n = fp.read(out)?;
        if n == out.len() && Hash::of(out) == modal {
            return Ok(());
        }

        confirms += 1;
        if confirms > rw_tries.saturating_mul(64) {
            return Err(Error::ReadUnstable {
                path: path.to_path_buf(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 241) as u8).collect()
    }

    #[test]
    fn test_read_write_roundtrip_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data1");
        let data = pattern(3 * MAX_WRITE_LEN + 17);

        FileBuffer::from_bytes(&path, data.clone(), 0).write().unwrap();

        let fbuf = FileBuffer::read(&path, 0, 10).unwrap();
        assert_eq!(fbuf.bytes(), &data[..]);
        assert_eq!(fbuf.hash(), Hash::of(&data));
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");

        FileBuffer::from_bytes(&path, Vec::new(), 0).write().unwrap();

        let fbuf = FileBuffer::read(&path, 0, 10).unwrap();
        assert!(fbuf.is_empty());
        assert_eq!(fbuf.hash(), Hash::of(b""));
    }

    #[test]
    fn test_majority_read_recovers_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nasty");
        let data = pattern(2 * MAX_WRITE_LEN + 100);
        std::fs::write(&path, &data).unwrap();

        // nastiness 3: 읽기당 12% 손상. 100회 다수결이면 최빈값은 원본
        for _ in 0..3 {
            let fbuf = FileBuffer::read(&path, 3, 100).unwrap();
            assert_eq!(fbuf.bytes(), &data[..]);
        }
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-file");

        assert!(matches!(
            FileBuffer::read(&path, 0, 10),
            Err(Error::InvalidFile { .. })
        ));
    }

    #[test]
    fn test_read_directory_fails() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            FileBuffer::read(dir.path(), 0, 10),
            Err(Error::InvalidFile { .. })
        ));
    }

    #[test]
    fn test_varied_sizes() {
        let dir = tempfile::tempdir().unwrap();

        for (i, size) in [1usize, MAX_WRITE_LEN - 1, MAX_WRITE_LEN, MAX_WRITE_LEN + 1, 1000]
            .into_iter()
            .enumerate()
        {
            let path = dir.path().join(format!("f{}", i));
            let data = pattern(size);
            std::fs::write(&path, &data).unwrap();

            let fbuf = FileBuffer::read(&path, 2, 50).unwrap();
            assert_eq!(fbuf.bytes(), &data[..], "size={}", size);
        }
    }
}
