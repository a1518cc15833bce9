//! 손상 주입 파일 프리미티브
//!
//! 개별 read/write 호출이 확률적으로 손상된 바이트를 돌려주는 파일 래퍼.
//! 길이는 속이지 않고 내용만 손상시킨다. seek와 open은 항상 정확하다.
//! 손상 복원은 상위 계층([`crate::filebuf`])의 다수결 읽기와 종단간
//! 검증이 담당한다.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use rand::Rng;

use crate::Result;

/// 파일 nastiness 최대 레벨
pub const MAX_FILE_NASTINESS: u8 = 5;

/// 파일 열기 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// 읽기 전용
    Read,
    /// 쓰기 (생성/절단)
    Write,
}

/// 손상 주입 파일
pub struct NastyFile {
    file: File,
    nastiness: u8,
}

impl NastyFile {
    /// 파일 열기
    pub fn open(path: &Path, mode: FileMode, nastiness: u8) -> Result<Self> {
        let file = match mode {
            FileMode::Read => File::open(path)?,
            FileMode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        };

        Ok(Self { file, nastiness })
    }

    /// 파일 시작 기준 오프셋으로 이동
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// buf를 채울 만큼 읽기. 반환된 내용은 손상되었을 수 있다
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        corrupt_maybe(&mut buf[..filled], self.nastiness);
        Ok(filled)
    }

    /// 데이터 전체 쓰기. 디스크에 닿는 내용이 손상되었을 수 있다
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut out = data.to_vec();
        corrupt_maybe(&mut out, self.nastiness);

        self.file.write_all(&out)?;
        Ok(out.len())
    }

    /// 버퍼를 디스크로 내리기
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

// nastiness당 4% 확률로 1~3바이트의 비트를 뒤집는다
fn corrupt_maybe(buf: &mut [u8], nastiness: u8) {
    if nastiness == 0 || buf.is_empty() {
        return;
    }

    let mut rng = rand::thread_rng();
    let p = f64::from(nastiness.min(MAX_FILE_NASTINESS)) * 0.04;
    if !rng.gen_bool(p) {
        return;
    }

    let flips = rng.gen_range(1..=3usize.min(buf.len()));
    for _ in 0..flips {
        let i = rng.gen_range(0..buf.len());
        buf[i] ^= 1 << rng.gen_range(0..8);
    }
}
