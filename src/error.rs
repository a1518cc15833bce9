//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// UFCP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("유효하지 않은 파일: {path:?}")]
    InvalidFile { path: PathBuf },

    #[error("파일이 너무 큼: {path:?} ({len} bytes)")]
    FileTooLarge { path: PathBuf, len: u64 },

    #[error("쓰기 길이 불일치: expected {expected}, written {written}")]
    ShortWrite { expected: usize, written: usize },

    #[error("안정적인 읽기 실패: {path:?}")]
    ReadUnstable { path: PathBuf },

    #[error("상대 주소 없음")]
    PeerMissing,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
