//! 종단간 검증용 SHA-1 해시 값

use std::fmt;

use sha1::{Digest, Sha1};

/// 해시 길이 (바이트)
pub const HASH_LEN: usize = 20;

/// 20바이트 SHA-1 해시
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_LEN]);

/// "해시 없음" 센티널 (전부 0)
pub const NULL_HASH: Hash = Hash([0u8; HASH_LEN]);

impl Hash {
    /// 데이터의 SHA-1 해시 계산
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// 기존 해시 바이트에서 생성. 길이가 맞지 않으면 None
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(bytes);
        Some(Self(hash))
    }

    /// 해시 바이트 반환
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// 센티널 여부
    pub fn is_null(&self) -> bool {
        *self == NULL_HASH
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}
