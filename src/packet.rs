//! 패킷 정의와 코덱
//!
//! - 고정 레이아웃 헤더 (리틀엔디언, 패딩 없음): fileid(4) + flags(1) +
//!   seqno(4) + datalen(2)
//! - 페이로드는 정확히 datalen 바이트만 보관하므로 동등성 비교는
//!   유효 바이트만 본다
//! - BTreeSet / HashMap 키로 쓰기 위한 전순서 정의

use std::cmp::Ordering;

use bytes::Bytes;

use crate::{HDR_LEN, MAX_WRITE_LEN, NULL_FILEID, NULL_SEQNO};

/// 플래그 비트필드
pub type Flags = u8;

/// 플래그 없음
pub const NO_FLS: Flags = 0;
/// 요청
pub const REQ_FL: Flags = 0x01;
/// 파일 데이터
pub const FILE_FL: Flags = 0x02;
/// 종단간 검증
pub const CHECK_FL: Flags = 0x04;
/// 종료
pub const FIN_FL: Flags = 0x08;
/// 긍정
pub const POS_FL: Flags = 0x10;
/// 부정
pub const NEG_FL: Flags = 0x20;

/// 패킷
///
/// `data`는 항상 datalen 바이트만 담는다. 수신 데이터그램의 datalen 필드가
/// 손상되어 실제 수신 길이보다 크더라도 디코더가 가용 바이트로 잘라낸다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    /// 세션 식별자 (NULL_FILEID = 세션 없음)
    pub fileid: i32,

    /// 플래그 비트필드
    pub flags: Flags,

    /// 시퀀스 번호
    /// FILE 패킷에서는 청크 인덱스, REQ|CHECK에서는 시도 번호
    pub seqno: i32,

    data: Bytes,
}

impl Packet {
    /// 새 패킷 생성
    /// 데이터는 처음 MAX_WRITE_LEN 바이트까지만 복사된다
    pub fn new(fileid: i32, flags: Flags, seqno: i32, data: &[u8]) -> Self {
        let n = data.len().min(MAX_WRITE_LEN);
        Self {
            fileid,
            flags,
            seqno,
            data: Bytes::copy_from_slice(&data[..n]),
        }
    }

    /// 데이터 없는 제어 패킷 생성
    pub fn control(fileid: i32, flags: Flags, seqno: i32) -> Self {
        Self {
            fileid,
            flags,
            seqno,
            data: Bytes::new(),
        }
    }

    /// 오류 패킷 생성 (NEG 단독, 식별자 전부 0)
    pub fn error_packet() -> Self {
        Self::control(NULL_FILEID, NEG_FL, NULL_SEQNO)
    }

    /// 오류 패킷 여부
    pub fn is_error(&self) -> bool {
        self.flags == NEG_FL
            && self.fileid == NULL_FILEID
            && self.seqno == NULL_SEQNO
            && self.data.is_empty()
    }

    /// 유효 데이터 길이
    pub fn datalen(&self) -> u16 {
        self.data.len() as u16
    }

    /// 유효 데이터
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 요구한 플래그가 전부 켜져 있는지 확인
    pub fn has_flags(&self, mask: Flags) -> bool {
        self.flags & mask == mask
    }

    /// 페이로드를 파일 이름으로 해석 (첫 NUL 전까지)
    pub fn fname(&self) -> String {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end]).into_owned()
    }

    /// 패킷을 바이트로 직렬화
    /// 정확히 HDR_LEN + datalen 바이트를 만든다
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HDR_LEN + self.data.len());
        buf.extend_from_slice(&self.fileid.to_le_bytes());
        buf.push(self.flags);
        buf.extend_from_slice(&self.seqno.to_le_bytes());
        buf.extend_from_slice(&self.datalen().to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// 바이트에서 패킷 역직렬화
    /// 헤더에 못 미치면 None. datalen은 수신 길이와 MAX_WRITE_LEN으로 잘라냄
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HDR_LEN {
            return None;
        }

        let fileid = i32::from_le_bytes(bytes[0..4].try_into().ok()?);
        let flags = bytes[4];
        let seqno = i32::from_le_bytes(bytes[5..9].try_into().ok()?);
        let declared = u16::from_le_bytes(bytes[9..11].try_into().ok()?) as usize;

        let avail = bytes.len() - HDR_LEN;
        let datalen = declared.min(avail).min(MAX_WRITE_LEN);

        Some(Self {
            fileid,
            flags,
            seqno,
            data: Bytes::copy_from_slice(&bytes[HDR_LEN..HDR_LEN + datalen]),
        })
    }
}

// 전순서: (fileid, seqno, datalen, 페이로드, flags) 사전식
impl Ord for Packet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fileid
            .cmp(&other.fileid)
            .then_with(|| self.seqno.cmp(&other.seqno))
            .then_with(|| self.data.len().cmp(&other.data.len()))
            .then_with(|| self.data.cmp(&other.data))
            .then_with(|| self.flags.cmp(&other.flags))
    }
}

impl PartialOrd for Packet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 다음 수신 패킷에 대한 기대치
///
/// - fileid == NULL_FILEID 이면 모든 fileid 허용
/// - seqno == NULL_SEQNO 이면 모든 seqno 허용
/// - flags는 부분집합 검사: 기대한 비트가 전부 켜져 있으면 추가 비트 허용
#[derive(Debug, Clone, Copy)]
pub struct PacketExpect {
    pub fileid: i32,
    pub flags: Flags,
    pub seqno: i32,
}

impl PacketExpect {
    /// 새 기대치 생성
    pub fn new(fileid: i32, flags: Flags, seqno: i32) -> Self {
        Self {
            fileid,
            flags,
            seqno,
        }
    }

    /// 패킷이 기대에 맞는지 확인
    pub fn matches(&self, pckt: &Packet) -> bool {
        (self.fileid == NULL_FILEID || self.fileid == pckt.fileid)
            && pckt.flags & self.flags == self.flags
            && (self.seqno == NULL_SEQNO || self.seqno == pckt.seqno)
    }
}

/// 파일 데이터를 연속 패킷들로 분할
/// seqno는 init_seqno부터 1씩 증가, 빈 파일이면 빈 벡터
pub fn split_file(fileid: i32, flags: Flags, init_seqno: i32, file: &[u8]) -> Vec<Packet> {
    file.chunks(MAX_WRITE_LEN)
        .enumerate()
        .map(|(i, part)| Packet::new(fileid, flags, init_seqno + i as i32, part))
        .collect()
}

/// 패킷들을 하나의 파일 버퍼로 병합
/// 각 패킷은 (seqno - init_seqno) * MAX_WRITE_LEN 오프셋에 기록된다.
/// 범위 밖 seqno는 무시, 빠진 자리는 0으로 남는다
pub fn merge_packets<'a, I>(parts: I, init_seqno: i32, buflen: usize) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Packet>,
{
    let mut buf = vec![0u8; buflen];

    for pckt in parts {
        let idx = i64::from(pckt.seqno) - i64::from(init_seqno);
        if idx < 0 {
            continue;
        }

        let offset = match (idx as usize).checked_mul(MAX_WRITE_LEN) {
            Some(o) if o < buflen => o,
            _ => continue,
        };

        let end = (offset + pckt.data().len()).min(buflen);
        buf[offset..end].copy_from_slice(&pckt.data()[..end - offset]);
    }

    buf
}
