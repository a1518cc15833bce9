//! # UFCP (UDP File Copy Protocol)
//!
//! 신뢰할 수 없는 데이터그램 채널 위에서 디렉터리의 파일을 복사하는 프로토콜
//!
//! ## 핵심 특징
//! - **순수 데이터그램**: 연결 추상화 없이 송신/수신 상태 기계만으로 동작
//! - **정지-대기 재전송**: 패킷마다 확인 응답, 타임아웃 시 재전송
//! - **종단간 검증**: 수신측이 임시 파일을 다시 읽어 SHA-1 해시를 돌려주고,
//!   송신측 해시와 일치할 때만 커밋 (rename)
//! - **손상 내성 파일 IO**: 다수결 해시 읽기로 로컬 디스크 손상 복원
//! - **멱등 중복 처리**: 수신자 응답 캐시로 재전송된 요청에 동일 응답
//!
//! 네트워크와 로컬 디스크 양쪽에 독립적인 "nastiness" (손상 강도) 레벨을
//! 두고 시뮬레이션한다. 네트워크는 0~4, 파일은 0~5.

pub mod config;
pub mod error;
pub mod filebuf;
pub mod hash;
pub mod nastyfile;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use filebuf::FileBuffer;
pub use hash::{Hash, HASH_LEN, NULL_HASH};
pub use packet::{Packet, PacketExpect};
pub use receiver::Receiver;
pub use sender::{Sender, TransferOutcome};
pub use stats::{ServeStats, TransferStats};
pub use transport::{Datagram, NastyDgmSocket, PipeDatagram, Transport, UdpDatagram};

/// 데이터그램 최대 크기 (바이트)
pub const MAX_DGM_SIZE: usize = 503;

/// 패킷 헤더 크기: fileid(4) + flags(1) + seqno(4) + datalen(2)
pub const HDR_LEN: usize = 11;

/// 한 패킷이 담을 수 있는 최대 데이터 크기
pub const MAX_DATA_LEN: usize = MAX_DGM_SIZE - HDR_LEN;

/// 한 패킷에 실제로 쓰는 최대 데이터 크기 (보증 바이트 1개 예약)
pub const MAX_WRITE_LEN: usize = MAX_DATA_LEN - 1;

/// 유효한 패킷의 최대 길이
pub const MAX_PCKT_LEN: usize = HDR_LEN + MAX_WRITE_LEN;

/// 세션 없음을 나타내는 fileid
pub const NULL_FILEID: i32 = 0;

/// 의미 없는 seqno
pub const NULL_SEQNO: i32 = 0;

/// 수신자 기본 포트 (UFCP_PORT 환경 변수로 변경 가능)
pub const DEFAULT_PORT: u16 = 39500;
