//! 프로토콜 설정

use std::time::Duration;

/// UFCP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 확인 응답 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// 종단간 검증 단계의 응답 타임아웃 (밀리초)
    /// 수신자가 임시 파일을 다시 읽고 해시를 계산하는 시간을 포함한다
    pub check_timeout_ms: u64,

    /// 수신자가 세션을 포기하고 IDLE로 복귀하는 타임아웃 (밀리초)
    pub giveup_timeout_ms: u64,

    /// 패킷당 최대 재전송 횟수
    pub max_tries: u32,

    /// 종단간 검증 최대 시도 횟수
    pub max_check_attempts: u32,

    /// 청크당 다수결 읽기 횟수
    pub rw_tries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 50,       // 50ms
            check_timeout_ms: 1000,   // 1초 (해시 재계산 대기)
            giveup_timeout_ms: 8000,  // 8초
            max_tries: 10,
            max_check_attempts: 10,
            rw_tries: 100,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 확인 응답 타임아웃
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 검증 단계 타임아웃
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// 세션 포기 타임아웃
    pub fn giveup_timeout(&self) -> Duration {
        Duration::from_millis(self.giveup_timeout_ms)
    }

    /// 불안정한 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            ack_timeout_ms: 100,
            check_timeout_ms: 2000,
            giveup_timeout_ms: 10000,
            max_tries: 20,
            max_check_attempts: 10,
            rw_tries: 100,
        }
    }
}
