//! 전송 통계

use std::time::{Duration, Instant};

/// 송신측 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 시도한 파일 수
    pub files_attempted: u64,

    /// 커밋까지 끝난 파일 수
    pub files_committed: u64,

    /// 실패한 파일 수
    pub files_failed: u64,

    /// 송신 패킷 수
    pub packets_sent: u64,

    /// 수신 패킷 수
    pub packets_received: u64,

    /// 재전송 횟수
    pub retries: u64,

    /// 타임아웃 횟수
    pub timeouts: u64,

    /// 송신 바이트
    pub bytes_sent: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_attempted: 0,
            files_committed: 0,
            files_failed: 0,
            packets_sent: 0,
            packets_received: 0,
            retries: 0,
            timeouts: 0,
            bytes_sent: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_sent as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Files: {}/{} ok | Packets: {} out, {} in | Retries: {} | Timeouts: {} | Throughput: {:.1} KB/s",
            self.elapsed().as_secs_f64(),
            self.files_committed,
            self.files_attempted,
            self.packets_sent,
            self.packets_received,
            self.retries,
            self.timeouts,
            self.throughput() / 1000.0,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신측 서비스 통계
#[derive(Debug, Clone, Default)]
pub struct ServeStats {
    /// 시작된 세션 수
    pub sessions: u64,

    /// 커밋된 파일 수
    pub commits: u64,

    /// 폐기된 파일 수
    pub discards: u64,

    /// 캐시로 재전송한 응답 수
    pub cache_replays: u64,

    /// 보낸 오류 패킷 수
    pub error_packets: u64,

    /// 타임아웃으로 인한 세션 리셋 수
    pub resets: u64,
}

impl ServeStats {
    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Sessions: {} | Commits: {} | Discards: {} | Cache replays: {} | Error packets: {} | Resets: {}",
            self.sessions,
            self.commits,
            self.discards,
            self.cache_replays,
            self.error_packets,
            self.resets,
        )
    }
}
