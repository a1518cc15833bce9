//! 송신자
//!
//! 파일 하나의 전송 순서:
//! 1. REQ|FILE 요청으로 fileid와 시작 seqno 할당받기
//! 2. 파일을 MAX_WRITE_LEN 청크로 쪼개 순서대로 전송, 청크마다 확인 응답
//! 3. 종단간 검증: 수신자의 임시 파일 해시를 받아 로컬 재읽기 해시와 비교
//! 4. CHECK|POS (커밋) 또는 CHECK|NEG (폐기) 보고
//! 5. 최종 FIN. 유실되어도 수신자 타임아웃이 복구한다

use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::filebuf::FileBuffer;
use crate::hash::Hash;
use crate::packet::{self, Packet, PacketExpect, CHECK_FL, FILE_FL, FIN_FL, NEG_FL, POS_FL, REQ_FL};
use crate::stats::TransferStats;
use crate::transport::{Datagram, Transport};
use crate::{Error, Result, NULL_FILEID, NULL_SEQNO};

/// 파일 하나의 전송 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// 수신측 커밋까지 완료
    Success,
    /// 전송 요청이 거부되었거나 응답 없음
    RequestUnsuccessful,
    /// 데이터 청크 전송 실패
    SendFailed,
    /// 검증 요청이 거부됨
    CheckDenied,
    /// 검증 단계 응답 없음
    CheckTimeout,
    /// 모든 검증 시도에서 해시 불일치, 수신측 폐기 지시
    CheckFailed,
    /// 수신측 커밋/폐기 정리 실패
    CleanupError,
}

impl TransferOutcome {
    /// 성공 여부
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferOutcome::Success => "success",
            TransferOutcome::RequestUnsuccessful => "request unsuccessful",
            TransferOutcome::SendFailed => "send failed",
            TransferOutcome::CheckDenied => "check denied",
            TransferOutcome::CheckTimeout => "check timeout",
            TransferOutcome::CheckFailed => "check failed",
            TransferOutcome::CleanupError => "cleanup error",
        };
        write!(f, "{}", s)
    }
}

// 종단간 검증 루프의 결과
enum CheckStatus {
    Matched,
    Mismatched,
    Denied,
    TimedOut,
}

/// 송신자
pub struct Sender<D> {
    transport: Transport<D>,
    config: Config,
    file_nastiness: u8,
}

impl<D: Datagram> Sender<D> {
    /// 새 송신자 생성
    pub fn new(sock: D, config: Config, file_nastiness: u8) -> Self {
        let timeout = config.ack_timeout();
        Self {
            transport: Transport::new(sock, timeout),
            config,
            file_nastiness,
        }
    }

    /// 전송 통계
    pub fn stats(&self) -> &TransferStats {
        self.transport.stats()
    }

    /// 파일 하나 전송
    ///
    /// 프로토콜 수준의 실패는 Ok(outcome)으로 분류해 돌려주고,
    /// 소켓/파일 계층의 예외만 Err로 전파한다
    pub async fn send_file(&mut self, dir: &Path, fname: &str) -> Result<TransferOutcome> {
        let fullname = dir.join(fname);
        let fbuf = FileBuffer::read(&fullname, self.file_nastiness, self.config.rw_tries)?;

        let filesize = fbuf.len();
        if filesize > i32::MAX as usize {
            return Err(Error::FileTooLarge {
                path: fullname,
                len: filesize as u64,
            });
        }

        // 1. 전송 요청: seqno 자리에 파일 크기, 페이로드에 이름
        let mut name_data = fname.as_bytes().to_vec();
        name_data.push(0);
        let req = Packet::new(NULL_FILEID, REQ_FL | FILE_FL, filesize as i32, &name_data);
        let expect = PacketExpect::new(NULL_FILEID, REQ_FL | FILE_FL, NULL_SEQNO);

        let resp = match self
            .transport
            .write_with_retries(&req, expect, self.config.max_tries)
            .await?
        {
            Some(resp) => resp,
            None => {
                warn!(file = %fname, "전송 요청 응답 없음");
                return Ok(TransferOutcome::RequestUnsuccessful);
            }
        };
        if resp.has_flags(NEG_FL) {
            return Ok(TransferOutcome::RequestUnsuccessful);
        }

        let fileid = resp.fileid;
        let init_seqno = resp.seqno;
        debug!(file = %fname, fileid, init_seqno, filesize, "세션 시작");

        // 2. 청크 스트리밍: 청크마다 (fileid, FILE, seqno) 에코 확인
        let parts = packet::split_file(fileid, FILE_FL, init_seqno, fbuf.bytes());
        for part in &parts {
            let expect = PacketExpect::new(fileid, FILE_FL, part.seqno);
            if self
                .transport
                .write_with_retries(part, expect, self.config.max_tries)
                .await?
                .is_none()
            {
                warn!(file = %fname, fileid, seqno = part.seqno, "청크 확인 응답 없음");
                return Ok(TransferOutcome::SendFailed);
            }
        }

        // 3. 종단간 검증. 수신자가 해시를 다시 계산할 시간을 주기 위해
        //    타임아웃을 늘렸다가 반드시 되돌린다
        self.transport.set_timeout(self.config.check_timeout());
        let status = self.run_check(fileid, &fullname).await;
        self.transport.set_timeout(self.config.ack_timeout());

        let matched = match status? {
            CheckStatus::Matched => true,
            CheckStatus::Mismatched => false,
            CheckStatus::Denied => return Ok(TransferOutcome::CheckDenied),
            CheckStatus::TimedOut => return Ok(TransferOutcome::CheckTimeout),
        };

        // 4. 결과 보고: POS는 커밋, NEG는 임시 파일 폐기
        let report_flags = if matched {
            CHECK_FL | POS_FL
        } else {
            CHECK_FL | NEG_FL
        };
        let report = Packet::control(fileid, report_flags, NULL_SEQNO);
        let expect = PacketExpect::new(fileid, CHECK_FL | FIN_FL, NULL_SEQNO);

        let cleanup_failed = match self
            .transport
            .write_with_retries(&report, expect, self.config.max_tries)
            .await?
        {
            Some(resp) => resp.has_flags(NEG_FL),
            None => return Ok(TransferOutcome::CheckTimeout),
        };

        // 5. 최종 FIN. 응답 유실은 허용: 수신자는 자체 타임아웃으로 복귀
        let fin = Packet::control(fileid, FIN_FL, NULL_SEQNO);
        let expect = PacketExpect::new(fileid, FIN_FL, NULL_SEQNO);
        if self
            .transport
            .write_with_retries(&fin, expect, self.config.max_tries)
            .await?
            .is_none()
        {
            debug!(fileid, "FIN 응답 없음 (허용)");
        }

        if cleanup_failed {
            warn!(file = %fname, fileid, "수신측 정리 실패");
            return Ok(TransferOutcome::CleanupError);
        }

        if matched {
            info!(file = %fname, fileid, filesize, "전송 및 검증 완료");
            Ok(TransferOutcome::Success)
        } else {
            warn!(file = %fname, fileid, "해시 불일치로 폐기");
            Ok(TransferOutcome::CheckFailed)
        }
    }

    // 검증 시도 루프: 시도마다 수신자 해시를 받고 로컬 파일을 다시 읽어
    // 비교한다. 쓰기 경로 손상은 수신자의 재저장으로, 읽기 경로 손상은
    // 양쪽의 다수결 재읽기로 결국 일치에 도달한다
    async fn run_check(&mut self, fileid: i32, fullname: &Path) -> Result<CheckStatus> {
        for attempt in 0..self.config.max_check_attempts as i32 {
            let req = Packet::control(fileid, REQ_FL | CHECK_FL, attempt);
            let expect = PacketExpect::new(fileid, REQ_FL | CHECK_FL, attempt);

            let resp = match self
                .transport
                .write_with_retries(&req, expect, self.config.max_tries)
                .await?
            {
                Some(resp) => resp,
                None => return Ok(CheckStatus::TimedOut),
            };
            if resp.has_flags(NEG_FL) {
                return Ok(CheckStatus::Denied);
            }

            let remote = match Hash::from_bytes(resp.data()) {
                Some(hash) => hash,
                None => {
                    debug!(fileid, attempt, "손상된 해시 응답, 다음 시도");
                    continue;
                }
            };

            let local = FileBuffer::read(fullname, self.file_nastiness, self.config.rw_tries)?
                .hash();
            if local == remote {
                return Ok(CheckStatus::Matched);
            }

            debug!(fileid, attempt, %local, %remote, "해시 불일치, 재시도");
        }

        Ok(CheckStatus::Mismatched)
    }

    /// 디렉터리의 일반 파일을 이름순으로 전부 전송
    /// 하위 디렉터리와 특수 파일은 무시한다
    pub async fn send_dir(&mut self, dir: &Path) -> Result<()> {
        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!(name = ?raw, "UTF-8이 아닌 파일 이름, 건너뜀"),
            }
        }
        names.sort();

        info!(dir = %dir.display(), files = names.len(), "디렉터리 전송 시작");

        for fname in &names {
            self.transport.stats_mut().files_attempted += 1;

            match self.send_file(dir, fname).await {
                Ok(outcome) if outcome.is_success() => {
                    self.transport.stats_mut().files_committed += 1;
                }
                Ok(outcome) => {
                    self.transport.stats_mut().files_failed += 1;
                    warn!(file = %fname, %outcome, "전송 실패");
                }
                Err(e @ (Error::InvalidFile { .. }
                | Error::FileTooLarge { .. }
                | Error::ReadUnstable { .. })) => {
                    self.transport.stats_mut().files_failed += 1;
                    warn!(file = %fname, error = %e, "파일을 읽을 수 없어 건너뜀");
                }
                Err(e) => return Err(e),
            }
        }

        info!("{}", self.transport.stats().summary());
        Ok(())
    }
}
