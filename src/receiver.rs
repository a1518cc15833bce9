//! 수신자
//!
//! IDLE → FILE → CHECK → FIN 단일 세션 상태 기계.
//!
//! - 세션당 하나의 파일만 서비스한다. 다른 fileid의 패킷에는 오류 패킷으로
//!   응답하고 상태를 바꾸지 않는다
//! - 비오류 입력마다 보낸 응답을 캐시에 남겨, 같은 패킷이 다시 오면
//!   상태 변화 없이 동일 응답을 재전송한다 (멱등 재시도 서비스)
//! - 커밋은 CHECK|POS를 받았을 때의 rename 한 번뿐이다
//! - 일정 시간 아무 패킷도 없으면 조용히 IDLE로 복귀한다. 임시 파일은
//!   사후 분석용으로 남긴다

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::filebuf::FileBuffer;
use crate::hash::Hash;
use crate::packet::{self, Packet, CHECK_FL, FILE_FL, FIN_FL, NEG_FL, POS_FL, REQ_FL};
use crate::stats::ServeStats;
use crate::transport::{Datagram, Transport};
use crate::{Result, NULL_SEQNO};

// 수신자가 발급하는 시작 seqno. NULL_SEQNO(0)는 기대 매칭에서
// "아무 값"을 뜻하므로 데이터 seqno는 그 위에서 시작한다
const INIT_SEQNO: i32 = 1;

/// FILE/CHECK 상태에서 유지되는 세션 정보
#[derive(Debug)]
struct SessionInfo {
    fileid: i32,
    fname: String,
    fullname: PathBuf,
    tmpname: PathBuf,
    filesize: usize,
    init_seqno: i32,
    parts: BTreeSet<Packet>,
}

/// 세션 상태. 각 상태는 그 상태에 의미 있는 필드만 갖는다
#[derive(Debug)]
enum Session {
    Idle,
    File(SessionInfo),
    Check(SessionInfo),
    Fin { fileid: i32 },
}

impl Session {
    fn fileid(&self) -> Option<i32> {
        match self {
            Session::Idle => None,
            Session::File(info) | Session::Check(info) => Some(info.fileid),
            Session::Fin { fileid } => Some(*fileid),
        }
    }
}

/// 수신자
pub struct Receiver {
    dir: PathBuf,
    file_nastiness: u8,
    config: Config,
    session: Session,
    cache: HashMap<Packet, Packet>,
    next_fileid: i32,
    stats: ServeStats,
}

impl Receiver {
    /// 새 수신자 생성
    pub fn new(dir: &Path, file_nastiness: u8, config: Config) -> Self {
        Self {
            dir: dir.to_path_buf(),
            file_nastiness,
            config,
            session: Session::Idle,
            cache: HashMap::new(),
            next_fileid: 0,
            stats: ServeStats::default(),
        }
    }

    /// 서비스 통계
    pub fn stats(&self) -> &ServeStats {
        &self.stats
    }

    /// 메인 서비스 루프. 소켓 에러가 나야만 끝난다
    pub async fn run<D: Datagram>(&mut self, sock: D) -> Result<()> {
        let mut transport = Transport::new(sock, self.config.giveup_timeout());
        info!(dir = %self.dir.display(), "수신 대기 시작");

        loop {
            match transport.read_packet().await? {
                Some(pckt) => {
                    if let Some(resp) = self.handle_packet(pckt) {
                        transport.write_packet(&resp).await?;
                    }
                }
                None => self.on_timeout(),
            }
        }
    }

    /// 패킷 하나 처리. 반환값이 보낼 응답
    pub fn handle_packet(&mut self, pckt: Packet) -> Option<Packet> {
        // 같은 세션에서 이미 처리한 패킷이면 같은 응답을 다시 보낸다
        if let Some(resp) = self.cache.get(&pckt) {
            self.stats.cache_replays += 1;
            debug!(fileid = pckt.fileid, seqno = pckt.seqno, "캐시 응답 재전송");
            return Some(resp.clone());
        }

        let session = std::mem::replace(&mut self.session, Session::Idle);
        let (next, resp) = self.transition(session, &pckt);
        self.session = next;

        if let Some(ref resp) = resp {
            if resp.is_error() {
                self.stats.error_packets += 1;
            } else {
                self.cache.insert(pckt, resp.clone());
            }
        }
        resp
    }

    /// 수신 타임아웃: 세션을 버리고 IDLE로. 응답 없음
    pub fn on_timeout(&mut self) {
        if !matches!(self.session, Session::Idle) {
            warn!("세션 타임아웃, IDLE로 복귀");
            self.stats.resets += 1;
        }
        self.session = Session::Idle;
        self.cache.clear();
    }

    // 상태 전이표 본체
    fn transition(&mut self, session: Session, pckt: &Packet) -> (Session, Option<Packet>) {
        match session {
            Session::Idle if pckt.flags == REQ_FL | FILE_FL => self.start_session(pckt),

            Session::Idle => (Session::Idle, Some(Packet::error_packet())),

            // 세션 중 다른 fileid는 거절, 진행 중인 상태는 보존
            s if s.fileid() != Some(pckt.fileid) => (s, Some(Packet::error_packet())),

            Session::File(mut info) if pckt.flags == FILE_FL => {
                let ack = Packet::control(info.fileid, FILE_FL, pckt.seqno);
                info.parts.insert(pckt.clone());
                (Session::File(info), Some(ack))
            }

            // 첫 검증 요청과 재검증 요청 모두 임시 파일을 다시 저장하고
            // 다시 읽어 해시를 계산한다. 쓰기 손상에 새 기회를 준다
            Session::File(info) | Session::Check(info)
                if pckt.flags == REQ_FL | CHECK_FL =>
            {
                let resp = self.save_and_hash(&info, pckt.seqno);
                (Session::Check(info), Some(resp))
            }

            Session::Check(info) if pckt.flags == CHECK_FL | POS_FL => {
                let resp = self.commit(&info);
                (Session::Fin { fileid: info.fileid }, Some(resp))
            }

            Session::Check(info) if pckt.flags == CHECK_FL | NEG_FL => {
                let resp = self.discard(&info);
                (Session::Fin { fileid: info.fileid }, Some(resp))
            }

            Session::Fin { fileid } if pckt.flags == FIN_FL => {
                self.cache.clear();
                debug!(fileid, "세션 종료");
                (Session::Idle, Some(Packet::control(fileid, FIN_FL, NULL_SEQNO)))
            }

            other => (other, Some(Packet::error_packet())),
        }
    }

    // IDLE에서 REQ|FILE 수신: 새 fileid 발급, 경로 준비, 시작 seqno 응답
    fn start_session(&mut self, pckt: &Packet) -> (Session, Option<Packet>) {
        // 발신측 경로 조작 방지: 마지막 경로 요소만 사용
        let requested = pckt.fname();
        let fname = match Path::new(&requested).file_name().and_then(|s| s.to_str()) {
            Some(base) if !base.is_empty() => base.to_string(),
            _ => {
                warn!(requested = %requested, "잘못된 파일 이름 요청 거절");
                return (Session::Idle, Some(Packet::error_packet()));
            }
        };

        self.cache.clear();
        self.next_fileid += 1;
        let fileid = self.next_fileid;

        let fullname = self.dir.join(&fname);
        let tmpname = self.dir.join(format!("{}.TMP", fname));
        let filesize = pckt.seqno.max(0) as usize;

        self.stats.sessions += 1;
        info!(fileid, file = %fname, filesize, "파일 수신 시작");

        let resp = Packet::control(fileid, REQ_FL | FILE_FL | POS_FL, INIT_SEQNO);
        let info = SessionInfo {
            fileid,
            fname,
            fullname,
            tmpname,
            filesize,
            init_seqno: INIT_SEQNO,
            parts: BTreeSet::new(),
        };
        (Session::File(info), Some(resp))
    }

    // 받은 파트를 임시 파일로 저장하고, 다시 읽어 해시를 계산한다
    fn save_and_hash(&mut self, info: &SessionInfo, attempt: i32) -> Packet {
        match self.save_file(info) {
            Ok(hash) => {
                debug!(fileid = info.fileid, attempt, %hash, "임시 파일 해시 응답");
                Packet::new(
                    info.fileid,
                    REQ_FL | CHECK_FL | POS_FL,
                    attempt,
                    hash.as_bytes(),
                )
            }
            Err(e) => {
                warn!(fileid = info.fileid, error = %e, "임시 파일 저장/해시 실패");
                Packet::control(info.fileid, REQ_FL | CHECK_FL | NEG_FL, attempt)
            }
        }
    }

    fn save_file(&self, info: &SessionInfo) -> Result<Hash> {
        let merged = packet::merge_packets(info.parts.iter(), info.init_seqno, info.filesize);
        FileBuffer::from_bytes(&info.tmpname, merged, self.file_nastiness).write()?;

        // 디스크에 실제로 남은 내용을 다시 읽어 해시한다. 메모리 버퍼를
        // 해시하면 쓰기 경로 손상을 놓친다
        let tmp = FileBuffer::read(&info.tmpname, self.file_nastiness, self.config.rw_tries)?;
        Ok(tmp.hash())
    }

    // CHECK|POS: 임시 파일을 최종 이름으로 rename
    fn commit(&mut self, info: &SessionInfo) -> Packet {
        match fs::rename(&info.tmpname, &info.fullname) {
            Ok(()) => {
                self.stats.commits += 1;
                info!(fileid = info.fileid, file = %info.fname, "커밋 완료");
                Packet::control(info.fileid, CHECK_FL | FIN_FL | POS_FL, NULL_SEQNO)
            }
            Err(e) => {
                warn!(fileid = info.fileid, error = %e, "rename 실패");
                Packet::control(info.fileid, CHECK_FL | FIN_FL | NEG_FL, NULL_SEQNO)
            }
        }
    }

    // CHECK|NEG: 임시 파일 제거
    fn discard(&mut self, info: &SessionInfo) -> Packet {
        match fs::remove_file(&info.tmpname) {
            Ok(()) => {
                self.stats.discards += 1;
                info!(fileid = info.fileid, file = %info.fname, "임시 파일 폐기");
                Packet::control(info.fileid, CHECK_FL | FIN_FL | POS_FL, NULL_SEQNO)
            }
            Err(e) => {
                warn!(fileid = info.fileid, error = %e, "임시 파일 제거 실패");
                Packet::control(info.fileid, CHECK_FL | FIN_FL | NEG_FL, NULL_SEQNO)
            }
        }
    }
}
