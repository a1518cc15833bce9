//! 데이터그램 전송 계층
//!
//! - [`Datagram`]: send / recv(timeout) 두 가지 원시 연산
//! - [`UdpDatagram`]: 실제 UDP 소켓 (클라이언트/서버 모드)
//! - [`PipeDatagram`]: 테스트용 인메모리 파이프
//! - [`NastyDgmSocket`]: 송신 경로에 드롭/중복/재정렬/손상을 주입하는 래퍼
//! - [`Transport`]: 패킷 단위 읽기/쓰기, 기대 필터, 송신-재시도 루프

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::packet::{Packet, PacketExpect};
use crate::stats::TransferStats;
use crate::{Error, Result, MAX_DGM_SIZE};

/// 네트워크 nastiness 최대 레벨
pub const MAX_NET_NASTINESS: u8 = 4;

/// 데이터그램 소켓 추상화
///
/// 연결 개념이 없고, 전달 보장도 없다. 재전송과 중복 처리는 상위
/// 계층의 몫이다
#[async_trait]
pub trait Datagram: Send + Sync {
    /// 데이터그램 하나 송신
    async fn send(&self, buf: &[u8]) -> Result<()>;

    /// 데이터그램 하나 수신. None = 타임아웃
    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>>;
}

/// UDP 데이터그램 소켓
///
/// 클라이언트 모드는 상대가 고정이고, 서버 모드는 마지막으로 수신한
/// 주소로 응답한다
pub struct UdpDatagram {
    socket: UdpSocket,
    peer: Mutex<Option<SocketAddr>>,
}

impl UdpDatagram {
    /// 클라이언트 소켓: 임의 포트 바인드, 서버 주소 고정
    pub async fn client(server: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            peer: Mutex::new(Some(server)),
        })
    }

    /// 서버 소켓: 지정 주소 바인드
    pub async fn server(bind: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind).await?;
        Ok(Self {
            socket,
            peer: Mutex::new(None),
        })
    }

    /// 바인드된 로컬 주소
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Datagram for UdpDatagram {
    async fn send(&self, buf: &[u8]) -> Result<()> {
        let peer = { *self.peer.lock() }.ok_or(Error::PeerMissing)?;
        self.socket.send_to(buf, peer).await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((len, addr))) => {
                *self.peer.lock() = Some(addr);
                Ok(Some(len))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }
}

/// 테스트용 인메모리 데이터그램 파이프
///
/// [`PipeDatagram::pair`]로 서로 연결된 양끝을 만든다. 상대가 닫히면
/// 수신은 타임아웃처럼 동작한다
pub struct PipeDatagram {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl PipeDatagram {
    /// 연결된 파이프 쌍 생성
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        (
            Self {
                tx: a_tx,
                rx: tokio::sync::Mutex::new(b_rx),
            },
            Self {
                tx: b_tx,
                rx: tokio::sync::Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl Datagram for PipeDatagram {
    async fn send(&self, buf: &[u8]) -> Result<()> {
        // 상대가 이미 닫혔으면 데이터그램답게 조용히 버린다
        let _ = self.tx.send(buf.to_vec());
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(dgm)) => {
                let n = dgm.len().min(buf.len());
                buf[..n].copy_from_slice(&dgm[..n]);
                Ok(Some(n))
            }
            Ok(None) | Err(_) => Ok(None),
        }
    }
}

// 송신 데이터그램 하나에 적용할 동작
enum NastyAction {
    Pass,
    Drop,
    Dup,
    Hold,
}

/// 네트워크 손상 시뮬레이션 래퍼
///
/// nastiness 0이면 그대로 통과. 1~4에서는 송신 데이터그램을 확률적으로
/// 버리거나, 두 번 보내거나, 다음 송신 뒤로 미루거나 (재정렬), 바이트를
/// 뒤집는다. 확률은 재전송으로 전진이 보장될 만큼만 키운다
pub struct NastyDgmSocket<D> {
    inner: D,
    nastiness: u8,
    held: Mutex<Option<Vec<u8>>>,
}

impl<D: Datagram> NastyDgmSocket<D> {
    /// 래퍼 생성
    pub fn new(inner: D, nastiness: u8) -> Self {
        Self {
            inner,
            nastiness: nastiness.min(MAX_NET_NASTINESS),
            held: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<D: Datagram> Datagram for NastyDgmSocket<D> {
    async fn send(&self, buf: &[u8]) -> Result<()> {
        if self.nastiness == 0 {
            return self.inner.send(buf).await;
        }

        let mut dgm = buf.to_vec();
        let action = {
            let mut rng = rand::thread_rng();
            let p = f64::from(self.nastiness) * 0.02;

            if rng.gen_bool(p) && !dgm.is_empty() {
                let i = rng.gen_range(0..dgm.len());
                dgm[i] ^= 1 << rng.gen_range(0..8);
            }

            if rng.gen_bool(p) {
                NastyAction::Drop
            } else if rng.gen_bool(p) {
                NastyAction::Dup
            } else if rng.gen_bool(p) {
                NastyAction::Hold
            } else {
                NastyAction::Pass
            }
        };

        // 이전에 보류한 데이터그램은 이번 송신 뒤에 내보낸다 (순서 역전)
        let prev = self.held.lock().take();

        match action {
            NastyAction::Pass => self.inner.send(&dgm).await?,
            NastyAction::Drop => trace!("nasty: 데이터그램 드롭"),
            NastyAction::Dup => {
                self.inner.send(&dgm).await?;
                self.inner.send(&dgm).await?;
            }
            NastyAction::Hold => {
                *self.held.lock() = Some(dgm);
            }
        }

        if let Some(prev) = prev {
            self.inner.send(&prev).await?;
        }

        Ok(())
    }

    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        self.inner.recv(buf, timeout).await
    }
}

/// 패킷 단위 송수신
///
/// 소켓과 현재 수신 타임아웃, 네트워크 카운터를 소유한다
pub struct Transport<D> {
    sock: D,
    timeout: Duration,
    stats: TransferStats,
}

impl<D: Datagram> Transport<D> {
    /// 새 전송 계층 생성
    pub fn new(sock: D, timeout: Duration) -> Self {
        Self {
            sock,
            timeout,
            stats: TransferStats::new(),
        }
    }

    /// 수신 타임아웃 변경
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// 통계 참조
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// 통계 가변 참조
    pub fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    /// 패킷 하나 읽기. None = 타임아웃
    /// 헤더에 못 미치는 데이터그램은 조용히 폐기하고 계속 기다린다
    pub async fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut buf = [0u8; MAX_DGM_SIZE];

        loop {
            match self.sock.recv(&mut buf, self.timeout).await? {
                Some(len) => match Packet::from_bytes(&buf[..len]) {
                    Some(pckt) => {
                        self.stats.packets_received += 1;
                        return Ok(Some(pckt));
                    }
                    None => {
                        debug!(len, "헤더 미달 데이터그램 폐기");
                        continue;
                    }
                },
                None => {
                    self.stats.timeouts += 1;
                    return Ok(None);
                }
            }
        }
    }

    /// 패킷 하나 쓰기
    pub async fn write_packet(&mut self, pckt: &Packet) -> Result<()> {
        let bytes = pckt.to_bytes();
        self.sock.send(&bytes).await?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    /// 기대에 맞는 패킷이 올 때까지 읽기
    /// 맞지 않는 패킷은 조용히 폐기. None = 타임아웃
    pub async fn read_expected(&mut self, expect: PacketExpect) -> Result<Option<Packet>> {
        loop {
            match self.read_packet().await? {
                Some(pckt) if expect.matches(&pckt) => return Ok(Some(pckt)),
                Some(pckt) => {
                    trace!(
                        fileid = pckt.fileid,
                        flags = pckt.flags,
                        seqno = pckt.seqno,
                        "기대 밖 패킷 폐기"
                    );
                }
                None => return Ok(None),
            }
        }
    }

    /// 송신 후 기대 응답을 기다리고, 타임아웃이면 재전송
    /// tries회를 다 쓰면 None
    pub async fn write_with_retries(
        &mut self,
        out: &Packet,
        expect: PacketExpect,
        tries: u32,
    ) -> Result<Option<Packet>> {
        for attempt in 0..tries.max(1) {
            if attempt > 0 {
                self.stats.retries += 1;
            }

            self.write_packet(out).await?;
            if let Some(pckt) = self.read_expected(expect).await? {
                return Ok(Some(pckt));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FILE_FL, REQ_FL};
    use crate::{NULL_FILEID, NULL_SEQNO};

    const SHORT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_pipe_roundtrip() {
        let (a, b) = PipeDatagram::pair();
        let mut ta = Transport::new(a, SHORT);
        let mut tb = Transport::new(b, SHORT);

        let pckt = Packet::new(1, FILE_FL, 2, b"hello");
        ta.write_packet(&pckt).await.unwrap();

        assert_eq!(tb.read_packet().await.unwrap(), Some(pckt));
    }

    #[tokio::test]
    async fn test_read_timeout_returns_none() {
        let (a, _b) = PipeDatagram::pair();
        let mut ta = Transport::new(a, SHORT);

        assert_eq!(ta.read_packet().await.unwrap(), None);
        assert_eq!(ta.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_read_expected_drops_unmatched() {
        let (a, b) = PipeDatagram::pair();
        let mut ta = Transport::new(a, SHORT);
        let mut tb = Transport::new(b, SHORT);

        tb.write_packet(&Packet::new(9, REQ_FL, 5, b"junk")).await.unwrap();
        let wanted = Packet::new(1, FILE_FL, 2, b"");
        tb.write_packet(&wanted).await.unwrap();

        let expect = PacketExpect::new(1, FILE_FL, 2);
        assert_eq!(ta.read_expected(expect).await.unwrap(), Some(wanted));
    }

    #[tokio::test]
    async fn test_short_datagram_is_discarded() {
        let (a, b) = PipeDatagram::pair();
        let mut ta = Transport::new(a, SHORT);

        b.send(&[1, 2, 3]).await.unwrap();
        assert_eq!(ta.read_packet().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_with_retries_until_response() {
        let (a, b) = PipeDatagram::pair();
        let mut ta = Transport::new(a, SHORT);

        // 처음 두 요청은 무시하고 세 번째에만 응답하는 상대
        let responder = tokio::spawn(async move {
            let mut tb = Transport::new(b, Duration::from_secs(1));
            for i in 0..3 {
                let req = tb.read_packet().await.unwrap().unwrap();
                if i == 2 {
                    let ack = Packet::control(req.fileid, FILE_FL, req.seqno);
                    tb.write_packet(&ack).await.unwrap();
                }
            }
        });

        let out = Packet::new(4, FILE_FL, 7, b"part");
        let expect = PacketExpect::new(4, FILE_FL, 7);
        let resp = ta.write_with_retries(&out, expect, 5).await.unwrap();

        assert!(resp.is_some());
        assert_eq!(ta.stats().retries, 2);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_with_retries_gives_up() {
        let (a, _b) = PipeDatagram::pair();
        let mut ta = Transport::new(a, SHORT);

        let out = Packet::control(1, FILE_FL, 1);
        let expect = PacketExpect::new(1, FILE_FL, 1);
        assert_eq!(ta.write_with_retries(&out, expect, 3).await.unwrap(), None);
        assert_eq!(ta.stats().packets_sent, 3);
    }

    #[tokio::test]
    async fn test_nasty_zero_is_passthrough() {
        let (a, b) = PipeDatagram::pair();
        let nasty = NastyDgmSocket::new(a, 0);
        let mut ta = Transport::new(nasty, SHORT);
        let mut tb = Transport::new(b, SHORT);

        for seqno in 0..20 {
            let pckt = Packet::new(1, FILE_FL, seqno, b"x");
            ta.write_packet(&pckt).await.unwrap();
            assert_eq!(tb.read_packet().await.unwrap(), Some(pckt));
        }
    }

    #[tokio::test]
    async fn test_expect_wildcards() {
        let pckt = Packet::new(8, REQ_FL | FILE_FL, 3, b"");
        assert!(PacketExpect::new(NULL_FILEID, REQ_FL, NULL_SEQNO).matches(&pckt));
    }
}
