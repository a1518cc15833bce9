//! 송신자-수신자 종단간 전송 테스트
//!
//! 실제 UDP 대신 인메모리 파이프 위에서 전체 프로토콜을 돌린다

use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ufcp::{
    Config, Datagram, NastyDgmSocket, PipeDatagram, Receiver, Result, Sender, TransferOutcome,
};

fn quick_config() -> Config {
    Config {
        ack_timeout_ms: 30,
        check_timeout_ms: 300,
        giveup_timeout_ms: 3000,
        max_tries: 10,
        max_check_attempts: 10,
        rw_tries: 30,
    }
}

fn write_corpus(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let corpus = vec![
        ("empty".to_string(), Vec::new()),
        ("one".to_string(), vec![0x42]),
        (
            "exact-three-parts".to_string(),
            (0..1000u32).map(|i| (i % 251) as u8).collect(),
        ),
        (
            "bigger".to_string(),
            (0..12_345u32).map(|i| (i * 7 % 256) as u8).collect(),
        ),
    ];

    for (name, content) in &corpus {
        fs::write(dir.join(name), content).unwrap();
    }
    corpus
}

fn spawn_receiver<D: Datagram + 'static>(
    dir: &Path,
    file_nastiness: u8,
    config: Config,
    sock: D,
) -> tokio::task::JoinHandle<()> {
    let mut receiver = Receiver::new(dir, file_nastiness, config);
    tokio::spawn(async move {
        let _ = receiver.run(sock).await;
    })
}

#[tokio::test]
async fn test_directory_copy_clean_channel() {
    let (a, b) = PipeDatagram::pair();
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let corpus = write_corpus(src.path());

    let serve = spawn_receiver(dst.path(), 0, quick_config(), b);

    let mut sender = Sender::new(a, quick_config(), 0);
    sender.send_dir(src.path()).await.unwrap();
    serve.abort();

    assert_eq!(sender.stats().files_attempted, corpus.len() as u64);
    assert_eq!(sender.stats().files_committed, corpus.len() as u64);
    for (name, content) in &corpus {
        assert_eq!(&fs::read(dst.path().join(name)).unwrap(), content);
        assert!(!dst.path().join(format!("{}.TMP", name)).exists());
    }
}

// 홀수 번째 데이터그램을 보류했다가, 짝수 번째에 (현재×2, 보류분) 순서로
// 내보내는 래퍼. 중복과 순서 역전을 결정적으로 만든다. 보류분은 상대의
// 재전송이 다음 송신을 유발하므로 반드시 흘러나간다
struct SwapDupDatagram<D> {
    inner: D,
    pending: Mutex<Option<Vec<u8>>>,
}

impl<D> SwapDupDatagram<D> {
    fn new(inner: D) -> Self {
        Self {
            inner,
            pending: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<D: Datagram> Datagram for SwapDupDatagram<D> {
    async fn send(&self, buf: &[u8]) -> Result<()> {
        let prev = self.pending.lock().take();
        match prev {
            None => {
                *self.pending.lock() = Some(buf.to_vec());
            }
            Some(held) => {
                self.inner.send(buf).await?;
                self.inner.send(buf).await?;
                self.inner.send(&held).await?;
            }
        }
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        self.inner.recv(buf, timeout).await
    }
}

#[tokio::test]
async fn test_duplicated_and_reordered_delivery_still_commits() {
    let (a, b) = PipeDatagram::pair();
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    fs::write(src.path().join("data1"), &content).unwrap();

    let serve = spawn_receiver(dst.path(), 0, quick_config(), SwapDupDatagram::new(b));

    let mut sender = Sender::new(SwapDupDatagram::new(a), quick_config(), 0);
    let outcome = sender.send_file(src.path(), "data1").await.unwrap();
    serve.abort();

    assert_eq!(outcome, TransferOutcome::Success);
    assert_eq!(fs::read(dst.path().join("data1")).unwrap(), content);
}

#[tokio::test]
async fn test_file_nastiness_end_to_end() {
    let (a, b) = PipeDatagram::pair();
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let content: Vec<u8> = (0..4000u32).map(|i| (i * 13 % 256) as u8).collect();
    fs::write(src.path().join("data1"), &content).unwrap();

    let mut config = quick_config();
    config.rw_tries = 60;

    // 디스크 손상은 다수결 읽기와 검증 재시도로 복구된다
    let serve = spawn_receiver(dst.path(), 2, config.clone(), b);

    let mut sender = Sender::new(a, config, 2);
    let outcome = sender.send_file(src.path(), "data1").await.unwrap();
    serve.abort();

    assert_eq!(outcome, TransferOutcome::Success);
    assert_eq!(fs::read(dst.path().join("data1")).unwrap(), content);
}

#[tokio::test]
async fn test_nasty_network_commits_exactly_or_fails_cleanly() {
    let (a, b) = PipeDatagram::pair();
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let content: Vec<u8> = (0..3000u32).map(|i| (i * 31 % 256) as u8).collect();
    fs::write(src.path().join("data1"), &content).unwrap();

    let mut config = Config::lossy_network();
    config.giveup_timeout_ms = 3000;
    config.rw_tries = 30;

    let serve = spawn_receiver(dst.path(), 0, config.clone(), NastyDgmSocket::new(b, 3));

    let mut sender = Sender::new(NastyDgmSocket::new(a, 3), config, 0);
    let outcome = sender.send_file(src.path(), "data1").await.unwrap();
    serve.abort();

    // 손상 채널의 불변식: 최종 이름의 파일이 존재한다면 반드시 바이트가
    // 정확히 일치한다 (커밋은 해시 일치 뒤에만 일어난다). 성공을
    // 보고했다면 파일이 반드시 존재한다. 정리 응답만 유실된 경우에는
    // 파일이 있어도 성공 이외의 결과가 나올 수 있다
    let finalname = dst.path().join("data1");
    if finalname.exists() {
        assert_eq!(fs::read(&finalname).unwrap(), content, "outcome={}", outcome);
    }
    if outcome.is_success() {
        assert!(finalname.exists());
    }
}

#[tokio::test]
async fn test_two_files_back_to_back_reuse_receiver() {
    let (a, b) = PipeDatagram::pair();
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    fs::write(src.path().join("first"), b"first contents").unwrap();
    fs::write(src.path().join("second"), vec![3u8; 2048]).unwrap();

    let serve = spawn_receiver(dst.path(), 0, quick_config(), b);

    let mut sender = Sender::new(a, quick_config(), 0);
    assert!(sender
        .send_file(src.path(), "first")
        .await
        .unwrap()
        .is_success());
    assert!(sender
        .send_file(src.path(), "second")
        .await
        .unwrap()
        .is_success());
    serve.abort();

    assert_eq!(fs::read(dst.path().join("first")).unwrap(), b"first contents");
    assert_eq!(fs::read(dst.path().join("second")).unwrap(), vec![3u8; 2048]);
}
