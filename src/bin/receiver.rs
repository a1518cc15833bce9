//! UFCP 수신자
//!
//! 송신자가 보내는 파일을 대상 디렉터리에 기록한다. 한 번에 한 세션만
//! 서비스하며, 종단간 검증이 성공한 파일만 최종 이름으로 rename된다
//!
//! 사용법:
//!   receiver <networknastiness> <filenastiness> <targetdir>
//!
//! - networknastiness: 0~4
//! - filenastiness: 0~5
//! - targetdir: 대상 디렉터리. 시작 시 비어 있어야 한다

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ufcp::nastyfile::MAX_FILE_NASTINESS;
use ufcp::transport::MAX_NET_NASTINESS;
use ufcp::{Config, NastyDgmSocket, Receiver, UdpDatagram, DEFAULT_PORT};

fn usage(progname: &str, exit_code: i32) -> ! {
    eprintln!(
        "usage: {} <networknastiness> <filenastiness> <targetdir>",
        progname
    );
    process::exit(exit_code);
}

fn parse_nastiness(arg: &str, max: u8, what: &str, progname: &str) -> u8 {
    match arg.parse::<u8>() {
        Ok(n) if n <= max => n,
        _ => {
            eprintln!("error: <{}> must be an integer in 0..={}", what, max);
            usage(progname, 4);
        }
    }
}

fn bind_port() -> u16 {
    std::env::var("UFCP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let args: Vec<String> = std::env::args().collect();
    let progname = args.first().map(String::as_str).unwrap_or("receiver");

    if args.len() != 4 {
        usage(progname, 1);
    }

    let net_nastiness = parse_nastiness(&args[1], MAX_NET_NASTINESS, "networknastiness", progname);
    let file_nastiness = parse_nastiness(&args[2], MAX_FILE_NASTINESS, "filenastiness", progname);

    let dir = PathBuf::from(&args[3]);
    if !dir.is_dir() {
        eprintln!("error: '{}' is not a directory", dir.display());
        process::exit(8);
    }
    match std::fs::read_dir(&dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                warn!(dir = %dir.display(), "대상 디렉터리가 비어 있지 않음");
            }
        }
        Err(_) => {
            eprintln!("error: '{}' is not readable", dir.display());
            process::exit(8);
        }
    }

    let bind: SocketAddr = SocketAddr::from(([0, 0, 0, 0], bind_port()));
    info!(%bind, net_nastiness, file_nastiness, dir = %dir.display(), "UFCP receiver starting");

    let sock = match UdpDatagram::server(bind).await {
        Ok(sock) => NastyDgmSocket::new(sock, net_nastiness),
        Err(e) => {
            error!(error = %e, "소켓 바인드 실패");
            process::exit(2);
        }
    };

    let mut receiver = Receiver::new(&dir, file_nastiness, Config::default());
    if let Err(e) = receiver.run(sock).await {
        error!(error = %e, "수신 중단");
        error!("{}", receiver.stats().summary());
        process::exit(2);
    }
}
