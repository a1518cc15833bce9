//! UFCP 송신자
//!
//! 소스 디렉터리의 일반 파일을 수신자에게 복사한다
//!
//! 사용법:
//!   sender <server> <networknastiness> <filenastiness> <srcdir>
//!
//! - server: 수신자 주소. host 또는 host:port
//! - networknastiness: 0~4
//! - filenastiness: 0~5
//! - srcdir: 소스 디렉터리 (하위 디렉터리는 무시)

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process;

use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use ufcp::nastyfile::MAX_FILE_NASTINESS;
use ufcp::transport::MAX_NET_NASTINESS;
use ufcp::{Config, NastyDgmSocket, Sender, UdpDatagram, DEFAULT_PORT};

fn usage(progname: &str, exit_code: i32) -> ! {
    eprintln!(
        "usage: {} <server> <networknastiness> <filenastiness> <srcdir>",
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

fn receiver_port() -> u16 {
    std::env::var("UFCP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

fn resolve_server(arg: &str) -> Option<SocketAddr> {
    if let Ok(addr) = arg.parse::<SocketAddr>() {
        return Some(addr);
    }

    // 포트가 없으면 기본 포트를 붙여 이름 해석
    let with_port = if arg.contains(':') {
        arg.to_string()
    } else {
        format!("{}:{}", arg, receiver_port())
    };
    with_port.to_socket_addrs().ok()?.next()
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let args: Vec<String> = std::env::args().collect();
    let progname = args.first().map(String::as_str).unwrap_or("sender");

    if args.len() != 5 {
        usage(progname, 1);
    }

    let net_nastiness = parse_nastiness(&args[2], MAX_NET_NASTINESS, "networknastiness", progname);
    let file_nastiness = parse_nastiness(&args[3], MAX_FILE_NASTINESS, "filenastiness", progname);

    let dir = PathBuf::from(&args[4]);
    if !dir.is_dir() {
        eprintln!("error: '{}' is not a directory", dir.display());
        process::exit(8);
    }

    let server = match resolve_server(&args[1]) {
        Some(addr) => addr,
        None => {
            eprintln!("error: cannot resolve server '{}'", args[1]);
            process::exit(1);
        }
    };

    info!(%server, net_nastiness, file_nastiness, dir = %dir.display(), "UFCP sender starting");

    let sock = match UdpDatagram::client(server).await {
        Ok(sock) => NastyDgmSocket::new(sock, net_nastiness),
        Err(e) => {
            error!(error = %e, "소켓 생성 실패");
            process::exit(2);
        }
    };

    let mut sender = Sender::new(sock, Config::default(), file_nastiness);
    if let Err(e) = sender.send_dir(&dir).await {
        error!(error = %e, "전송 중단");
        process::exit(2);
    }
}
