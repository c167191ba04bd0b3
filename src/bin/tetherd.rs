//! `tetherd` – standalone tether object server daemon.

use std::env;
use std::io::{self, BufReader, BufWriter};
use std::net::TcpListener;
use std::path::PathBuf;

use anyhow::Context;
use tether::object::{ObjectCatalog, builtin};
use tether::server::{Server, ServerConfig, SessionOutcome};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut listen_addr: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = match args.next() {
                    Some(path) => path,
                    None => {
                        eprintln!("--config requires a path argument");
                        print_usage();
                        anyhow::bail!("missing value for --config");
                    }
                };
                config_path = Some(PathBuf::from(path));
            }
            "--listen" => {
                let addr = match args.next() {
                    Some(addr) => addr,
                    None => {
                        eprintln!("--listen requires an address argument");
                        print_usage();
                        anyhow::bail!("missing value for --listen");
                    }
                };
                listen_addr = Some(addr);
            }
            "--stdio" => {
                // Stdio is the default transport; accept the flag for compatibility.
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                anyhow::bail!("invalid command-line argument");
            }
        }
    }

    let config = match config_path {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };

    builtin::register_builtins(ObjectCatalog::global());

    let server = Server::new(config);

    if let Some(addr) = listen_addr {
        return run_tcp(&server, &addr);
    }

    run_stdio(&server)
}

fn run_stdio(server: &Server) -> anyhow::Result<()> {
    let reader = io::stdin();
    let writer = BufWriter::new(io::stdout());

    server
        .handle(reader, writer)
        .context("session over stdio failed")?;
    Ok(())
}

fn run_tcp(server: &Server, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .with_context(|| format!("binding listener on {addr}"))?;
    let actual = listener.local_addr()?;
    eprintln!("tetherd listening on {}", actual);

    // Sessions are served one at a time: the redirection scope and the
    // output hub are process-wide resources.
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let peer = stream.peer_addr().ok();
                let reader = BufReader::new(stream.try_clone()?);
                let writer = BufWriter::new(stream);
                match server.handle(reader, writer) {
                    Ok(SessionOutcome::KeepServing) => {}
                    Ok(SessionOutcome::Shutdown) => {
                        eprintln!("shutdown requested by {:?}", peer);
                        break;
                    }
                    Err(err) => {
                        eprintln!("connection error from {:?}: {}", peer, err);
                    }
                }
            }
            Err(err) => {
                eprintln!("failed to accept connection: {err}");
            }
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage: tetherd [--config PATH] [--stdio] [--listen ADDR]\n\
         \n\
         Options:\n\
           --config PATH Load server configuration from a JSON file\n\
           --stdio       Serve one session over stdin/stdout (default)\n\
           --listen ADDR Listen on TCP ADDR, serving sessions sequentially\n"
    );
}
