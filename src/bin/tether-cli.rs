//! Tether CLI - drive a tether server from the command line
//!
//! Connects to a running server over TCP, or spawns a `tetherd` child and
//! speaks to it over stdio, then issues a single command and prints the
//! reply together with any forwarded server output.

use clap::{Parser, Subcommand};
use tether::client::{RemoteClient, SessionEvent};
use tether::wire::value::{ObjectSpec, WireValue};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Client for the tether remote object server", long_about = None)]
struct Cli {
    /// Connect to a server listening on this TCP address
    #[arg(long, conflicts_with = "spawn")]
    connect: Option<String>,

    /// Spawn this server command and speak to it over stdio
    #[arg(long, default_value = "tetherd")]
    spawn: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the server
    Ping,

    /// Print the server's build revision string
    Revision,

    /// List the object types the server can instantiate
    Types,

    /// Create an object from a textual spec, printing its handle
    New {
        /// Object literal, e.g. 'Counter(count = 3; step = 2)'
        spec: String,
    },

    /// Create an object at a chosen handle
    NewAt {
        /// Handle to insert at
        handle: i32,
        /// Object literal
        spec: String,
    },

    /// Load an object from a server-side file
    Load {
        /// Handle to insert at
        handle: i32,
        /// Path on the server
        path: String,
    },

    /// Invoke a method on an object
    Call {
        /// Target handle
        handle: i32,
        /// Method name
        method: String,
        /// Arguments as textual values
        args: Vec<String>,
    },

    /// Call a free function
    Function {
        /// Function name
        name: String,
        /// Arguments as textual values
        args: Vec<String>,
    },

    /// Delete an object
    Delete {
        /// Handle to delete
        handle: i32,
    },

    /// Clear the server's object table
    Clear,

    /// Shut the server process down
    Kill,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut client = match &cli.connect {
        Some(addr) => RemoteClient::connect(addr.as_str())?,
        None => RemoteClient::spawn(cli.spawn.split_whitespace())?,
    };

    match cli.command {
        Commands::Ping => {
            client.ping()?;
            println!("pong");
        }

        Commands::Revision => {
            let revision = client.revision()?;
            println!("{}", revision);
        }

        Commands::Types => {
            for type_tag in client.object_types()? {
                println!("{}", type_tag);
            }
        }

        Commands::New { spec } => {
            let spec = parse_spec(&spec)?;
            let handle = client.new_object(&spec)?;
            println!("{}", handle);
        }

        Commands::NewAt { handle, spec } => {
            let spec = parse_spec(&spec)?;
            client.new_object_with_id(handle, &spec)?;
            println!("ok");
        }

        Commands::Load { handle, path } => {
            client.load(handle, &path)?;
            println!("ok");
        }

        Commands::Call {
            handle,
            method,
            args,
        } => {
            let args = parse_args(&args)?;
            let results = client.call_method(handle, &method, &args)?;
            for value in results {
                println!("{}", value);
            }
        }

        Commands::Function { name, args } => {
            let args = parse_args(&args)?;
            if let Some(value) = client.call_function(&name, &args)? {
                println!("{}", value);
            }
        }

        Commands::Delete { handle } => {
            client.delete(handle)?;
            println!("ok");
        }

        Commands::Clear => {
            client.clear_all()?;
            println!("ok");
        }

        Commands::Kill => {
            client.kill()?;
            return Ok(());
        }
    }

    print_events(client.take_events());
    client.quit()?;
    Ok(())
}

fn parse_spec(text: &str) -> anyhow::Result<ObjectSpec> {
    match WireValue::parse_text(text)? {
        WireValue::Object(spec) => Ok(spec),
        other => anyhow::bail!("expected an object literal, found a {} value", other.kind()),
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Vec<WireValue>> {
    args.iter()
        .map(|arg| WireValue::parse_text(arg).map_err(anyhow::Error::from))
        .collect()
}

fn print_events(events: Vec<SessionEvent>) {
    for event in events {
        match event {
            SessionEvent::Log {
                level,
                timestamp,
                message,
            } => eprintln!("[log {} {}] {}", level, timestamp, message),
            SessionEvent::ProgressBegin { id, total, title } => {
                eprintln!("[progress {}] {} (0/{})", id, title, total);
            }
            SessionEvent::ProgressStep { id, position } => {
                eprintln!("[progress {}] at {}", id, position);
            }
            SessionEvent::ProgressEnd { id } => eprintln!("[progress {}] done", id),
            SessionEvent::Stdout(text) => print!("{}", text),
            SessionEvent::Stderr(text) => eprint!("{}", text),
        }
    }
}
