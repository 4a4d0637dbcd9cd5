//! KEYRACK CLI Client
//!
//! Interactive command-line client for a keyrack gateway.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use keyrack::protocol::{Command, Frame, Response, RwpCodec};
use keyrack::storage::Item;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// KEYRACK CLI - Interactive Client
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6390)]
    port: u16,
}

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    println!("Connecting to keyrack at {}...", addr);

    let stream = TcpStream::connect(&addr).await?;
    let mut framed = Framed::new(stream, RwpCodec::new());

    println!("Connected! Type 'help' for available commands, 'quit' to exit.\n");

    loop {
        print!("keyrack> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("help") {
            print_help();
            continue;
        }

        match parse_command(input) {
            Ok(cmd) => {
                let request_id = next_request_id();
                let (opcode, payload) = cmd.encode();
                let frame = Frame::new(opcode, request_id, payload);

                framed.send(frame).await?;

                match framed.next().await {
                    Some(Ok(response_frame)) => {
                        let response = Response::from_frame(&response_frame)?;
                        println!("{}", response);
                    }
                    Some(Err(e)) => {
                        eprintln!("Error: {}", e);
                    }
                    None => {
                        eprintln!("Connection closed by server");
                        break;
                    }
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    Ok(())
}

/// Accept either an absolute RFC 3339 timestamp or "+N" seconds from now.
fn parse_ttl(arg: &str) -> anyhow::Result<String> {
    if let Some(secs) = arg.strip_prefix('+') {
        let secs: i64 = secs.parse()?;
        return Ok((Utc::now() + Duration::seconds(secs)).to_rfc3339());
    }
    DateTime::parse_from_rfc3339(arg)?;
    Ok(arg.to_string())
}

fn string_keys(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn parse_command(input: &str) -> anyhow::Result<Command> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    if parts.is_empty() {
        anyhow::bail!("Empty command");
    }

    let cmd = parts[0].to_uppercase();

    match cmd.as_str() {
        "PING" => Ok(Command::Ping),

        "HAS" => {
            if parts.len() < 3 {
                anyhow::bail!("HAS requires a storage and keys: HAS <storage> <key...>");
            }
            Ok(Command::Has {
                storage: parts[1].to_string(),
                keys: string_keys(&parts[2..]),
            })
        }

        "GET" => {
            if parts.len() < 3 {
                anyhow::bail!("GET requires a storage and a key: GET <storage> <key>");
            }
            Ok(Command::Get {
                storage: parts[1].to_string(),
                key: parts[2].to_string(),
            })
        }

        "MGET" => {
            if parts.len() < 3 {
                anyhow::bail!("MGET requires a storage and keys: MGET <storage> <key...>");
            }
            Ok(Command::MGet {
                storage: parts[1].to_string(),
                keys: string_keys(&parts[2..]),
            })
        }

        "SET" => {
            if parts.len() < 4 {
                anyhow::bail!(
                    "SET requires storages, key and value: SET <storage[,storage]> <key> <value> [ttl]"
                );
            }
            let storages: Vec<String> = parts[1].split(',').map(|s| s.to_string()).collect();
            let mut item = Item::new(parts[2], parts[3].as_bytes().to_vec());
            if parts.len() > 4 {
                item.ttl = parse_ttl(parts[4])?;
            }
            Ok(Command::Set {
                storages,
                items: vec![item],
            })
        }

        "MEXPIRE" => {
            if parts.len() < 4 {
                anyhow::bail!("MEXPIRE requires a storage, key and ttl: MEXPIRE <storage> <key> <ttl>");
            }
            let mut item = Item::new(parts[2], Bytes::new());
            item.ttl = parse_ttl(parts[3])?;
            Ok(Command::MExpire {
                storage: parts[1].to_string(),
                items: vec![item],
            })
        }

        "TTL" => {
            if parts.len() < 3 {
                anyhow::bail!("TTL requires a storage and keys: TTL <storage> <key...>");
            }
            Ok(Command::Ttl {
                storage: parts[1].to_string(),
                keys: string_keys(&parts[2..]),
            })
        }

        "DEL" | "DELETE" => {
            if parts.len() < 3 {
                anyhow::bail!("DELETE requires a storage and keys: DELETE <storage> <key...>");
            }
            Ok(Command::Delete {
                storage: parts[1].to_string(),
                keys: string_keys(&parts[2..]),
            })
        }

        "CLOSE" => {
            if parts.len() < 2 {
                anyhow::bail!("CLOSE requires a storage: CLOSE <storage>");
            }
            Ok(Command::Close {
                storage: parts[1].to_string(),
            })
        }

        _ => anyhow::bail!("Unknown command: {}. Type 'help' for available commands.", cmd),
    }
}

fn print_help() {
    println!(
        r#"
Available commands:

  PING                                   - Check server connectivity
  HAS <storage> <key...>                 - Check which keys are present
  GET <storage> <key>                    - Get value for key
  MGET <storage> <key...>                - Get multiple values
  SET <storage[,storage]> <key> <value> [ttl]
                                         - Upsert into one or more storages
  MEXPIRE <storage> <key> <ttl>          - Overwrite a key's expiry
  TTL <storage> <key...>                 - Show expiry timestamps
  DELETE <storage> <key...>              - Remove keys
  CLOSE <storage>                        - Close a storage

  TTLs are RFC 3339 timestamps, or +N for "N seconds from now".

  help                                   - Show this help
  quit / exit                            - Exit the CLI

Examples:
  SET sessions user:1 alice
  SET sessions,assets user:2 bob +60
  HAS sessions user:1 user:2
  TTL sessions user:2
  DELETE sessions user:1
"#
    );
}
