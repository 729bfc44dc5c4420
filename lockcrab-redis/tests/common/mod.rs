//! In-process redis server backed by a MemoryStore

use bytes::{Buf, BytesMut};
use lockcrab::store::{KeyValueStore, MemoryStore, StoreError};
use lockcrab_redis::client::COMPARE_AND_DELETE_SCRIPT;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct MockRedis {
    pub addr: SocketAddr,
    pub commands: Arc<AtomicUsize>,
    pub connections: Arc<AtomicUsize>,
}

struct Shared {
    store: MemoryStore,
    password: Option<String>,
    script_hash: String,
    script_loaded: AtomicBool,
    commands: Arc<AtomicUsize>,
}

impl MockRedis {
    pub async fn start(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let commands = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new(Shared {
            store: MemoryStore::new(),
            password: password.map(str::to_string),
            script_hash: redis::Script::new(COMPARE_AND_DELETE_SCRIPT).get_hash().to_string(),
            script_loaded: AtomicBool::new(false),
            commands: commands.clone(),
        });

        let accepted = connections.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle_connection(socket, shared.clone()));
            }
        });

        Self {
            addr,
            commands,
            connections,
        }
    }
}

enum Reply {
    Ok,
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Vec<String>),
}

impl Reply {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Ok => out.extend_from_slice(b"+OK\r\n"),
            Reply::Simple(s) => out.extend_from_slice(format!("+{s}\r\n").as_bytes()),
            Reply::Error(e) => out.extend_from_slice(format!("-{e}\r\n").as_bytes()),
            Reply::Integer(n) => out.extend_from_slice(format!(":{n}\r\n").as_bytes()),
            Reply::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Reply::Bulk(Some(s)) => {
                out.extend_from_slice(format!("${}\r\n{s}\r\n", s.len()).as_bytes())
            }
            Reply::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    Reply::Bulk(Some(item.clone())).encode(out);
                }
            }
        }
    }
}

fn read_line(buf: &[u8], pos: usize) -> Option<(&str, usize)> {
    let end = buf[pos..].windows(2).position(|w| w == b"\r\n")? + pos;
    Some((std::str::from_utf8(&buf[pos..end]).ok()?, end + 2))
}

/// Parse one client command (an array of bulk strings), returning the
/// arguments and the number of bytes consumed
fn parse_command(buf: &[u8]) -> Option<(Vec<String>, usize)> {
    let (header, mut pos) = read_line(buf, 0)?;
    let count: usize = header.strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let (len, start) = read_line(buf, pos)?;
        let len: usize = len.strip_prefix('$')?.parse().ok()?;
        if buf.len() < start + len + 2 {
            return None;
        }
        args.push(String::from_utf8_lossy(&buf[start..start + len]).into_owned());
        pos = start + len + 2;
    }
    Some((args, pos))
}

async fn handle_connection(mut socket: TcpStream, shared: Arc<Shared>) {
    let mut buffer = BytesMut::new();
    let mut authenticated = shared.password.is_none();

    loop {
        let mut out = Vec::new();
        while let Some((args, consumed)) = parse_command(&buffer) {
            buffer.advance(consumed);
            shared.commands.fetch_add(1, Ordering::SeqCst);

            let reply = match args.first().map(|c| c.to_uppercase()).as_deref() {
                Some("AUTH") => {
                    if args.last() == shared.password.as_ref() {
                        authenticated = true;
                        Reply::Ok
                    } else {
                        Reply::Error("WRONGPASS invalid username-password pair".into())
                    }
                }
                _ if !authenticated => Reply::Error("NOAUTH Authentication required.".into()),
                _ => execute(&shared, &args).await,
            };
            reply.encode(&mut out);
        }

        if !out.is_empty() && socket.write_all(&out).await.is_err() {
            return;
        }
        match socket.read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

fn store_error(e: StoreError) -> Reply {
    match e {
        StoreError::WrongType(msg) if msg.contains("integer") => {
            Reply::Error("ERR value is not an integer or out of range".into())
        }
        StoreError::WrongType(_) => Reply::Error(
            "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
        ),
        other => Reply::Error(format!("ERR {other}")),
    }
}

fn ms(arg: &str) -> Duration {
    Duration::from_millis(arg.parse().unwrap_or(0))
}

fn integer(result: Result<bool, StoreError>) -> Reply {
    match result {
        Ok(b) => Reply::Integer(b as i64),
        Err(e) => store_error(e),
    }
}

async fn execute(shared: &Shared, args: &[String]) -> Reply {
    let store = &shared.store;
    let a: Vec<&str> = args.iter().map(String::as_str).collect();
    let cmd = a[0].to_uppercase();

    match (cmd.as_str(), &a[1..]) {
        ("PING", []) => Reply::Simple("PONG".into()),
        ("SELECT", [_]) | ("CLIENT", _) => Reply::Ok,
        ("SET", [key, value, "PX", px, "NX"]) => {
            match store.set_if_absent(key, value, ms(px)).await {
                Ok(true) => Reply::Ok,
                Ok(false) => Reply::Bulk(None),
                Err(e) => store_error(e),
            }
        }
        ("SET", [key, value, "PX", px]) => match store.set(key, value, Some(ms(px))).await {
            Ok(()) => Reply::Ok,
            Err(e) => store_error(e),
        },
        ("SET", [key, value]) => match store.set(key, value, None).await {
            Ok(()) => Reply::Ok,
            Err(e) => store_error(e),
        },
        ("GET", [key]) => match store.get(key).await {
            Ok(v) => Reply::Bulk(v),
            Err(e) => store_error(e),
        },
        ("DEL", [key]) => integer(store.delete(key).await),
        ("SCRIPT", [sub, script])
            if sub.eq_ignore_ascii_case("LOAD") && *script == COMPARE_AND_DELETE_SCRIPT =>
        {
            shared.script_loaded.store(true, Ordering::SeqCst);
            Reply::Bulk(Some(shared.script_hash.clone()))
        }
        ("EVALSHA", [hash, "1", key, expected]) if *hash == shared.script_hash => {
            if !shared.script_loaded.load(Ordering::SeqCst) {
                return Reply::Error("NOSCRIPT No matching script. Please use EVAL.".into());
            }
            match store.compare_and_delete(key, expected).await {
                Ok(n) => Reply::Integer(n),
                Err(e) => store_error(e),
            }
        }
        ("PEXPIRE", [key, px]) => integer(store.expire(key, ms(px)).await),
        ("PEXPIRE", [key, px, "NX"]) => integer(store.expire_if_unset(key, ms(px)).await),
        ("PTTL", [key]) => match store.ttl(key).await {
            Ok(Some(ttl)) => Reply::Integer(ttl.as_millis() as i64),
            Ok(None) => {
                let exists = matches!(store.get(key).await, Ok(Some(_)) | Err(_));
                Reply::Integer(if exists { -1 } else { -2 })
            }
            Err(e) => store_error(e),
        },
        ("HSET", [key, field, value]) => match store.hset(key, field, value).await {
            Ok(()) => Reply::Integer(1),
            Err(e) => store_error(e),
        },
        ("HGET", [key, field]) => match store.hget(key, field).await {
            Ok(v) => Reply::Bulk(v),
            Err(e) => store_error(e),
        },
        ("HGETALL", [key]) => match store.hget_all(key).await {
            Ok(fields) => Reply::Array(fields.into_iter().flat_map(|(f, v)| [f, v]).collect()),
            Err(e) => store_error(e),
        },
        ("HDEL", [key, field]) => integer(store.hdel(key, field).await),
        ("INCRBY", [key, n]) => match n.parse::<i64>() {
            Ok(n) => match store.incr_by(key, n).await {
                Ok(count) => Reply::Integer(count),
                Err(e) => store_error(e),
            },
            Err(_) => Reply::Error("ERR value is not an integer or out of range".into()),
        },
        _ => Reply::Error(format!("ERR unknown command '{cmd}'")),
    }
}
