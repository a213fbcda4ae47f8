//! Minimal game server for integration tests.
//!
//! Every episode: a welcome line, one move request, then `Game Over! Final score: <move * 10>`.
//! With the continuation signal on, the server then waits for `Y` (next episode) or `N`.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Json,
    Legacy,
}

impl Framing {
    fn separator(self) -> u8 {
        match self {
            Framing::Json => b'\n',
            Framing::Legacy => 0x03,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Script {
    pub framing: Framing,
    /// Expect `Y`/`N` after each episode.
    pub continuation: bool,
    /// Hang up after this many episodes, whatever the player asked for.
    pub hang_up_after: Option<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            framing: Framing::Json,
            continuation: true,
            hang_up_after: None,
        }
    }
}

/// Everything one connection received from its player.
#[derive(Debug, Default)]
pub struct Transcript {
    pub replies: Vec<String>,
}

/// Serve `connections` players, each on its own thread, then stop accepting.
pub fn spawn(script: Script, connections: usize) -> (SocketAddr, JoinHandle<Vec<Transcript>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let handlers: Vec<_> = (0..connections)
            .map(|_| {
                let (stream, _) = listener.accept().unwrap();
                thread::spawn(move || serve(stream, script))
            })
            .collect();
        handlers.into_iter().map(|h| h.join().unwrap()).collect()
    });

    (addr, handle)
}

/// An address nothing listens on.
pub fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn serve(stream: TcpStream, script: Script) -> Transcript {
    let separator = script.framing.separator();
    let mut reader = BufReader::new(stream);
    let mut transcript = Transcript::default();
    let mut episode = 0;

    loop {
        episode += 1;
        send(reader.get_mut(), script.framing, false, &format!("Welcome to episode {episode}"));
        send(reader.get_mut(), script.framing, true, "Pick a position from 0 to 9");

        let Some(reply) = receive(&mut reader, separator, script.framing) else {
            return transcript;
        };
        let score = reply.parse::<i64>().map(|p| p * 10).unwrap_or(-1);
        transcript.replies.push(reply);
        send(
            reader.get_mut(),
            script.framing,
            false,
            &format!("Game Over! Final score: {score}"),
        );

        if script.hang_up_after == Some(episode) || !script.continuation {
            if script.continuation {
                // let the player deliver its signal before hanging up
                if let Some(signal) = receive(&mut reader, separator, script.framing) {
                    transcript.replies.push(signal);
                }
            }
            return transcript;
        }

        match receive(&mut reader, separator, script.framing) {
            Some(signal) => {
                let stop = signal != "Y";
                transcript.replies.push(signal);
                if stop {
                    return transcript;
                }
            }
            None => return transcript,
        }
    }
}

fn send(stream: &mut TcpStream, framing: Framing, require_input: bool, content: &str) {
    let mut frame = match framing {
        Framing::Json => serde_json::json!({ "require_input": require_input, "content": content })
            .to_string()
            .into_bytes(),
        Framing::Legacy if require_input => format!("[user input]{content}").into_bytes(),
        Framing::Legacy => content.as_bytes().to_vec(),
    };
    frame.push(framing.separator());
    // the player may already be gone
    let _ = stream.write_all(&frame);
}

fn receive(reader: &mut BufReader<TcpStream>, separator: u8, framing: Framing) -> Option<String> {
    let mut frame = Vec::new();
    let n = reader.read_until(separator, &mut frame).ok()?;
    if n == 0 || frame.pop() != Some(separator) {
        return None;
    }
    let text = String::from_utf8(frame).ok()?;
    match framing {
        Framing::Json => {
            let value: serde_json::Value = serde_json::from_str(&text).ok()?;
            assert_eq!(value["require_input"], false, "player replies never ask for input");
            value["content"].as_str().map(str::to_owned)
        }
        Framing::Legacy => Some(text),
    }
}

struct CustomLevelFilter;
impl<S> Filter<S> for CustomLevelFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.level() <= &Level::INFO
    }
}

pub fn init_debug_logger() {
    let format = fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .event_format(format)
            .with_test_writer()
            .with_filter(CustomLevelFilter),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}
