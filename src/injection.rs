use crate::network::{LineAssembler, RecvEvent};
use crate::sink::SharedMirror;
use crate::types::ReplayFrame;
use colored::*;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// Read buffer size for the producer socket
const RECV_CHUNK: usize = 1024;

/// Pause between accept retries after a transient accept error
const ACCEPT_RETRY: Duration = Duration::from_millis(200);

/// What ended one producer session
enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// Accepts attack-producer connections one at a time, reassembles the byte
/// stream into delimited messages and feeds the pending queue.
///
/// The listener owns the server socket and the active producer socket
/// exclusively; the scheduler only ever sees the queue. After each accepted
/// producer the attacker-observer mirror is reopened best-effort; on
/// disconnect it is closed again.
pub struct InjectionListener {
    listener: TcpListener,
    queue: mpsc::UnboundedSender<ReplayFrame>,
    mirror: Option<(String, SharedMirror)>,
    shutdown: watch::Receiver<bool>,
}

impl InjectionListener {
    /// Bind the injection port. A bind failure is fatal at startup.
    pub async fn bind(
        addr: &str,
        queue: mpsc::UnboundedSender<ReplayFrame>,
        mirror: Option<(String, SharedMirror)>,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        println!(
            "{} Injection listener ready on {}",
            "✓".green().bold(),
            listener.local_addr()?.to_string().bright_white()
        );
        Ok(Self {
            listener,
            queue,
            mirror,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept/reassembly loop. Runs until the shutdown signal flips.
    pub async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let accepted = tokio::select! {
                _ = self.shutdown.changed() => break,
                result = self.listener.accept() => result,
            };

            let (socket, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    println!("{} Accept failed ({}), retrying", "⚠".yellow(), e);
                    tokio::time::sleep(ACCEPT_RETRY).await;
                    continue;
                }
            };

            println!(
                "{} Attack producer connected from {}",
                "→".cyan(),
                peer.to_string().bright_white()
            );
            self.open_mirror().await;

            let ended = self.handle_producer(socket).await;

            // the producer socket drops here; take the mirror down with it
            self.close_mirror().await;

            match ended {
                SessionEnd::Disconnected => {
                    println!("{} Waiting for next attack producer...", "→".bright_black());
                }
                SessionEnd::Shutdown => break,
            }
        }
        println!("{} Injection listener stopped", "→".bright_black());
    }

    /// One producer session: read chunks, reassemble lines, queue valid
    /// messages. Partial lines stay buffered in the assembler and never
    /// reach the queue.
    async fn handle_producer(&mut self, mut socket: TcpStream) -> SessionEnd {
        let mut assembler = LineAssembler::new();
        let mut buf = [0u8; RECV_CHUNK];
        let mut queued = 0u64;
        let mut dropped = 0u64;

        loop {
            let read = tokio::select! {
                _ = self.shutdown.changed() => return SessionEnd::Shutdown,
                result = socket.read(&mut buf) => result,
            };

            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    println!("{} Producer read error: {}", "⚠".yellow(), e);
                    break;
                }
            };

            for event in assembler.feed(&buf[..n]) {
                match event {
                    RecvEvent::Message(frame) => {
                        queued += 1;
                        println!(
                            "{} Injected frame queued (ID {}, {} bytes)",
                            "⚡".red(),
                            frame.id_hex().bright_white(),
                            frame.dlc
                        );
                        if self.queue.send(frame).is_err() {
                            // scheduler side is gone; the run is over
                            return SessionEnd::Shutdown;
                        }
                    }
                    RecvEvent::Malformed { line, error } => {
                        dropped += 1;
                        println!(
                            "{} Malformed injected message dropped ({}): {}",
                            "⚠".yellow(),
                            error,
                            line.bright_black()
                        );
                    }
                    RecvEvent::WouldBlock => {}
                    RecvEvent::PeerClosed => {
                        if dropped > 0 {
                            println!(
                                "{} Producer disconnected ({} queued, {} dropped)",
                                "→".bright_black(),
                                queued,
                                dropped
                            );
                        } else {
                            println!(
                                "{} Producer disconnected ({} messages queued)",
                                "→".bright_black(),
                                queued
                            );
                        }
                        return SessionEnd::Disconnected;
                    }
                }
            }
        }

        SessionEnd::Disconnected
    }

    /// Best-effort mirror connect after a producer is accepted. Failure
    /// leaves the mirror disabled until a future success.
    async fn open_mirror(&self) {
        if let Some((addr, slot)) = &self.mirror {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    *slot.lock().await = Some(stream);
                    println!(
                        "{} Mirror connected to {}",
                        "✓".green(),
                        addr.bright_white()
                    );
                }
                Err(e) => {
                    *slot.lock().await = None;
                    println!(
                        "{} Mirror unavailable at {} ({})",
                        "⚠".yellow(),
                        addr,
                        e
                    );
                }
            }
        }
    }

    async fn close_mirror(&self) {
        if let Some((_, slot)) = &self.mirror {
            *slot.lock().await = None;
        }
    }
}
