//! The protocol engine (spec.md §4.4): two dedicated threads per
//! connection (read, write), driven by an embedder-supplied scheduler and
//! dispatching decoded packets to registered handlers.

use crate::alias::AliasTable;
use crate::config::SocketConfig;
use crate::crypto::CipherState;
use crate::encode::Encoder;
use crate::error::{ProtocolError, Result};
use crate::framing::{self, FrameAssembler};
use crate::header::CompressionAlgo;
use crate::packet::{Packet, PacketType, Value};
use crate::queue::SendQueue;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A decoded packet's type name, normalized from an alias if one applied
/// (spec.md §4.4 read side: "normalize the first element (alias → name)").
pub fn type_name(packet: &Packet, aliases: &AliasTable) -> Option<String> {
    let first = packet.first()?;
    match PacketType::from_value(first)? {
        PacketType::Name(n) => Some(n),
        PacketType::Alias(id) => aliases.name_for(id).map(str::to_string),
    }
}

/// A handler callback, run either on the scheduler (main) thread or
/// directly on the read thread for latency-sensitive, non-blocking
/// packets such as pings and acks (spec.md §4.4).
pub type Handler = Box<dyn Fn(&Packet) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerThread {
    Scheduler,
    ReadThread,
}

/// The embedder-supplied scheduling callback (spec.md §4.4: `idle_add`,
/// `timeout_add`, `source_remove`). Handlers marked [`HandlerThread::Scheduler`]
/// are posted through this rather than invoked directly on the read thread.
pub trait Scheduler: Send + Sync {
    fn idle_add(&self, f: Box<dyn FnOnce() + Send>);
}

/// A scheduler that just runs the callback immediately, for embedders (and
/// tests) with no main-loop of their own to post onto.
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn idle_add(&self, f: Box<dyn FnOnce() + Send>) {
        f();
    }
}

struct HandlerEntry {
    thread: HandlerThread,
    callback: Handler,
}

/// Shared mutable state between the read and write threads, behind a
/// single mutex (spec.md §4.4: "no shared mutable state crosses threads
/// without an explicit synchronized primitive").
struct Shared {
    send_queue: Mutex<SendQueue>,
    has_more: Condvar,
    running: AtomicBool,
    out_aliases: Mutex<AliasTable>,
    in_aliases: Mutex<AliasTable>,
    out_cipher: Mutex<Option<CipherState>>,
    in_cipher: Mutex<Option<CipherState>>,
    out_compression: Mutex<Option<(CompressionAlgo, u8)>>,
    encoder: Mutex<Encoder>,
    handlers: Mutex<HashMap<String, HandlerEntry>>,
    large_packet_whitelist: Vec<String>,
    large_packet_threshold: usize,
    scheduler: Box<dyn Scheduler>,
}

/// Runs the two I/O threads for one connection. Constructed after `hello`
/// has already negotiated the active encoder/compressor/ciphers; building
/// the `hello` exchange itself is [`crate::handshake`]'s job.
pub struct Protocol {
    shared: Arc<Shared>,
    read_thread: Option<JoinHandle<Result<()>>>,
    write_thread: Option<JoinHandle<Result<()>>>,
}

impl Protocol {
    /// Spawns the read and write threads over independent reader/writer
    /// handles onto the same underlying socket (e.g. `TcpStream::try_clone`),
    /// since `std::net::TcpStream` has no `Clone` impl to share a single
    /// handle across both threads.
    pub fn start<R, W>(reader: R, writer: W, config: SocketConfig, encoder: Encoder, scheduler: Box<dyn Scheduler>) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared {
            send_queue: Mutex::new(SendQueue::new()),
            has_more: Condvar::new(),
            running: AtomicBool::new(true),
            out_aliases: Mutex::new(AliasTable::new()),
            in_aliases: Mutex::new(AliasTable::new()),
            out_cipher: Mutex::new(None),
            in_cipher: Mutex::new(None),
            out_compression: Mutex::new(None),
            encoder: Mutex::new(encoder),
            handlers: Mutex::new(HashMap::new()),
            large_packet_whitelist: config.large_packet_whitelist,
            large_packet_threshold: config.large_packet_threshold,
            scheduler,
        });

        let read_shared = shared.clone();
        let mut reader = reader;
        let read_thread = std::thread::spawn(move || read_loop(&mut reader, read_shared));

        let write_shared = shared.clone();
        let mut writer = writer;
        let write_thread = std::thread::spawn(move || write_loop(&mut writer, write_shared));

        Protocol {
            shared,
            read_thread: Some(read_thread),
            write_thread: Some(write_thread),
        }
    }

    pub fn register_handler(&self, name: impl Into<String>, thread: HandlerThread, callback: Handler) {
        self.shared
            .handlers
            .lock()
            .unwrap()
            .insert(name.into(), HandlerEntry { thread, callback });
    }

    /// Installs a sequential (position = id) alias table for this side's own
    /// outgoing names. To install a table received from a peer's `aliases`
    /// capability dict, build it via [`AliasTable::install`] and pass the
    /// whole table to [`Self::set_out_aliases`]/[`Self::set_in_aliases`].
    pub fn install_out_aliases(&self, names: &[String]) {
        self.shared.out_aliases.lock().unwrap().install_sequential(names);
    }

    pub fn install_in_aliases(&self, names: &[String]) {
        self.shared.in_aliases.lock().unwrap().install_sequential(names);
    }

    pub fn set_out_aliases(&self, table: AliasTable) {
        *self.shared.out_aliases.lock().unwrap() = table;
    }

    pub fn set_in_aliases(&self, table: AliasTable) {
        *self.shared.in_aliases.lock().unwrap() = table;
    }

    pub fn set_out_cipher(&self, cipher: Option<CipherState>) {
        *self.shared.out_cipher.lock().unwrap() = cipher;
    }

    pub fn set_in_cipher(&self, cipher: Option<CipherState>) {
        *self.shared.in_cipher.lock().unwrap() = cipher;
    }

    pub fn set_out_compression(&self, compression: Option<(CompressionAlgo, u8)>) {
        *self.shared.out_compression.lock().unwrap() = compression;
    }

    /// `source()` in spec.md terms: enqueue a packet and raise `has_more`.
    pub fn send(&self, packet: Packet) {
        let mut q = self.shared.send_queue.lock().unwrap();
        q.push_ordinary(packet);
        self.shared.has_more.notify_one();
    }

    pub fn send_priority(&self, packet: Packet) {
        let mut q = self.shared.send_queue.lock().unwrap();
        q.push_priority(packet);
        self.shared.has_more.notify_one();
    }

    pub fn send_pointer_position(&self, packet: Packet) {
        let mut q = self.shared.send_queue.lock().unwrap();
        q.push_pointer_position(packet);
        self.shared.has_more.notify_one();
    }

    /// Stops both I/O threads cleanly, waiting up to `shutdown_grace`
    /// (spec.md §4.4/§5) for them to drain.
    pub fn shutdown(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.has_more.notify_all();
        if let Some(t) = self.write_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.read_thread.take() {
            let _ = t.join();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

fn write_loop<S: Write>(stream: &mut S, shared: Arc<Shared>) -> Result<()> {
    loop {
        let packet = {
            let mut q = shared.send_queue.lock().unwrap();
            loop {
                if let Some(p) = q.next_packet() {
                    break Some(p);
                }
                if !shared.running.load(Ordering::SeqCst) {
                    break None;
                }
                q = shared.has_more.wait(q).unwrap();
            }
        };
        let Some(packet) = packet else { return Ok(()) };

        let name = packet.first().and_then(Value::as_str).map(str::to_string);
        let encoder = *shared.encoder.lock().unwrap();
        let compression = *shared.out_compression.lock().unwrap();
        let cipher = shared.out_cipher.lock().unwrap().clone();

        let aliased = {
            let aliases = shared.out_aliases.lock().unwrap();
            match (&name, aliases.is_installed()) {
                (Some(n), true) => aliases
                    .alias_for(n)
                    .map(|id| {
                        let mut p = packet.clone();
                        p[0] = Value::UInt(id);
                        p
                    })
                    .unwrap_or(packet),
                _ => packet,
            }
        };

        let frame = framing::pack_frame(&aliased, encoder, compression, cipher.as_ref())?;
        stream.write_all(&frame).map_err(ProtocolError::Io)?;
    }
}

fn read_loop<S: Read>(stream: &mut S, shared: Arc<Shared>) -> Result<()> {
    let mut assembler = FrameAssembler::new();
    let mut read_buf = [0u8; 65536];
    let mut any_packet_seen = false;

    while shared.running.load(Ordering::SeqCst) {
        loop {
            let cipher = shared.in_cipher.lock().unwrap().clone();
            match assembler.try_next(cipher.as_ref()) {
                Ok(Some((header, payload, chunks))) => {
                    let packet = match framing::unpack_frame(&header, &payload, cipher.as_ref())
                        .and_then(|p| framing::splice_chunks(p, &chunks))
                    {
                        Ok(p) => p,
                        Err(e) => {
                            dispatch_internal(&shared, "invalid", &e.to_string());
                            return Err(e);
                        }
                    };
                    if packet.len() > shared.large_packet_threshold {
                        if let Some(name) = packet.first().and_then(Value::as_str) {
                            if !shared.large_packet_whitelist.iter().any(|w| w == name) {
                                log::warn!("packet {name} exceeds large-packet threshold and is not whitelisted");
                            }
                        }
                    }
                    let resolved_name = {
                        let aliases = shared.in_aliases.lock().unwrap();
                        type_name(&packet, &aliases)
                    };
                    any_packet_seen = true;
                    if let Some(name) = resolved_name {
                        dispatch(&shared, &name, &packet);
                        if name == "disconnect" {
                            shared.running.store(false, Ordering::SeqCst);
                            return Ok(());
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    dispatch_internal(&shared, "gibberish", &e.to_string());
                    return if any_packet_seen {
                        Err(ProtocolError::PacketFailure(e.to_string()))
                    } else {
                        Err(ProtocolError::ConnectionFailed(e.to_string()))
                    };
                }
            }
        }

        let n = stream.read(&mut read_buf).map_err(ProtocolError::Io)?;
        if n == 0 {
            dispatch_internal(&shared, "connection-lost", "peer closed the connection");
            return Err(ProtocolError::ConnectionLost);
        }
        assembler.feed(&read_buf[..n]);
    }
    Ok(())
}

fn dispatch(shared: &Arc<Shared>, name: &str, packet: &Packet) {
    let handlers = shared.handlers.lock().unwrap();
    if let Some(entry) = handlers.get(name) {
        match entry.thread {
            HandlerThread::ReadThread => (entry.callback)(packet),
            HandlerThread::Scheduler => {
                // `callback` is `Fn`, not `FnOnce`, so it can't be moved
                // into the boxed closure directly; the entry lives behind
                // the lock for the scheduler's lifetime via `shared`.
                let shared = shared.clone();
                let name = name.to_string();
                let packet = packet.clone();
                shared.scheduler.idle_add(Box::new(move || {
                    let handlers = shared.handlers.lock().unwrap();
                    if let Some(entry) = handlers.get(&name) {
                        (entry.callback)(&packet);
                    }
                }));
            }
        }
    }
}

fn dispatch_internal(shared: &Arc<Shared>, kind: &str, detail: &str) {
    let packet = vec![Value::Str(kind.to_string()), Value::Str(detail.to_string())];
    dispatch(shared, kind, &packet);
}
