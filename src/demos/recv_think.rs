//! Minimal server: accepts one tcp connection, reads `hello`, and answers
//! with its own `hello`. Companion to `send_think.rs`.

use std::io::{Read, Write};
use std::net::TcpListener;
use xpra_protocol_core::encode::{self, Encoder};
use xpra_protocol_core::handshake::{self, LocalHello};
use xpra_protocol_core::header::{Header, HEADER_LEN};
use xpra_protocol_core::{compress, framing};

fn main() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:14500")?;
    println!("listening on 127.0.0.1:14500");

    let (mut stream, peer) = listener.accept()?;
    println!("accepted connection from {peer}");

    let mut header_bytes = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_bytes)?;
    let header = Header::unpack(&header_bytes)?;
    let mut payload = vec![0u8; header.length as usize];
    stream.read_exact(&mut payload)?;

    let hello = framing::unpack_frame(&header, &payload, None)?;
    let caps = handshake::parse_hello_body(&hello)?;
    println!("peer uuid: {:?}", caps.get_str("uuid"));
    println!("peer compressors: {:?}", caps.get_str_list("compressors"));
    println!("peer encoders: {:?}", caps.get_str_list("packet-encoders"));

    let local = LocalHello {
        version: vec![6, 0],
        uuid: "demo-server".to_string(),
        compressors: compress::locally_available(),
        encoders: encode::PREFERENCE_ORDER.to_vec(),
        has_password: false,
        legacy_opt_in: false,
    };
    let reply = local.to_packet();
    let frame = framing::pack_frame(&reply, Encoder::RencodePlus, None, None)?;
    stream.write_all(&frame)?;
    println!("sent reply hello ({} bytes)", frame.len());
    Ok(())
}
