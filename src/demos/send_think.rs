//! Minimal client: connects over tcp, sends `hello`, and prints whatever
//! the server answers with. Demonstrates the framing + handshake layers
//! without needing the full two-thread [`xpra_protocol_core::protocol`]
//! engine.

use std::io::{Read, Write};
use std::net::TcpStream;
use xpra_protocol_core::encode::{self, Encoder};
use xpra_protocol_core::handshake::LocalHello;
use xpra_protocol_core::header::{Header, HEADER_LEN};
use xpra_protocol_core::{compress, framing};

fn main() -> anyhow::Result<()> {
    println!("connecting to 127.0.0.1:14500");
    let mut stream = TcpStream::connect("127.0.0.1:14500")?;

    let local = LocalHello {
        version: vec![6, 0],
        uuid: "demo-client".to_string(),
        compressors: compress::locally_available(),
        encoders: encode::PREFERENCE_ORDER.to_vec(),
        has_password: false,
        legacy_opt_in: false,
    };

    let hello = local.to_packet();
    let frame = framing::pack_frame(&hello, Encoder::RencodePlus, None, None)?;
    stream.write_all(&frame)?;
    println!("sent hello ({} bytes)", frame.len());

    let mut header_bytes = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_bytes)?;
    let header = Header::unpack(&header_bytes)?;
    let mut payload = vec![0u8; header.length as usize];
    stream.read_exact(&mut payload)?;

    let reply = framing::unpack_frame(&header, &payload, None)?;
    println!("received {:?}", reply.first().and_then(|v| v.as_str()));
    Ok(())
}
