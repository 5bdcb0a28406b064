//! Ping-pong between a server and a client in one process.
//!
//! Uses the loopback transport, so no socket is needed. Run with:
//!   cargo run --example ping-pong
//!
//! The same exchange over a Unix socket, using the CLI:
//!   cargo run --features cli -- listen /tmp/hashrpc.sock --names Game.PingMessage
//!   cargo run --features cli -- send /tmp/hashrpc.sock Game.PingMessage --json '{"seq":1}'

use std::sync::mpsc;

use hashrpc::channel::{ClientChannel, JsonBody, PeerId, ServerChannel};
use hashrpc::hash::Message;
use hashrpc::peer::{Client, LoopbackServer, Server};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    seq: u32,
}

impl Message for Ping {
    const NAME: &'static str = "Game.PingMessage";
}

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    seq: u32,
}

impl Message for Pong {
    const NAME: &'static str = "Game.PongMessage";
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let transport = LoopbackServer::new();
    let connector = transport.connector();

    // Handlers run inside poll; replies are sent once poll returns.
    let (inbox_tx, inbox) = mpsc::channel::<(PeerId, Ping)>();
    let mut server_channel = ServerChannel::<JsonBody>::new();
    server_channel.register_handler::<Ping, _>(move |peer, ping| {
        let _ = inbox_tx.send((peer, ping));
    })?;
    let mut server = Server::new(transport, server_channel);
    server
        .events_mut()
        .on_connected(|peer| eprintln!("peer {peer} connected"));

    let mut client_channel = ClientChannel::<JsonBody>::new();
    client_channel.register_handler::<Pong, _>(|pong| println!("pong {}", pong.seq))?;
    let mut client = Client::new(connector.connect()?, client_channel);

    eprintln!(
        "{} -> {}, {} -> {}",
        Ping::NAME,
        Ping::message_id(),
        Pong::NAME,
        Pong::message_id()
    );

    for seq in 0..3 {
        client.send(&Ping { seq })?;
    }
    server.poll()?;

    while let Ok((peer, ping)) = inbox.try_recv() {
        println!("ping {} from peer {peer}", ping.seq);
        server.send(peer, &Pong { seq: ping.seq })?;
    }
    client.poll()?;

    client.disconnect()?;
    server.poll()?;
    eprintln!("connections left: {}", server.connection_count());
    Ok(())
}
