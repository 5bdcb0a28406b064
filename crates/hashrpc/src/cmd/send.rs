use std::time::{Duration, Instant};

use hashrpc_frame::{decode_envelope, Envelope};
use hashrpc_hash::MessageId;
use hashrpc_peer::{Transport, TransportEvent, UdsClient, SERVER_PEER};
use tracing::{debug, warn};

use crate::cmd::{match_name, Context, SendArgs};
use crate::exit::{frame_error, peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::print_envelope;

const FLUSH_STEP: Duration = Duration::from_millis(10);

pub fn run(args: SendArgs, ctx: Context) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = args.payload.resolve()?;

    let id = MessageId::from_name(&args.name);
    let wire = Envelope::for_message(ctx.width, id, payload)
        .encode()
        .map_err(|err| frame_error("encode failed", err))?;

    let mut client =
        UdsClient::connect(&args.path).map_err(|err| peer_error("connect failed", err))?;
    client
        .send(SERVER_PEER, &wire)
        .map_err(|err| peer_error("send failed", err))?;
    debug!(name = %args.name, %id, size = wire.len(), "sent envelope");

    if args.wait {
        let reply = wait_for_reply(&mut client, wait_timeout)?;
        let name = reply
            .command_id(ctx.width)
            .ok()
            .and_then(|command| match_name(&args.names, ctx.width, command));
        print_envelope(&reply, ctx.width, name, None, ctx.format);
    }

    flush_pending(&mut client, wait_timeout)?;
    client
        .disconnect(SERVER_PEER)
        .map_err(|err| peer_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

/// Poll until every queued byte has reached the socket.
fn flush_pending(client: &mut UdsClient, timeout: Duration) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    while client.queued() > 0 {
        let now = Instant::now();
        if now >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!(
                    "{} bytes still queued after {}ms",
                    client.queued(),
                    timeout.as_millis()
                ),
            ));
        }
        client
            .poll((deadline - now).min(FLUSH_STEP))
            .map_err(|err| peer_error("send failed", err))?;
        if !client.is_connected() {
            return Err(CliError::new(
                FAILURE,
                "server closed the connection during send",
            ));
        }
    }
    Ok(())
}

/// Poll `transport` until one decodable envelope arrives.
fn wait_for_reply<T: Transport>(transport: &mut T, timeout: Duration) -> CliResult<Envelope> {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("no reply within {}ms", timeout.as_millis()),
            ));
        }

        let events = transport
            .poll(deadline - now)
            .map_err(|err| peer_error("receive failed", err))?;
        for event in events {
            match event {
                TransportEvent::Received { data, .. } => match decode_envelope(&data) {
                    Ok(envelope) => return Ok(envelope),
                    Err(err) => warn!(error = %err, "ignoring undecodable reply"),
                },
                TransportEvent::Disconnected(_) => {
                    return Err(CliError::new(
                        FAILURE,
                        "server closed the connection before replying",
                    ));
                }
                TransportEvent::Connected(_) => {}
            }
        }
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
