use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hashrpc_frame::decode_envelope;
use hashrpc_peer::{Transport, TransportEvent, UdsServer};
use tracing::{debug, info, warn};

use crate::cmd::{match_name, Context, ListenArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::print_envelope;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, ctx: Context) -> CliResult<i32> {
    let mut server = UdsServer::bind(&args.path).map_err(|err| peer_error("bind failed", err))?;
    info!(path = %args.path.display(), width = %ctx.width, "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let events = server
            .poll(POLL_INTERVAL)
            .map_err(|err| peer_error("poll failed", err))?;

        for event in events {
            let (peer, data) = match event {
                TransportEvent::Received { peer, data } => (peer, data),
                TransportEvent::Connected(peer) => {
                    debug!(peer, "peer connected");
                    continue;
                }
                TransportEvent::Disconnected(peer) => {
                    debug!(peer, "peer disconnected");
                    continue;
                }
            };

            let envelope = match decode_envelope(&data) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(peer, error = %err, "dropping undecodable envelope");
                    continue;
                }
            };
            let name = envelope
                .command_id(ctx.width)
                .ok()
                .and_then(|command| match_name(&args.names, ctx.width, command));

            print_envelope(&envelope, ctx.width, name, Some(peer), ctx.format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
