use hashrpc_frame::Envelope;
use hashrpc_hash::MessageId;
use tracing::debug;

use crate::cmd::{Context, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::print_encoded;

pub fn run(args: EncodeArgs, ctx: Context) -> CliResult<i32> {
    let payload = args.payload.resolve()?;
    let id = MessageId::from_name(&args.name);
    let envelope = Envelope::for_message(ctx.width, id, payload);
    let wire = envelope
        .encode()
        .map_err(|err| frame_error("encode failed", err))?;
    debug!(name = %args.name, %id, width = %ctx.width, size = wire.len(), "encoded envelope");

    print_encoded(&args.name, &envelope, &wire, ctx.width, ctx.format);
    Ok(SUCCESS)
}
