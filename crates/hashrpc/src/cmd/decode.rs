use hashrpc_frame::decode_envelope;

use crate::cmd::{match_name, parse_hex, Context, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::print_envelope;

pub fn run(args: DecodeArgs, ctx: Context) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;
    let envelope = decode_envelope(&bytes).map_err(|err| frame_error("decode failed", err))?;
    let name = envelope
        .command_id(ctx.width)
        .ok()
        .and_then(|command| match_name(&args.names, ctx.width, command));

    print_envelope(&envelope, ctx.width, name, None, ctx.format);
    Ok(SUCCESS)
}
