use hashrpc_hash::MessageId;

use crate::cmd::{Context, HashArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_hashes, HashRow};

pub fn run(args: HashArgs, ctx: Context) -> CliResult<i32> {
    let rows: Vec<HashRow> = args
        .names
        .iter()
        .map(|name| {
            let id = MessageId::from_name_with_seed(name, args.seed);
            HashRow::new(name, id, ctx.width)
        })
        .collect();
    print_hashes(&rows, ctx.format);
    Ok(SUCCESS)
}
