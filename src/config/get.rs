use anyhow::Result;
use std::process;

use crate::args::BaseArgs;

pub fn run(base: BaseArgs, key: &str, global: bool, local: bool) -> Result<()> {
    let cfg = if global {
        super::load_global()?
    } else if local {
        super::local_path()
            .map(|p| super::load_file(&p))
            .unwrap_or_default()
    } else {
        super::load()?
    };

    let Some(value) = cfg.get_field(key) else {
        // Unset keys exit non-zero with no output so scripts can test for them.
        process::exit(1);
    };

    if base.json {
        let json = match value.parse::<u64>() {
            Ok(number) => serde_json::to_string(&number)?,
            Err(_) => serde_json::to_string(&value)?,
        };
        println!("{json}");
    } else {
        println!("{value}");
    }
    Ok(())
}
