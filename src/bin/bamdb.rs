use std::io::{self, BufWriter};
use std::time::Instant;
use std::{env, process};

use bamdb::convert::{self, Config, OutputMode};

use env_logger::Env;
use log::info;

//-----------------------------------------------------------------------------

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let start_time = Instant::now();

    // Parse arguments.
    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or(String::from("bamdb"));
    let usage = convert::options().usage(&format!("Usage: {} [options] [input.sam|input.bam]", program));
    let config = match Config::from_args(args.get(1..).unwrap_or_default()) {
        Ok(Some(config)) => config,
        Ok(None) => {
            eprint!("{}", usage);
            process::exit(0);
        },
        Err(err) => {
            eprintln!("{}", err);
            eprint!("{}", usage);
            process::exit(1);
        },
    };

    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());
    let records = convert::convert(&config, &mut output).map_err(|x| x.to_string())?;

    if config.mode == OutputMode::Sqlite {
        info!("Converted {} records", records);
        let end_time = Instant::now();
        let seconds = end_time.duration_since(start_time).as_secs_f64();
        info!("Used {:.3} seconds", seconds);
    }

    Ok(())
}

//-----------------------------------------------------------------------------
