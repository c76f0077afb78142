use std::path::Path;
use std::process::exit;

use clap::{CommandFactory, Parser};
use engine::packet::PacketType;
use rohc_comp::config::{Cli, Config};

fn usage() {
    let mut command = Cli::command();
    eprintln!("{}", command.render_help());
}

fn main() {
    let cli = Cli::parse();

    if cli.help {
        usage();
        exit(1);
    }

    let (Some(flow), Some(packet_type)) = (cli.flow, cli.packet_type) else {
        usage();
        exit(1);
    };

    let Ok(expected) = packet_type.parse::<PacketType>() else {
        eprintln!("unknown packet type '{}'\n", packet_type);
        usage();
        exit(1);
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to read the configuration: {:#}", error);
            exit(1);
        }
    };

    if simple_logger::init_with_level(config.log.level.as_level()).is_err() {
        eprintln!("failed to initialize the logger");
        exit(1);
    }

    match rohc_comp::run_flow(&config, Path::new(&flow), expected) {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(error) => {
            log::error!("{:#}", error);
            exit(1);
        }
    }
}
