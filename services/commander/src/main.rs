use clap::{App, Arg};
use commander::commands;
use commander::server::CommandProtocol;
use ion::logging;
use std::process;
use tachyon::net::factory::Factory;
use tachyon::reactor::Reactor;

pub fn main() {
    let port_default = ion::DEFAULT_PORT.to_string();

    let matches = App::new("Command Server")
        .version("1.0")
        .author("Commander Contributors")
        .about("Runs the command relay server.")
        .arg(
            Arg::with_name("host")
                .long("host")
                .takes_value(true)
                .default_value(ion::DEFAULT_HOST)
                .help("Interface to bind"),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .takes_value(true)
                .default_value(&port_default)
                .help("Port to bind"),
        )
        .get_matches();

    let host = matches.value_of("host").expect("host has a default");
    let port: u16 = matches
        .value_of("port")
        .expect("port has a default")
        .parse()
        .expect("Error parsing port");

    // Initialize logging
    let log = logging::init();

    // Populating the registry validates the whole packet schema; any error
    // here must keep the listener from ever opening.
    let registry = commands::registry();
    logging::info!(log, "packet registry ready"; "packets" => registry.len());

    let mut reactor = Reactor::new(&log).expect("Error creating reactor");

    let factory = match Factory::listen(&mut reactor, host, port, CommandProtocol::builder(), &log)
    {
        Ok(factory) => factory,
        Err(err) => {
            logging::crit!(log, "unable to listen";
                           "host" => host,
                           "port" => port,
                           "error" => ?err);
            process::exit(1);
        }
    };

    reactor.run();

    drop(factory);
    logging::info!(log, "server stopped");
}
