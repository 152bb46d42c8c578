use clap::{App, Arg};
use commander::client::{packet_from_input, CommandClient, Reply};
use ion::logging;
use std::io::{self, BufRead};
use std::process;

const MENU: &str = "Enter command:\n1 - CONNECT;\n2 - PING;\n3 <data> - PINGD;\n4 <data> - DELAY;\n5 - QUIT;\n6 - FINISH.";

pub fn main() {
    let port_default = ion::DEFAULT_PORT.to_string();

    let matches = App::new("Command Client")
        .version("1.0")
        .author("Commander Contributors")
        .about("Interactive client for the command relay server.")
        .arg(
            Arg::with_name("host")
                .long("host")
                .takes_value(true)
                .default_value(ion::DEFAULT_HOST)
                .help("Server host"),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .takes_value(true)
                .default_value(&port_default)
                .help("Server port"),
        )
        .get_matches();

    let host = matches.value_of("host").expect("host has a default");
    let port: u16 = matches
        .value_of("port")
        .expect("port has a default")
        .parse()
        .expect("Error parsing port");

    let log = logging::init();

    let mut client = match CommandClient::connect(host, port, &log) {
        Ok(client) => client,
        Err(err) => {
            logging::crit!(log, "unable to connect"; "error" => %err);
            process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while !client.is_done() {
        println!("{}", MENU);

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                logging::error!(log, "stdin error"; "error" => %err);
                break;
            }
            None => break,
        };

        let packet = match packet_from_input(&line) {
            Some(packet) => packet,
            None => {
                println!("unrecognized command");
                continue;
            }
        };

        if let Err(err) = client.send(&packet) {
            logging::error!(log, "send failed"; "error" => %err);
            break;
        }

        match client.recv_reply() {
            Ok(reply) => report(&reply),
            Err(err) => {
                logging::error!(log, "receive failed"; "error" => %err);
                break;
            }
        }
    }

    client.shutdown();
}

fn report(reply: &Reply) {
    match reply {
        Reply::Connected { session } => println!("CONNECTED {}", session),
        Reply::Pong => println!("PONG"),
        Reply::PongD { data } => println!("PONGD {}", data),
        Reply::Delayed { data } => println!("DELAYED {}", data),
        Reply::AckQuit { session } => println!("ACKQUIT {}", session),
        Reply::AckFinish => println!("ACKFINISH"),
        Reply::Unknown(command) => println!("UNKNOWN {}", command),
    }
}
