use clap::{App, Arg, SubCommand};
use colored::*;
use obsbus::protocol::{parse_push, parse_reply, Push, Reply};
use obsbus::state::MasterState;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "5557";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("obsbus")
        .version("0.1.0")
        .about("Observatory fleet coordinator - operator client")
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Coordinator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Coordinator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("state")
                .about("Show the current macro-state word and phase"),
        )
        .subcommand(
            SubCommand::with_name("status")
                .about("Show the full fleet status snapshot"),
        )
        .subcommand(
            SubCommand::with_name("standby")
                .about("Flip the standby switch")
                .arg(
                    Arg::with_name("switch")
                        .help("Standby switch position")
                        .required(true)
                        .possible_values(&["on", "off"]),
                ),
        )
        .subcommand(SubCommand::with_name("open").about("Open the dome shutter"))
        .subcommand(SubCommand::with_name("close").about("Close the dome shutter"))
        .subcommand(
            SubCommand::with_name("monitor")
                .about("Follow state and value pushes (Ctrl+C to stop)"),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap();
    let port = matches.value_of("port").unwrap().parse::<u16>()?;

    match matches.subcommand() {
        ("state", _) => {
            let reply = send_command(host, port, "state").await?;
            print_state_reply(&reply);
        }
        ("status", _) => {
            let reply = send_command(host, port, "status").await?;
            match reply {
                Reply::Ok(Some(json)) => println!("{}", json),
                Reply::Ok(None) => println!("{}", "no status".yellow()),
                Reply::Err(err) => print_error(&err.to_string()),
            }
        }
        ("standby", Some(sub_matches)) => {
            let switch = sub_matches.value_of("switch").unwrap();
            let reply = send_command(host, port, &format!("standby {}", switch)).await?;
            print_plain_reply(&format!("standby {}", switch), &reply);
        }
        ("open", _) => {
            let reply = send_command(host, port, "open").await?;
            print_plain_reply("open", &reply);
        }
        ("close", _) => {
            let reply = send_command(host, port, "close").await?;
            print_plain_reply("close", &reply);
        }
        ("monitor", _) => {
            monitor(host, port).await?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            println!("{}", "Quick start:".bright_green());
            println!("  {}  Show the macro-state", "obsbus state".bright_cyan());
            println!("  {}  Follow pushes", "obsbus monitor".bright_cyan());
        }
    }

    Ok(())
}

async fn send_command(
    host: &str,
    port: u16,
    command: &str,
) -> Result<Reply, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} cannot connect to coordinator at {}", "error:".red(), addr);
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} is obsbusd running?", "hint:".yellow());
            }
            return Err(e.into());
        }
    };

    let (reader, mut writer) = stream.into_split();
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // Push lines may arrive before the terminal reply; skip them
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if parse_push(&line).is_ok() {
            continue;
        }
        return Ok(parse_reply(&line)?);
    }
    Err("connection closed before reply".into())
}

async fn monitor(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let stream = TcpStream::connect((host, port)).await?;
    println!("{}", "following coordinator pushes...".bright_blue().bold());

    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_push(&line) {
            Ok(Push::MasterState(word)) => match MasterState::decode(word) {
                Some(state) => println!(
                    "{} {:#04x} {:?}{}{}",
                    "state".bright_white(),
                    word,
                    state.phase,
                    if state.standby { " standby".yellow().to_string() } else { String::new() },
                    if state.off { " off".red().to_string() } else { String::new() },
                ),
                None => println!("{} {:#04x}", "state".bright_white(), word),
            },
            Ok(Push::Value { name, value }) => {
                println!("{} {} = {}", "value".bright_white(), name.bright_cyan(), value);
            }
            Err(_) => println!("{}", line.dimmed()),
        }
    }
    Ok(())
}

fn print_state_reply(reply: &Reply) {
    match reply {
        Reply::Ok(Some(raw)) => match raw.parse::<u32>().ok().and_then(MasterState::decode) {
            Some(state) => {
                println!(
                    "{} {:?}{}{}",
                    "phase:".bright_white(),
                    state.phase,
                    if state.standby { " (standby)".yellow().to_string() } else { String::new() },
                    if state.off { " (off)".red().to_string() } else { String::new() },
                );
            }
            None => println!("{} {}", "state word:".bright_white(), raw),
        },
        Reply::Ok(None) => println!("{}", "no state yet".yellow()),
        Reply::Err(err) => print_error(&err.to_string()),
    }
}

fn print_plain_reply(action: &str, reply: &Reply) {
    match reply {
        Reply::Ok(value) => {
            println!("{} {}", "ok".bright_green(), action.bright_white());
            if let Some(value) = value {
                println!("  {}", value);
            }
        }
        Reply::Err(err) => print_error(&format!("{} failed: {}", action, err)),
    }
}

fn print_error(message: &str) {
    println!("{} {}", "error".bright_red(), message);
}
