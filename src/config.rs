// src/config.rs

//! Startup configuration, parsed directly from CLI arguments via
//! `env::args()` rather than via a config file or `clap`.

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub replica_of: Option<(String, u16)>,
    pub run_id: String,
}

impl Config {
    /// Parses `--port <p>` and `--replicaof "<host> <port>"` from `args`
    /// (an iterator over raw argv, excluding argv[0]). Exits the process
    /// with a non-zero status and a message on stderr for any value that
    /// cannot be parsed.
    pub fn from_args<I: Iterator<Item = String>>(args: I) -> Self {
        let mut port: u16 = 6379;
        let mut replica_of = None;

        let args: Vec<String> = args.collect();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--port" => {
                    let Some(value) = args.get(i + 1) else {
                        eprintln!("--port requires a value");
                        std::process::exit(1);
                    };
                    port = value.parse().unwrap_or_else(|_| {
                        eprintln!("invalid --port value '{value}'");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--replicaof" => {
                    let Some(value) = args.get(i + 1) else {
                        eprintln!("--replicaof requires a value");
                        std::process::exit(1);
                    };
                    replica_of = Some(parse_replicaof(value));
                    i += 2;
                }
                other => {
                    eprintln!("unrecognized argument '{other}'");
                    std::process::exit(1);
                }
            }
        }

        Self {
            port,
            replica_of,
            run_id: generate_run_id(),
        }
    }
}

fn parse_replicaof(value: &str) -> (String, u16) {
    let mut parts = value.split_whitespace();
    let (Some(host), Some(port_str), None) = (parts.next(), parts.next(), parts.next()) else {
        eprintln!("--replicaof expects \"<host> <port>\"");
        std::process::exit(1);
    };
    let port: u16 = port_str.parse().unwrap_or_else(|_| {
        eprintln!("invalid --replicaof port '{port_str}'");
        std::process::exit(1);
    });
    (host.to_string(), port)
}

/// A 40-character hex run ID, used to identify this instance to replicas
/// during the handshake.
fn generate_run_id() -> String {
    let mut bytes = [0u8; 20];
    getrandom::fill(&mut bytes).expect("system randomness source must be available");
    hex::encode(bytes)
}
