mod driver;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use irtrans_core::{FrameCodec, ProtocolSpec, PulsePair};

#[derive(Parser)]
#[command(name = "irtrans")]
#[command(about = "Infrared transceiver for pulse-timing remote protocols")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a symbolic IR code to a raw timing file
    Encode {
        /// Symbolic code (header + payload + checksum)
        #[arg(value_name = "CODE")]
        code: String,

        /// Output timing file, one "pulse pause" line per pair
        #[arg(value_name = "OUTPUT.TXT")]
        output: PathBuf,
    },

    /// Decode a raw timing file to a symbolic IR code
    Decode {
        /// Input timing file
        #[arg(value_name = "INPUT.TXT")]
        input: PathBuf,
    },

    /// Run the JSON HTTP/WebSocket transceiver service
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "5590")]
        port: u16,

        /// File persisting the last confirmed code
        #[arg(long)]
        mem_file: Option<PathBuf>,

        /// Simulated hardware ack delay of the loopback driver, in ms
        #[arg(long, default_value = "50")]
        ack_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // the core library logs through `log`, the server through `tracing`
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { code, output } => encode_command(&code, &output)?,
        Commands::Decode { input } => decode_command(&input)?,
        Commands::Serve {
            port,
            mem_file,
            ack_delay_ms,
        } => {
            server::serve(server::ServeOptions {
                port,
                mem_file,
                ack_delay: Duration::from_millis(ack_delay_ms),
            })
            .await?
        }
    }

    Ok(())
}

fn encode_command(code: &str, output_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let codec = FrameCodec::new(ProtocolSpec::daikin())?;
    let pairs = codec.encode(code)?;
    println!("Encoded {} symbols to {} pulse pairs", code.len(), pairs.len());

    let mut text = String::with_capacity(pairs.len() * 12);
    for pair in &pairs {
        text.push_str(&format!("{} {}\n", pair.pulse_us, pair.pause_us));
    }
    std::fs::write(output_path, text)?;
    println!("Wrote {} pairs to {}", pairs.len(), output_path.display());
    Ok(())
}

fn decode_command(input_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(input_path)?;
    let pairs = PulsePair::parse_sequence(&text)?;
    println!("Read {} pulse pairs from {}", pairs.len(), input_path.display());

    let codec = FrameCodec::new(ProtocolSpec::daikin())?;
    let decoded = codec.decode(&pairs);
    match &decoded.error {
        None => println!("Decoded code: {}", decoded.symbols),
        Some(err) => {
            println!("Decode failed: {err}");
            if !decoded.symbols.is_empty() {
                println!("Seen symbols: {}", decoded.symbols);
            }
        }
    }
    Ok(())
}
