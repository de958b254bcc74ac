/// Primary observer: receives the merged, labeled stream from the replayer
/// and prints it to the console, attack frames highlighted. Stands in for
/// the IDS under evaluation.
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

const LISTEN_ADDR: &str = "127.0.0.1:45555";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!(
        "{}",
        "═══════════════════════════════════════════════════════════════"
            .cyan()
            .bold()
    );
    println!(
        "{}",
        "                    REPLAY STREAM MONITOR                      "
            .cyan()
            .bold()
    );
    println!(
        "{}",
        "═══════════════════════════════════════════════════════════════"
            .cyan()
            .bold()
    );
    println!();

    tokio::spawn(async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        println!("\n{} Shutting down...", "→".yellow());
        std::process::exit(0);
    });

    let listener = TcpListener::bind(LISTEN_ADDR).await?;
    println!(
        "{} Listening on {}, waiting for the replayer...",
        "✓".green().bold(),
        LISTEN_ADDR.bright_white()
    );
    println!();

    loop {
        let (socket, peer) = listener.accept().await?;
        println!(
            "{} Replayer connected from {}",
            "→".cyan(),
            peer.to_string().bright_white()
        );

        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        let mut normal = 0u64;
        let mut attack = 0u64;

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                break;
            }

            let trimmed = line.trim_end();
            let fields: Vec<&str> = trimmed.split(',').collect();
            if fields.len() != 5 {
                println!("{} {}", "⚠".yellow(), trimmed);
                continue;
            }

            match fields[4] {
                "Attack" => {
                    attack += 1;
                    println!(
                        "  {} {:>12}  ID {}  [{}]  {}",
                        "⚡".red(),
                        fields[0],
                        fields[1].red().bold(),
                        fields[2],
                        fields[3].red()
                    );
                }
                _ => {
                    normal += 1;
                    println!(
                        "  {} {:>12}  ID {}  [{}]  {}",
                        "·".bright_black(),
                        fields[0],
                        fields[1].bright_cyan(),
                        fields[2],
                        fields[3]
                    );
                }
            }
        }

        println!(
            "{} Replayer disconnected ({} normal, {} attack frames)",
            "→".bright_black(),
            normal,
            attack
        );
        println!();
    }
}
