/// ATTACK PRODUCER: Live Frame Injection
///
/// Connects to the replayer's injection listener and streams fake CAN
/// frames at a fixed rate, simulating an attacker flooding the bus while a
/// recorded capture replays. Every injected frame comes back out of the
/// multiplexer labeled Attack, giving the IDS under evaluation its ground
/// truth.
use colored::*;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const INJECT_ADDR: &str = "127.0.0.1:45556";
const DEFAULT_TARGET_ID: u32 = 0x130;
const DEFAULT_INTERVAL_MS: u64 = 50;

fn usage() -> ! {
    eprintln!("Usage: attack_producer [--id HEX] [--interval MS] [--count N]");
    eprintln!();
    eprintln!("  --id HEX       arbitration ID to spoof (default 130)");
    eprintln!("  --interval MS  delay between frames (default 50)");
    eprintln!("  --count N      stop after N frames (default: run until Ctrl+C)");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();
    let mut target_id = DEFAULT_TARGET_ID;
    let mut interval_ms = DEFAULT_INTERVAL_MS;
    let mut count = 0u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--id" => {
                i += 1;
                match args.get(i).and_then(|v| u32::from_str_radix(v, 16).ok()) {
                    Some(id) => target_id = id,
                    None => usage(),
                }
            }
            "--interval" => {
                i += 1;
                match args.get(i).and_then(|v| v.parse().ok()) {
                    Some(ms) => interval_ms = ms,
                    None => usage(),
                }
            }
            "--count" => {
                i += 1;
                match args.get(i).and_then(|v| v.parse().ok()) {
                    Some(n) => count = n,
                    None => usage(),
                }
            }
            _ => usage(),
        }
        i += 1;
    }

    println!("{}", "═══════════════════════════════════════".red().bold());
    println!("{}", "     ATTACK PRODUCER: Frame Injection  ".red().bold());
    println!("{}", "═══════════════════════════════════════".red().bold());
    println!();
    println!("{}", "⚠️  Security research tool for authorized test systems".yellow());
    println!();

    println!(
        "{} Connecting to injection listener at {}...",
        "→".red(),
        INJECT_ADDR.bright_white()
    );
    let mut stream = TcpStream::connect(INJECT_ADDR).await?;
    println!("{} Connected!", "✓".red().bold());
    println!(
        "{} Injecting ID {} every {}ms",
        "→".red(),
        format!("{:03X}", target_id).bright_white(),
        interval_ms
    );
    println!();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        println!("\n{} Shutting down...", "→".yellow());
        std::process::exit(0);
    });

    let start = Instant::now();
    let mut sent = 0u64;

    loop {
        if count > 0 && sent >= count {
            break;
        }

        let data: Vec<u8> = {
            let mut rng = rand::thread_rng();
            (0..8).map(|_| rng.gen()).collect()
        };
        let payload = data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let line = format!(
            "{:.6},{:03X},8,{}\n",
            start.elapsed().as_secs_f64(),
            target_id,
            payload
        );

        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        sent += 1;

        if sent % 10 == 0 {
            println!("{} Injected {} attack frames", "⚡".red(), sent);
        }

        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }

    println!(
        "{} Done: {} frames injected in {:.1}s",
        "✓".green().bold(),
        sent,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
