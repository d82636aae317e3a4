//! Sends a reproducible burst of smoke traffic at a running server.
//!
//! Usage: `test-client [target-addr] [seed]`. Defaults to
//! `127.0.0.1:7111` with seed 42, so repeated runs produce identical
//! traffic.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::net::UdpSocket;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let target = args.next().unwrap_or_else(|| "127.0.0.1:7111".to_string());
    let seed: u64 = match args.next() {
        Some(raw) => raw.parse()?,
        None => 42,
    };

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&target).await?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    println!("🔥 Sending smoke traffic to {} (seed {})", target, seed);

    let mut sent = 0usize;

    for _ in 0..20 {
        let delta: u32 = rng.gen_range(1..20);
        socket.send(format!("requests:{}|c", delta).as_bytes()).await?;
        sent += 1;
    }
    for _ in 0..10 {
        let delta: u32 = rng.gen_range(1..10);
        socket.send(format!("requests.sampled:{}|c@0.5", delta).as_bytes()).await?;
        sent += 1;
    }
    for _ in 0..10 {
        let reading: f64 = rng.gen_range(-10.0..35.0);
        socket.send(format!("temperature:{:.1}|g", reading).as_bytes()).await?;
        sent += 1;
    }
    for _ in 0..50 {
        let millis: u32 = rng.gen_range(1..1000);
        socket.send(format!("response.time:{}|ms", millis).as_bytes()).await?;
        sent += 1;
    }
    for _ in 0..50 {
        let bytes: u32 = rng.gen_range(64..8192);
        socket.send(format!("payload.size:{}|h", bytes).as_bytes()).await?;
        sent += 1;
    }
    for _ in 0..20 {
        socket.send(b"logins:1|s").await?;
        sent += 1;
    }

    // One batched packet and one junk line the server must shrug off.
    socket.send(b"batch.a:1|c\nbatch.b:2.5|g\nbatch.c:3|ms").await?;
    socket.send(b"not-a-valid-line").await?;
    sent += 2;

    println!("✅ Sent {} datagrams across all five metric kinds", sent);
    println!("   (one of them deliberately malformed)");

    Ok(())
}
