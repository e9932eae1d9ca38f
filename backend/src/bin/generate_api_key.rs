//! Generate a random API key for the `API_KEY` setting.

use clap::Parser;
use rand::{rngs::OsRng, RngCore};

const MIN_BYTES: usize = 16;
const MAX_BYTES: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "generate-api-key", about = "Generate a random hex API key")]
struct Args {
    /// Number of random bytes (the key is twice as many hex characters)
    #[arg(default_value_t = 32)]
    length: usize,
}

fn generate_key(length: usize) -> Result<String, String> {
    if length < MIN_BYTES {
        return Err(format!("API key length must be at least {} bytes", MIN_BYTES));
    }
    if length > MAX_BYTES {
        return Err(format!("API key length cannot exceed {} bytes", MAX_BYTES));
    }

    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

fn main() {
    let args = Args::parse();

    let key = match generate_key(args.length) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("API key ({} characters):", key.len());
    println!("{}", key);
    println!();
    println!("Add it to the server environment:");
    println!("  API_KEY={}", key);
    println!();
    println!("Send it with each request, either as");
    println!("  Authorization: Bearer {}", key);
    println!("or");
    println!("  x-api-key: {}", key);
}
