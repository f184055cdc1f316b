// generate_secret.rs
// Utility to generate fresh signing secrets for the service

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

fn secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn main() {
    println!("Generating new 256-bit secrets...\n");
    println!("Add these to your .env file:");
    println!("─────────────────────────────────────────────────");
    println!("JWT_SECRET={}", secret());
    println!("WEBHOOK_SECRET={}", secret());
    println!("─────────────────────────────────────────────────");
    println!("\n⚠️  IMPORTANT:");
    println!("  • Keep these secrets out of version control");
    println!("  • Rotating JWT_SECRET signs every user out");
    println!("  • WEBHOOK_SECRET must match the payment processor's signing secret");
}
