use anyhow::Context;
use clap::{Parser, Subcommand};
use opcode_token::codec::TokenPayload;
use opcode_token::config::{self, VerifierConfig};
use opcode_token::keys::KeyPairProvisioner;
use opcode_token::tracing_config::{init_tracing, TracingConfig};
use opcode_token::verification::VerificationService;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "opcode-token",
    version,
    about = "Issue and verify RSA-signed operation tokens",
    long_about = "Tokens bind an operation code, a directory-authenticated username, \
                  this server's seed and the issuance time under the server's RSA key. \
                  Anyone holding the public key can verify a token and read its payload."
)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new key pair for token signing
    Keygen {
        /// RSA modulus size in bits
        #[arg(long, env = "TOKEN_KEY_BITS", default_value_t = config::DEFAULT_KEY_BITS)]
        bits: usize,

        /// Write key-private.pem and key-public.pem into this directory
        /// instead of printing them
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Verify a token with the configured public key and show its contents
    Verify {
        token: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the canonical payload that would be signed, without signing it
    Payload {
        #[arg(long)]
        opcode: String,

        #[arg(long)]
        username: String,

        /// Unix timestamp; defaults to now
        #[arg(long)]
        issued_at: Option<i64>,

        #[arg(long, env = "TOKEN_SYSTEM_SEED", default_value = config::DEFAULT_SYSTEM_SEED)]
        seed: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut tracing = TracingConfig::default();
    if cli.json_logs {
        tracing = tracing.with_json_output();
    }
    init_tracing(&tracing);

    match cli.cmd {
        Command::Keygen { bits, output } => keygen(bits, output),
        Command::Verify { token, json } => verify(&token, json),
        Command::Payload {
            opcode,
            username,
            issued_at,
            seed,
        } => payload(&seed, &opcode, &username, issued_at),
    }
}

fn keygen(bits: usize, output: Option<PathBuf>) -> anyhow::Result<()> {
    let provisioned = KeyPairProvisioner::provision(bits)?;

    match output {
        Some(dir) => {
            let (private_path, public_path) = provisioned.write_to_dir(&dir)?;
            println!("Generated {}-bit key pair:", bits);
            println!("  Private key: {}", private_path.display());
            println!("  Public key:  {}", public_path.display());
            println!();
            println!("Keep the private key secret. Point the issuer at these files with:");
            println!("  export TOKEN_PRIVATE_KEY_FILE={}", private_path.display());
            println!("  export TOKEN_PUBLIC_KEY_FILE={}", public_path.display());
        }
        None => {
            println!("{}", provisioned.private_key_pem.as_str());
            println!("{}", provisioned.public_key_pem);
            println!("Use --output <dir> to save the keys to files.");
        }
    }

    Ok(())
}

fn verify(token: &str, json: bool) -> anyhow::Result<()> {
    let config = VerifierConfig::from_env().context("loading configuration")?;
    let service = VerificationService::from_public_key_file(&config.public_key_file)?;
    info!(public_key_file = %config.public_key_file.display(), "Verifier ready");

    let view = service.verify(token)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("Username:     {}", view.payload.username);
        println!("Opcode:       {}", view.payload.opcode);
        println!("System seed:  {}", view.payload.system_seed);
        println!("Issued at:    {}", view.payload.issued_at);
        println!("Issued (UTC): {}", view.issued_at_display);
        println!("Age:          {}s", view.age_secs);
        println!("Cleartext:    {}", view.cleartext);
    }

    Ok(())
}

fn payload(seed: &str, opcode: &str, username: &str, issued_at: Option<i64>) -> anyhow::Result<()> {
    config::validate_seed(seed)?;
    let issued_at = issued_at.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let payload = TokenPayload::new(seed, opcode, username, issued_at);
    println!("{}", payload.canonical()?);
    Ok(())
}
