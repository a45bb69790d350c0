use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use authcore::services::auth::codec::{generate_rsa_keypair, generate_secret};

/// Generate signing material for local development and bootstrap.
///
/// Production keys are expected to come from a secret manager; this tool only
/// produces fresh values:
/// - `secret`: random HMAC secret for HS256/384/512
/// - `rsa`: RSA keypair (PKCS#8 private, SPKI public) for RS*/PS*
#[derive(Parser, Debug)]
#[command(name = "keygen", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a random HMAC secret (URL-safe base64)
    Secret {
        /// Entropy in bytes (minimum 32)
        #[arg(long, default_value_t = 48)]
        bytes: usize,
    },
    /// Generate an RSA keypair
    Rsa {
        /// Modulus size in bits (minimum 2048)
        #[arg(long, default_value_t = 2048)]
        bits: usize,

        /// Write private.pem / public.pem here instead of printing env lines
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
}

// One-line form for .env files (escaped newlines are expanded on load).
fn env_line(name: &str, pem: &str) -> String {
    format!("{name}=\"{}\"", pem.trim_end().replace('\n', "\\n"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Secret { bytes } => {
            let secret = generate_secret(bytes)?;
            println!("JWT_SECRET={secret}");
        }
        Command::Rsa { bits, out_dir } => {
            let pair = generate_rsa_keypair(bits)?;
            match out_dir {
                Some(dir) => {
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("creating {}", dir.display()))?;
                    let private = dir.join("private.pem");
                    let public = dir.join("public.pem");
                    fs::write(&private, &pair.private_key_pem)
                        .with_context(|| format!("writing {}", private.display()))?;
                    fs::write(&public, &pair.public_key_pem)
                        .with_context(|| format!("writing {}", public.display()))?;
                    eprintln!("wrote {} and {}", private.display(), public.display());
                }
                None => {
                    println!("JWT_ALGORITHM=RS256");
                    println!("{}", env_line("JWT_PRIVATE_KEY_PEM", &pair.private_key_pem));
                    println!("{}", env_line("JWT_PUBLIC_KEY_PEM", &pair.public_key_pem));
                }
            }
        }
    }

    Ok(())
}
