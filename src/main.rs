use clap::{Parser, Subcommand};

mod actions;

/// Post-quantum keyring tool over code-based cryptography.
#[derive(Parser)]
#[command(name = "ccr", version, about)]
struct Cli {
    /// ASCII-armor the output / expect armored input.
    #[arg(short, long, global = true)]
    armor: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a keypair and store it in the keyring.
    GenKey {
        /// Algorithm name or alias (ENC, SIG, ...); see list-algorithms.
        algspec: String,
        /// Name the key is filed under.
        #[arg(short, long)]
        name: String,
        /// Store the private key symmetrically encrypted.
        #[arg(long)]
        lock: bool,
    },
    /// List public keys (or secrets) in the keyring.
    List {
        #[arg(long)]
        secrets: bool,
        /// Name substring or @keyid prefix.
        #[arg(default_value = "")]
        search: String,
    },
    /// Write matching public keys to stdout.
    Export {
        #[arg(default_value = "")]
        search: String,
    },
    /// Read public keys from stdin into the keyring.
    Import,
    /// Encrypt stdin for a recipient.
    Encrypt {
        /// Recipient key: name substring or @keyid prefix.
        #[arg(short, long)]
        recipient: String,
        /// Override the algorithm (defaults to the key's own).
        #[arg(short = 'g', long, default_value = "")]
        algspec: String,
    },
    /// Decrypt stdin with a keyring secret.
    Decrypt,
    /// Sign stdin.
    Sign {
        /// Signer key; defaults to $CCR_USER.
        #[arg(short, long, default_value = "")]
        user: String,
        #[arg(short = 'g', long, default_value = "")]
        algspec: String,
    },
    /// Verify a signed message from stdin; print the message.
    Verify,
    /// Generate a standalone symmetric key.
    GenSymkey {
        /// Comma-separated cipher/hash spec, or the SYM alias.
        #[arg(default_value = "SYM")]
        algspec: String,
    },
    /// List supported algorithms.
    ListAlgorithms,
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::GenKey {
            algspec,
            name,
            lock,
        } => actions::gen_key(algspec, name, *lock),
        Command::List { secrets, search } => actions::list(*secrets, search),
        Command::Export { search } => actions::export(search, cli.armor),
        Command::Import => actions::import(cli.armor),
        Command::Encrypt { recipient, algspec } => {
            actions::encrypt(recipient, algspec, cli.armor)
        }
        Command::Decrypt => actions::decrypt(cli.armor),
        Command::Sign { user, algspec } => actions::sign(user, algspec, cli.armor),
        Command::Verify => actions::verify(cli.armor),
        Command::GenSymkey { algspec } => actions::gen_symkey(algspec, cli.armor),
        Command::ListAlgorithms => actions::list_algorithms(),
    };

    if let Err(e) = result {
        eprintln!("ccr: {e}");
        std::process::exit(e.exit_code());
    }
}
