use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};

use selfupdate::cancel::CancellationToken;
use selfupdate::config::ReleaseConfig;
use selfupdate::package::{applier, builder};

#[derive(FromArgs)]
/// Secure application self-update tooling.
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    GenerateKeys(GenerateKeysArgs),
    CreateUpdatePackage(CreateUpdatePackageArgs),
    Sign(SignArgs),
    Hash(HashArgs),
    CreatePatch(CreatePatchArgs),
    ApplyPatch(ApplyPatchArgs),
    Apply(ApplyArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "generate-keys")]
/// Generates a P-256 keypair, writing privateKey.pem and publicKey.pem.
struct GenerateKeysArgs {
    #[argh(option)]
    /// directory to write the key files into
    out_dir: PathBuf,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "create-update-package")]
/// Builds a signed update package from two directory trees.
struct CreateUpdatePackageArgs {
    #[argh(positional)]
    old_dir: PathBuf,
    #[argh(positional)]
    new_dir: PathBuf,
    #[argh(positional)]
    output_dir: PathBuf,
    #[argh(positional)]
    priv_key: PathBuf,
    #[argh(option)]
    /// release metadata (version, changes, etc.)
    config: Option<PathBuf>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "sign")]
/// Signs info.json in place with the given private key.
struct SignArgs {
    #[argh(positional)]
    info_json: PathBuf,
    #[argh(positional)]
    priv_key: PathBuf,
    #[argh(positional)]
    package: PathBuf,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "hash")]
/// Prints the lowercase hex SHA-256 of a file.
struct HashArgs {
    #[argh(positional)]
    file: PathBuf,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "create-patch")]
/// Creates a bsdiff patch transforming old into new.
struct CreatePatchArgs {
    #[argh(positional)]
    old: PathBuf,
    #[argh(positional)]
    new: PathBuf,
    #[argh(positional)]
    patch: PathBuf,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "apply-patch")]
/// Applies a bsdiff patch to old, writing new.
struct ApplyPatchArgs {
    #[argh(positional)]
    old: PathBuf,
    #[argh(positional)]
    patch: PathBuf,
    #[argh(positional)]
    new: PathBuf,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "apply")]
/// Applies a signed update package to a target installation directory.
struct ApplyArgs {
    #[argh(positional)]
    package: PathBuf,
    #[argh(positional)]
    target_dir: PathBuf,
    #[argh(option)]
    /// embedded public key used to verify the manifest signature
    pubkey: Option<PathBuf>,
}

fn run() -> Result<()> {
    let cli: Cli = argh::from_env();

    match cli.command {
        Command::GenerateKeys(args) => {
            std::fs::create_dir_all(&args.out_dir).context(format!("failed to create {:?}", args.out_dir))?;
            let kp = update_codec::sign::generate_keypair().context("failed to generate keypair")?;
            std::fs::write(args.out_dir.join("privateKey.pem"), kp.private_key_pem).context("failed to write privateKey.pem")?;
            std::fs::write(args.out_dir.join("publicKey.pem"), kp.public_key_pem).context("failed to write publicKey.pem")?;
            log::info!("wrote keypair to {}", args.out_dir.display());
        }
        Command::CreateUpdatePackage(args) => {
            let config = match args.config {
                Some(path) => ReleaseConfig::load(&path).context(format!("failed to load {:?}", path))?,
                None => ReleaseConfig::default(),
            };
            let signing_key = load_signing_key(&args.priv_key)?;
            let manifest = builder::build_update_package(&args.old_dir, &args.new_dir, &args.output_dir, &signing_key, &config)
                .context("failed to build update package")?;
            log::info!("wrote update package with {} file actions", manifest.files.len());
        }
        Command::Sign(args) => {
            let signing_key = load_signing_key(&args.priv_key)?;

            let info_text = std::fs::read_to_string(&args.info_json).context(format!("failed to read {:?}", args.info_json))?;
            let mut manifest: update_manifest::Manifest = serde_json::from_str(&info_text).context("failed to parse info.json")?;

            let package_hash = update_manifest::hash_file(&args.package).context(format!("failed to hash {:?}", args.package))?.to_hex();
            manifest.full_package_file = args.package.file_name().map(|n| n.to_string_lossy().into_owned());
            manifest.full_package_hash = Some(update_manifest::HexDigest::parse("FullPackageHash", package_hash)?);

            let canonical = update_manifest::canonical_bytes(&manifest)?;
            manifest.signature = Some(update_codec::sign::sign(&signing_key, &canonical).context("failed to sign manifest")?);

            std::fs::write(&args.info_json, serde_json::to_vec_pretty(&manifest)?).context(format!("failed to write {:?}", args.info_json))?;
            log::info!("signed {}", args.info_json.display());
        }
        Command::Hash(args) => {
            let hash = update_manifest::hash_file(&args.file).context(format!("failed to hash {:?}", args.file))?;
            println!("{}", hash.to_hex());
        }
        Command::CreatePatch(args) => {
            let old = std::fs::read(&args.old).context(format!("failed to read {:?}", args.old))?;
            let new = std::fs::read(&args.new).context(format!("failed to read {:?}", args.new))?;
            let patch = update_codec::bsdiff::create_patch(&old, &new)?;
            std::fs::write(&args.patch, patch).context(format!("failed to write {:?}", args.patch))?;
        }
        Command::ApplyPatch(args) => {
            let old = std::fs::read(&args.old).context(format!("failed to read {:?}", args.old))?;
            let patch = std::fs::read(&args.patch).context(format!("failed to read {:?}", args.patch))?;
            let new = update_codec::bsdiff::apply_patch(&old, &patch)?;
            std::fs::write(&args.new, new).context(format!("failed to write {:?}", args.new))?;
        }
        Command::Apply(args) => {
            let pubkey_path = args.pubkey.context("--pubkey is required: no public key is embedded in this binary")?;
            let key_text = std::fs::read_to_string(&pubkey_path).context(format!("failed to read {:?}", pubkey_path))?;
            let verifying_key = VerifyingKey::from_public_key_pem(&key_text).context("failed to parse public key")?;
            let manifest = applier::apply(&args.package, &args.target_dir, &verifying_key, &CancellationToken::new())
                .context("failed to apply update package")?;
            log::info!("applied update to version {} ({} file actions)", manifest.version, manifest.files.len());
        }
    }

    Ok(())
}

fn load_signing_key(path: &std::path::Path) -> Result<SigningKey> {
    let text = std::fs::read_to_string(path).context(format!("failed to read {path:?}"))?;
    SigningKey::from_pkcs8_pem(&text).context(format!("failed to parse private key at {path:?}"))
}

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

