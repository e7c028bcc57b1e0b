use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ota_metadata::{config, CertRequest, GenerateOptions, ImageOptions, Jwt, Listings, MetadataFiles};
use std::path::PathBuf;
use std::{fs, io, process};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "ota-metadata", version, about = "Generate, sign and apply OTA rootfs metadata")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List directories, symlinks and regular files of a rootfs
    Gen(GenArgs),
    /// Sign the metadata listings into a JWT
    Sign(SignArgs),
    /// Check a metadata JWT against a certificate
    Verify(VerifyArgs),
    /// Rebuild a rootfs from metadata listings
    Data(DataArgs),
    /// Create a self-signed signing certificate
    Cert(CertArgs),
    /// Build update_image.tar.gz from signed metadata
    BuildImage(BuildImageArgs),
}

#[derive(Args)]
struct ListingArgs {
    /// Directory metadata
    #[clap(long, default_value = config::DIRECTORY_FILE)]
    directory_file: PathBuf,
    /// Symbolic link metadata
    #[clap(long, default_value = config::SYMLINK_FILE)]
    symlink_file: PathBuf,
    /// Regular file metadata
    #[clap(long, default_value = config::REGULAR_FILE)]
    regular_file: PathBuf,
}

#[derive(Args)]
struct GenArgs {
    /// Rootfs to describe
    #[clap(long)]
    target_dir: PathBuf,
    /// Directory for zstd copies of large files
    #[clap(long)]
    compressed_dir: Option<PathBuf>,
    /// Minimum original/compressed size ratio to keep a compressed copy
    #[clap(long, default_value_t = config::COMPRESS_RATIO)]
    compress_ratio: f64,
    /// Smallest file size that is compressed
    #[clap(long, default_value_t = config::COMPRESS_FILESIZE)]
    compress_filesize: u64,
    /// Prefix of every listed path
    #[clap(long, default_value = config::PREFIX)]
    prefix: String,
    /// Where the listings are written
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,
    #[clap(flatten)]
    listings: ListingArgs,
    #[clap(long, default_value = config::TOTAL_REGULAR_SIZE_FILE)]
    total_regular_size_file: PathBuf,
    /// Ignore rules in .gitignore format
    #[clap(long, default_value = config::IGNORE_FILE)]
    ignore_file: PathBuf,
}

#[derive(Args)]
struct SignArgs {
    /// P-256 private key in PEM form
    #[clap(long)]
    sign_key: PathBuf,
    #[clap(long)]
    cert_file: PathBuf,
    #[clap(long)]
    persistent_file: PathBuf,
    #[clap(long, default_value = config::METADATA_JWT)]
    output: PathBuf,
    #[clap(flatten)]
    listings: ListingArgs,
    #[clap(long, default_value = config::ROOTFS_DIRECTORY)]
    rootfs_directory: String,
    #[clap(long)]
    compressed_rootfs_directory: Option<String>,
    /// Included in the manifest when present
    #[clap(long, default_value = config::TOTAL_REGULAR_SIZE_FILE)]
    total_regular_size_file: PathBuf,
}

#[derive(Args)]
struct VerifyArgs {
    #[clap(long)]
    cert_file: PathBuf,
    #[clap(long, default_value = config::METADATA_JWT)]
    jwt: PathBuf,
    /// Also check the hashes of the referenced files in this directory
    #[clap(long)]
    metadata_dir: Option<PathBuf>,
}

#[derive(Args)]
struct DataArgs {
    /// Destination directory
    #[clap(long)]
    dst_dir: PathBuf,
    /// Source directory
    #[clap(long)]
    src_dir: PathBuf,
    /// Show progress
    #[clap(long)]
    progress: bool,
    #[clap(flatten)]
    listings: ListingArgs,
}

#[derive(Args)]
struct CertArgs {
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,
    #[clap(long, default_value = config::CERT_SUBJECT)]
    subject: String,
    #[clap(long, default_value_t = config::CERT_DAYS)]
    days: u32,
}

#[derive(Args)]
struct BuildImageArgs {
    /// Bucket holding metadata.jwt, the listings and the rootfs
    s3_url: String,
    /// Use an already downloaded copy instead of syncing
    src_dir: Option<PathBuf>,
    #[clap(long, default_value = config::UPDATE_IMAGE)]
    output: PathBuf,
    /// Check the metadata signature against this certificate
    #[clap(long)]
    cert_file: Option<PathBuf>,
    #[clap(long)]
    no_progress: bool,
}

fn gen(args: GenArgs) -> anyhow::Result<()> {
    let mut options = GenerateOptions::new(args.target_dir);
    options.compressed_dir = args.compressed_dir;
    options.compress_ratio = args.compress_ratio;
    options.compress_filesize = args.compress_filesize;
    options.prefix = args.prefix;
    options.output_dir = args.output_dir;
    options.directory_file = args.listings.directory_file;
    options.symlink_file = args.listings.symlink_file;
    options.regular_file = args.listings.regular_file;
    options.total_regular_size_file = args.total_regular_size_file;
    options.ignore_file = Some(args.ignore_file);

    ota_metadata::generate(&options).context("failed to generate metadata")?;
    Ok(())
}

fn sign(args: SignArgs) -> anyhow::Result<()> {
    let files = MetadataFiles {
        directory_file: args.listings.directory_file,
        symlink_file: args.listings.symlink_file,
        regular_file: args.listings.regular_file,
        persistent_file: args.persistent_file,
        rootfs_directory: args.rootfs_directory,
        certificate_file: args.cert_file,
        total_regular_size_file: args.total_regular_size_file,
        compressed_rootfs_directory: args.compressed_rootfs_directory,
    };
    ota_metadata::sign_metadata(&files, &args.sign_key, &args.output)
        .with_context(|| format!("failed to sign {}", args.output.display()))
}

fn verify(args: VerifyArgs) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.jwt).with_context(|| format!("failed to read {}", args.jwt.display()))?;
    let pem = fs::read_to_string(&args.cert_file)
        .with_context(|| format!("failed to read {}", args.cert_file.display()))?;
    let jwt: Jwt = text.parse()?;
    let manifest = ota_metadata::verify(&jwt, &pem).with_context(|| format!("failed to verify {}", args.jwt.display()))?;

    if let Some(dir) = &args.metadata_dir {
        for file_ref in [
            &manifest.directory,
            &manifest.symlink,
            &manifest.regular,
            &manifest.persistent,
            &manifest.certificate,
        ] {
            file_ref.verify_in(dir)?;
        }
    }

    println!("version: {}", manifest.version);
    println!("directory: {} {}", manifest.directory.file, manifest.directory.hash);
    println!("symboliclink: {} {}", manifest.symlink.file, manifest.symlink.hash);
    println!("regular: {} {}", manifest.regular.file, manifest.regular.hash);
    println!("persistent: {} {}", manifest.persistent.file, manifest.persistent.hash);
    println!("rootfs_directory: {}", manifest.rootfs_directory);
    println!("certificate: {} {}", manifest.certificate.file, manifest.certificate.hash);
    if let Some(size) = &manifest.total_regular_size {
        println!("total_regular_size: {}", size);
    }
    if let Some(dir) = &manifest.compressed_rootfs_directory {
        println!("compressed_rootfs_directory: {}", dir);
    }
    Ok(())
}

fn data(args: DataArgs) -> anyhow::Result<()> {
    let listings = Listings {
        directory_file: args.listings.directory_file,
        symlink_file: args.listings.symlink_file,
        regular_file: args.listings.regular_file,
    };
    ota_metadata::rebuild(&args.dst_dir, &args.src_dir, &listings, args.progress)
        .with_context(|| format!("failed to rebuild {}", args.dst_dir.display()))
}

fn cert(args: CertArgs) -> anyhow::Result<()> {
    let request = CertRequest {
        subject: args.subject,
        days: args.days,
        ..CertRequest::new(args.output_dir)
    };
    request.run().context("failed to create certificate")?;
    Ok(())
}

fn build_image(args: BuildImageArgs) -> anyhow::Result<()> {
    let options = ImageOptions {
        output: args.output,
        certificate: args.cert_file,
        progress: !args.no_progress,
        ..ImageOptions::new(args.s3_url, args.src_dir)
    };
    ota_metadata::build_image(&options)
        .with_context(|| format!("failed to build {}", options.output.display()))
}

fn tool() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(ok) => ok,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            process::exit(1);
        }
        Err(err) => err.exit(),
    };

    match cli.command {
        Command::Gen(args) => gen(args),
        Command::Sign(args) => sign(args),
        Command::Verify(args) => verify(args),
        Command::Data(args) => data(args),
        Command::Cert(args) => cert(args),
        Command::BuildImage(args) => build_image(args),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .without_time()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match tool() {
        Ok(()) => (),
        Err(err) => {
            eprintln!("ota-metadata: {:#}", err);
            process::exit(1);
        }
    }
}
