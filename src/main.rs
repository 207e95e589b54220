//! jpegmeta: dump the segment structure and photo properties of JPEG files.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jpegmeta::{decode_jpeg, Jpeg, PropertyRecord};

#[derive(Parser)]
#[command(name = "jpegmeta")]
#[command(about = "Decode JPEG segments and summarize EXIF photo properties", long_about = None)]
struct Args {
    /// JPEG files to decode
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// List every segment found by the scanner
    #[arg(short, long)]
    segments: bool,

    /// List the decoded EXIF directories and their entries
    #[arg(short, long)]
    ifds: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let mut failed = false;
    for path in &args.files {
        if let Err(e) = process(path, &args) {
            eprintln!("*** {}: {:#}", path.display(), e);
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn process(path: &Path, args: &Args) -> Result<()> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let byte_size = f.metadata()?.len();
    let jpeg = decode_jpeg(BufReader::new(f)).context("aborted read")?;

    println!("{}", path.display());
    if args.segments {
        print_segments(&jpeg);
    }
    if args.ifds {
        print_ifds(&jpeg);
    }

    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    print_properties(&jpeg.properties(name, byte_size));
    Ok(())
}

fn print_segments(jpeg: &Jpeg) {
    for s in &jpeg.scan.segments {
        let d = &s.descriptor;
        print!(
            "  {:<5} marker@{:<8} payload@{:<8} length {:<6}",
            d.kind.to_string(),
            d.marker_offset,
            d.payload_offset,
            d.length
        );
        if let Some(ref id) = d.app_identifier {
            print!(" app {:?}", id);
        }
        if !s.scan_data.is_empty() {
            print!(" + {} entropy-coded byte(s)", s.scan_data.len());
        }
        println!();
    }
    if !jpeg.scan.trailing.is_empty() {
        println!("  {} unknown byte(s) after EOI marker", jpeg.scan.trailing.len());
    }
    println!("  read {} byte(s)", jpeg.scan.bytes_read);
    if let Some(ref j) = jpeg.jfif {
        println!(
            "  JFIF {}.{:02}, density {}x{} (units {})",
            j.version.0, j.version.1, j.x_density, j.y_density, j.density_units
        );
    }
    if let Some(ref icc) = jpeg.icc {
        println!(
            "  ICC profile {} byte(s), {} {} ({} chunk(s))",
            icc.profile_size, icc.device_class, icc.colour_space, icc.chunk_count
        );
    }
}

fn print_ifds(jpeg: &Jpeg) {
    let exif = match jpeg.exif {
        Some(ref e) => e,
        None => {
            println!("  no exif data");
            return;
        }
    };
    for (name, ifd) in &exif.directories {
        println!("  {}: {} item(s)", name, ifd.len());
        for e in ifd.iter() {
            println!(
                "    tag {:>5} format {:>2} count {:>4} {:?}",
                e.tag, e.format_code, e.count, e.value
            );
        }
    }
}

fn print_properties(p: &PropertyRecord) {
    fn field<T: std::fmt::Display>(name: &str, v: &Option<T>) {
        if let Some(v) = v {
            println!("  {:<10} {}", name, v);
        }
    }
    println!("  {:<10} {}", "bytes", p.byte_size);
    field("make", &p.make);
    field("model", &p.model);
    field("software", &p.software);
    field("timestamp", &p.timestamp);
    field("columns", &p.width);
    field("rows", &p.height);
    field("latitude", &p.latitude_display);
    field("longitude", &p.longitude_display);
    field("altitude", &p.altitude);
    if p.latitude.is_some() {
        println!("  {:<10} {}", "from gps", if p.from_gps { "Y" } else { "N" });
    }
}
